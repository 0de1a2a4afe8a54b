use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::{count_picks_for_week, delete_matches_for_week, get_matches_by_week, insert_match, seed::team_id_by_abbreviation, update_match_kickoff};
use crate::models::Match;
use crate::services::results::record_result;

const ESPN_SCOREBOARD_URL: &str = "https://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard";
const SYNC_ACTOR: &str = "espn-sync";
const GAMES_PER_WEEK_BLOCK: i64 = 16;

// ── ESPN scoreboard structures ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EspnScoreboard {
    #[serde(default)]
    events: Vec<EspnEvent>,
}

#[derive(Debug, Deserialize)]
struct EspnEvent {
    id: String,
    date: String,
    #[serde(default)]
    competitions: Vec<EspnCompetition>,
}

#[derive(Debug, Deserialize)]
struct EspnCompetition {
    #[serde(default)]
    competitors: Vec<EspnCompetitor>,
    status: Option<EspnStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EspnCompetitor {
    home_away: String,
    score: Option<String>,
    team: EspnTeam,
}

#[derive(Debug, Deserialize)]
struct EspnTeam {
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
struct EspnStatus {
    #[serde(rename = "type")]
    status_type: EspnStatusType,
}

#[derive(Debug, Deserialize)]
struct EspnStatusType {
    #[serde(default)]
    completed: bool,
}

/// One game of a week as reported by the provider, mapped onto our team ids.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub kickoff: DateTime<Utc>,
    /// (home, away) once the game is final
    pub final_score: Option<(i64, i64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSource {
    Espn,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub source: ScheduleSource,
    pub matches_updated: usize,
    pub results_recorded: usize,
}

impl SyncOutcome {
    fn fallback() -> Self {
        Self {
            source: ScheduleSource::Fallback,
            matches_updated: 0,
            results_recorded: 0,
        }
    }
}

fn espn_team_id(abbr: &str) -> Option<i64> {
    let normalized = match abbr {
        "WSH" => "WAS",
        "LA" => "LAR",
        "JAC" => "JAX",
        other => other,
    };
    team_id_by_abbreviation(normalized)
}

/// ESPN dates come as "2025-09-05T00:20Z" (no seconds) or full RFC 3339.
fn parse_espn_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_scoreboard(board: EspnScoreboard) -> Vec<ScheduledGame> {
    let mut games = Vec::new();

    for event in board.events {
        let Some(competition) = event.competitions.first() else {
            tracing::warn!("ESPN event {} has no competition, skipping", event.id);
            continue;
        };

        let side = |home_away: &str| competition.competitors.iter().find(|c| c.home_away == home_away);
        let (Some(home), Some(away)) = (side("home"), side("away")) else {
            tracing::warn!("ESPN event {} lacks home/away competitors", event.id);
            continue;
        };

        let (Some(home_team_id), Some(away_team_id)) =
            (espn_team_id(&home.team.abbreviation), espn_team_id(&away.team.abbreviation))
        else {
            tracing::warn!(
                "ESPN event {}: unknown team {} or {}",
                event.id,
                home.team.abbreviation,
                away.team.abbreviation
            );
            continue;
        };

        let Some(kickoff) = parse_espn_date(&event.date) else {
            tracing::warn!("Bad date '{}' on ESPN event {}", event.date, event.id);
            continue;
        };

        let completed = competition
            .status
            .as_ref()
            .is_some_and(|s| s.status_type.completed);
        let score = |c: &EspnCompetitor| c.score.as_deref().and_then(|s| s.parse::<i64>().ok());
        let final_score = match (completed, score(home), score(away)) {
            (true, Some(h), Some(a)) => Some((h, a)),
            _ => None,
        };

        games.push(ScheduledGame {
            home_team_id,
            away_team_id,
            kickoff,
            final_score,
        });
    }

    games
}

pub struct ScheduleFetcher {
    client: Client,
    base_url: String,
    season_year: i32,
}

impl ScheduleFetcher {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.espn_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: ESPN_SCOREBOARD_URL.to_string(),
            season_year: config.season_start.year(),
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn fetch_week(&self, week: i64) -> Result<Vec<ScheduledGame>> {
        tracing::info!("Fetching NFL week {} from ESPN…", week);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("seasontype", "2".to_string()),
                ("week", week.to_string()),
                ("dates", self.season_year.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("ESPN scoreboard error {}: {}", status, body));
        }

        let board: EspnScoreboard = response.json().await?;
        Ok(parse_scoreboard(board))
    }

    /// Bring a week in line with ESPN. Provider failures fall back to the
    /// stored schedule and are only logged.
    pub async fn sync_week(&self, pool: &SqlitePool, week: i64) -> Result<SyncOutcome> {
        let games = match self.fetch_week(week).await {
            Ok(games) if !games.is_empty() => games,
            Ok(_) => {
                tracing::warn!("ESPN returned no games for week {}, keeping stored schedule", week);
                return Ok(SyncOutcome::fallback());
            }
            Err(e) => {
                tracing::warn!("ESPN unavailable for week {} ({}), keeping stored schedule", week, e);
                return Ok(SyncOutcome::fallback());
            }
        };

        match apply_week(pool, week, &games).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::error!("Applying ESPN data for week {} failed ({}), keeping stored schedule", week, e);
                Ok(SyncOutcome::fallback())
            }
        }
    }
}

/// Write provider games for a week. The week is replaced wholesale while no
/// one has picked in it and none of its matches is completed; afterwards only
/// kickoffs of known pairings move. Final scores go through result recording.
pub async fn apply_week(pool: &SqlitePool, week: i64, games: &[ScheduledGame]) -> Result<SyncOutcome> {
    let mut matches_updated = 0usize;

    let existing = get_matches_by_week(pool, week).await?;
    let replaceable = count_picks_for_week(pool, week).await? == 0 && !existing.iter().any(|m| m.is_completed);

    if replaceable {
        let mut tx = pool.begin().await?;
        delete_matches_for_week(&mut tx, week).await?;
        for (i, game) in games.iter().take(GAMES_PER_WEEK_BLOCK as usize).enumerate() {
            insert_match(
                &mut tx,
                &Match {
                    id: (week - 1) * GAMES_PER_WEEK_BLOCK + i as i64 + 1,
                    week,
                    home_team_id: game.home_team_id,
                    away_team_id: game.away_team_id,
                    game_time: game.kickoff,
                    is_completed: false,
                    home_score: None,
                    away_score: None,
                    winner_team_id: None,
                },
            )
            .await?;
            matches_updated += 1;
        }
        tx.commit().await?;
    } else {
        for game in games {
            if let Some(m) = find_pairing(&existing, game) {
                if m.game_time != game.kickoff {
                    update_match_kickoff(pool, m.id, game.kickoff).await?;
                    matches_updated += 1;
                }
            }
        }
    }

    let stored = get_matches_by_week(pool, week).await?;
    let mut results_recorded = 0usize;
    for game in games {
        let (Some((home, away)), Some(m)) = (game.final_score, find_pairing(&stored, game)) else {
            continue;
        };
        if m.is_completed && m.home_score == Some(home) && m.away_score == Some(away) {
            continue;
        }
        record_result(pool, m.id, home, away, SYNC_ACTOR, Utc::now())
            .await
            .map_err(|e| anyhow!("recording ESPN result for match {}: {}", m.id, e))?;
        results_recorded += 1;
    }

    tracing::info!(
        "Week {} synced from ESPN: {} matches updated, {} results recorded",
        week,
        matches_updated,
        results_recorded
    );

    Ok(SyncOutcome {
        source: ScheduleSource::Espn,
        matches_updated,
        results_recorded,
    })
}

fn find_pairing<'a>(matches: &'a [Match], game: &ScheduledGame) -> Option<&'a Match> {
    matches
        .iter()
        .find(|m| m.home_team_id == game.home_team_id && m.away_team_id == game.away_team_id)
}
