use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};

use crate::config::{AppConfig, SEASON_WEEKS};
use crate::db::{get_all_matches, get_all_teams, get_current_week, get_matches_by_week, get_pending_result_matches, get_pick_for_week, get_usage_for_user};
use crate::models::{Match, MatchView, Team, WeekInfo};
use crate::services::eligibility::UsageLedger;
use crate::utils::{to_vienna, week_status};

#[derive(Debug, Clone)]
pub struct WeekBoard {
    pub matches: Vec<MatchView>,
    /// match id -> picked team id, for the caller
    pub picks: BTreeMap<String, i64>,
    pub unpickable_teams: Vec<i64>,
}

pub async fn week_overview(pool: &SqlitePool, config: &AppConfig) -> Result<(Vec<WeekInfo>, i64)> {
    let current_week = get_current_week(pool, config.current_week_override).await?;
    let matches = get_all_matches(pool).await?;

    let weeks = (1..=SEASON_WEEKS)
        .map(|week| {
            let games: Vec<Match> = matches.iter().filter(|m| m.week == week).cloned().collect();
            WeekInfo {
                week,
                status: week_status(week, current_week, &games),
                games_count: games.len() as i64,
            }
        })
        .collect();

    Ok((weeks, current_week))
}

pub async fn match_views(pool: &SqlitePool, matches: Vec<Match>) -> Result<Vec<MatchView>> {
    let teams: HashMap<i64, Team> = get_all_teams(pool)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    matches
        .into_iter()
        .map(|m| {
            let home = teams
                .get(&m.home_team_id)
                .cloned()
                .ok_or_else(|| anyhow!("Match {} references unknown team {}", m.id, m.home_team_id))?;
            let away = teams
                .get(&m.away_team_id)
                .cloned()
                .ok_or_else(|| anyhow!("Match {} references unknown team {}", m.id, m.away_team_id))?;
            Ok(MatchView {
                id: m.id,
                week: m.week,
                home_team: home,
                away_team: away,
                game_time: to_vienna(m.game_time).to_rfc3339(),
                is_completed: m.is_completed,
                home_score: m.home_score,
                away_score: m.away_score,
                winner_team_id: m.winner_team_id,
            })
        })
        .collect()
}

/// Matches for a week with the caller's pick and the teams they may not pick.
pub async fn week_board(pool: &SqlitePool, user_id: i64, week: i64) -> Result<WeekBoard> {
    let matches = get_matches_by_week(pool, week).await?;
    let views = match_views(pool, matches).await?;

    let mut picks = BTreeMap::new();
    if let Some(pick) = get_pick_for_week(pool, user_id, week).await? {
        picks.insert(pick.match_id.to_string(), pick.team_id);
    }

    let usage = get_usage_for_user(pool, user_id).await?;
    let unpickable_teams = UsageLedger::for_week(&usage, week).unpickable_teams();

    Ok(WeekBoard {
        matches: views,
        picks,
        unpickable_teams,
    })
}

pub async fn pending_results(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<MatchView>> {
    let pending = get_pending_result_matches(pool, now).await?;
    match_views(pool, pending).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::WeekStatus;
    use crate::services::picks::{submit_pick, PickSubmission};
    use chrono::Duration;

    #[tokio::test]
    async fn overview_lists_all_weeks() {
        let pool = test_pool().await;
        let (weeks, current) = week_overview(&pool, &AppConfig::default()).await.unwrap();

        assert_eq!(current, 3);
        assert_eq!(weeks.len(), 18);
        assert!(weeks.iter().all(|w| w.games_count == 16));
        assert_eq!(weeks[0].status, WeekStatus::Completed);
        assert_eq!(weeks[1].status, WeekStatus::Completed);
        assert_eq!(weeks[2].status, WeekStatus::Active);
        assert_eq!(weeks[17].status, WeekStatus::Upcoming);
    }

    #[tokio::test]
    async fn board_shows_pick_and_unpickable_teams() {
        let pool = test_pool().await;
        let games = get_matches_by_week(&pool, 3).await.unwrap();
        let game = &games[0];

        submit_pick(
            &pool,
            1,
            PickSubmission { match_id: game.id, team_id: game.home_team_id, week: Some(3) },
            game.game_time - Duration::hours(1),
        )
        .await
        .unwrap();

        let board = week_board(&pool, 1, 3).await.unwrap();
        assert_eq!(board.matches.len(), 16);
        assert_eq!(board.picks.get(&game.id.to_string()), Some(&game.home_team_id));
        assert!(board.unpickable_teams.is_empty());
        assert_eq!(board.matches[0].week, 3);
        assert!(board.matches[0].game_time.ends_with("+02:00"));
    }

    #[tokio::test]
    async fn pending_results_use_match_views() {
        let pool = test_pool().await;
        let week3 = get_matches_by_week(&pool, 3).await.unwrap();
        let last_kickoff = week3.iter().map(|m| m.game_time).max().unwrap();

        let pending = pending_results(&pool, last_kickoff).await.unwrap();
        assert_eq!(pending.len(), 16);
        assert!(pending.iter().all(|m| m.week == 3 && !m.is_completed));
    }
}
