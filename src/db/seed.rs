use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::SqlitePool;

use crate::config::{AppConfig, SEASON_WEEKS};
use crate::db::{insert_historical_pick, insert_match, replace_winner_usage};
use crate::models::{HistoricalPick, Match, Team};
use crate::utils::{team_logo_url, vienna_local_to_utc};

/// The 32 franchises; ids are 1-based positions in this list.
pub const NFL_TEAMS: [(&str, &str); 32] = [
    ("Arizona Cardinals", "ARI"),
    ("Atlanta Falcons", "ATL"),
    ("Baltimore Ravens", "BAL"),
    ("Buffalo Bills", "BUF"),
    ("Carolina Panthers", "CAR"),
    ("Chicago Bears", "CHI"),
    ("Cincinnati Bengals", "CIN"),
    ("Cleveland Browns", "CLE"),
    ("Dallas Cowboys", "DAL"),
    ("Denver Broncos", "DEN"),
    ("Detroit Lions", "DET"),
    ("Green Bay Packers", "GB"),
    ("Houston Texans", "HOU"),
    ("Indianapolis Colts", "IND"),
    ("Jacksonville Jaguars", "JAX"),
    ("Kansas City Chiefs", "KC"),
    ("Las Vegas Raiders", "LV"),
    ("Los Angeles Chargers", "LAC"),
    ("Los Angeles Rams", "LAR"),
    ("Miami Dolphins", "MIA"),
    ("Minnesota Vikings", "MIN"),
    ("New England Patriots", "NE"),
    ("New Orleans Saints", "NO"),
    ("New York Giants", "NYG"),
    ("New York Jets", "NYJ"),
    ("Philadelphia Eagles", "PHI"),
    ("Pittsburgh Steelers", "PIT"),
    ("San Francisco 49ers", "SF"),
    ("Seattle Seahawks", "SEA"),
    ("Tampa Bay Buccaneers", "TB"),
    ("Tennessee Titans", "TEN"),
    ("Washington Commanders", "WAS"),
];

const GAMES_PER_WEEK: i64 = 16;
const TEAM_COUNT: i64 = 32;
/// Weeks already played when the app went live.
const COMPLETED_WEEKS: i64 = 2;

pub fn team_catalog() -> Vec<Team> {
    NFL_TEAMS
        .iter()
        .enumerate()
        .map(|(i, (name, abbr))| Team {
            id: i as i64 + 1,
            name: name.to_string(),
            abbreviation: abbr.to_string(),
            logo_url: team_logo_url(abbr),
        })
        .collect()
}

pub fn team_id_by_abbreviation(abbr: &str) -> Option<i64> {
    NFL_TEAMS
        .iter()
        .position(|(_, a)| a.eq_ignore_ascii_case(abbr))
        .map(|i| i as i64 + 1)
}

/// Rotating round of 16 games per week. Game `i` pairs teams `2i+1` and
/// `2i+2`, shifted by `week - 2` from week 2 onwards; kickoffs are 19:00
/// Vienna time spread over three days starting from the season's Sunday.
pub fn generate_schedule(season_start: NaiveDate) -> Vec<Match> {
    let kickoff_time = NaiveTime::from_hms_opt(19, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut matches = Vec::with_capacity((SEASON_WEEKS * GAMES_PER_WEEK) as usize);

    for week in 1..=SEASON_WEEKS {
        for i in 0..GAMES_PER_WEEK {
            let mut home = i * 2 + 1;
            let mut away = i * 2 + 2;
            if week > 1 {
                home = ((home + week - 2) % TEAM_COUNT) + 1;
                away = ((away + week - 2) % TEAM_COUNT) + 1;
            }

            let date = season_start + Duration::weeks(week - 1) + Duration::days(i % 3);
            matches.push(Match {
                id: (week - 1) * GAMES_PER_WEEK + i + 1,
                week,
                home_team_id: home,
                away_team_id: away,
                game_time: vienna_local_to_utc(date.and_time(kickoff_time)),
                is_completed: week <= COMPLETED_WEEKS,
                home_score: None,
                away_score: None,
                winner_team_id: None,
            });
        }
    }

    matches
}

fn seed_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub async fn seed_data(pool: &SqlitePool, config: &AppConfig) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("Database already seeded ({} users found), skipping.", count);
        return Ok(());
    }

    tracing::info!("Seeding database with users, teams, history and schedule...");

    let mut tx = pool.begin().await?;

    for user in &config.users {
        sqlx::query("INSERT OR REPLACE INTO users (id, username) VALUES (?, ?)")
            .bind(user.id)
            .bind(&user.name)
            .execute(&mut *tx)
            .await?;
    }

    for team in team_catalog() {
        sqlx::query("INSERT OR REPLACE INTO teams (id, name, abbreviation, logo_url) VALUES (?, ?, ?, ?)")
            .bind(team.id)
            .bind(&team.name)
            .bind(&team.abbreviation)
            .bind(&team.logo_url)
            .execute(&mut *tx)
            .await?;
    }

    // (user, week, team id, correct, created_at)
    let history: [(&str, i64, i64, bool, &str); 8] = [
        ("Manuel", 1, 12, false, "2025-09-08T19:00:00+02:00"),
        ("Manuel", 2, 9, true, "2025-09-15T19:00:00+02:00"),
        ("Daniel", 1, 10, true, "2025-09-08T19:00:00+02:00"),
        ("Daniel", 2, 26, true, "2025-09-15T19:00:00+02:00"),
        ("Raff", 1, 7, true, "2025-09-08T19:00:00+02:00"),
        ("Raff", 2, 16, true, "2025-09-15T19:00:00+02:00"),
        ("Haunschi", 1, 4, true, "2025-09-08T19:00:00+02:00"),
        ("Haunschi", 2, 28, true, "2025-09-15T19:00:00+02:00"),
    ];

    let mut seeded_history = 0usize;
    for (name, week, team_id, is_correct, created_at) in history {
        // History only applies to participants still in the directory
        let Some(user) = config.find_user_by_name(name) else {
            continue;
        };
        let created_at = seed_timestamp(created_at)?;
        let team_name = NFL_TEAMS[(team_id - 1) as usize].0.to_string();

        insert_historical_pick(
            &mut tx,
            &HistoricalPick {
                user_id: user.id,
                week,
                team_name,
                team_id: Some(team_id),
                is_correct,
                created_at,
            },
        )
        .await?;
        replace_winner_usage(&mut tx, user.id, team_id, week, created_at).await?;
        seeded_history += 1;
    }

    let schedule = generate_schedule(config.season_start);
    for m in &schedule {
        insert_match(&mut tx, m).await?;
    }

    tx.commit().await?;

    tracing::info!(
        "Database seeded: {} users, {} teams, {} historical picks, {} matches.",
        config.users.len(),
        NFL_TEAMS.len(),
        seeded_history,
        schedule.len()
    );
    Ok(())
}
