pub mod seed;
pub use seed::seed_data;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;

use crate::config::SEASON_WEEKS;
use crate::models::*;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    if database_url.contains(":memory:") {
        // Every connection to an in-memory database is its own database.
        let options = SqliteConnectOptions::from_str(database_url)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        return Ok(pool);
    }

    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            abbreviation TEXT NOT NULL UNIQUE,
            logo_url TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY,
            week INTEGER NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            game_time TEXT NOT NULL,
            is_completed BOOLEAN NOT NULL DEFAULT FALSE,
            home_score INTEGER,
            away_score INTEGER,
            winner_team_id INTEGER,
            FOREIGN KEY (home_team_id) REFERENCES teams (id),
            FOREIGN KEY (away_team_id) REFERENCES teams (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS picks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            match_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            week INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            is_correct BOOLEAN,
            UNIQUE (user_id, week),
            FOREIGN KEY (user_id) REFERENCES users (id),
            FOREIGN KEY (match_id) REFERENCES matches (id),
            FOREIGN KEY (team_id) REFERENCES teams (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS historical_picks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            week INTEGER NOT NULL,
            team_name TEXT NOT NULL,
            team_id INTEGER,
            is_correct BOOLEAN NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, week)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS team_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            usage_type TEXT NOT NULL CHECK (usage_type IN ('winner', 'loser')),
            week INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // result_audit: one row per admin (or sync) result entry
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS result_audit (
            id TEXT PRIMARY KEY,
            match_id INTEGER NOT NULL,
            home_score INTEGER NOT NULL,
            away_score INTEGER NOT NULL,
            winner_team_id INTEGER,
            recorded_by TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            FOREIGN KEY (match_id) REFERENCES matches (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_week ON matches(week)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_picks_match ON picks(match_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_team_usage_user ON team_usage(user_id, team_id)")
        .execute(pool)
        .await?;

    // A team is eliminated for a user at most once
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_team_usage_loser ON team_usage(user_id, team_id) WHERE usage_type = 'loser'",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

fn row_to_match(row: &SqliteRow) -> Result<Match> {
    Ok(Match {
        id: row.get("id"),
        week: row.get("week"),
        home_team_id: row.get("home_team_id"),
        away_team_id: row.get("away_team_id"),
        game_time: parse_timestamp(&row.get::<String, _>("game_time"))?,
        is_completed: row.get("is_completed"),
        home_score: row.get("home_score"),
        away_score: row.get("away_score"),
        winner_team_id: row.get("winner_team_id"),
    })
}

fn row_to_pick(row: &SqliteRow) -> Result<Pick> {
    Ok(Pick {
        id: row.get("id"),
        user_id: row.get("user_id"),
        match_id: row.get("match_id"),
        team_id: row.get("team_id"),
        week: row.get("week"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        is_correct: row.get("is_correct"),
    })
}

fn row_to_team(row: &SqliteRow) -> Team {
    Team {
        id: row.get("id"),
        name: row.get("name"),
        abbreviation: row.get("abbreviation"),
        logo_url: row.get("logo_url"),
    }
}

// User operations

pub async fn get_users(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query("SELECT id, username FROM users ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| User {
            id: row.get("id"),
            username: row.get("username"),
        })
        .collect())
}

// Team operations

pub async fn get_all_teams(pool: &SqlitePool) -> Result<Vec<Team>> {
    let rows = sqlx::query("SELECT * FROM teams ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(row_to_team).collect())
}

pub async fn get_team_by_id(pool: &SqlitePool, team_id: i64) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT * FROM teams WHERE id = ?")
        .bind(team_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(row_to_team))
}

// Match operations

pub async fn insert_match(conn: &mut SqliteConnection, m: &Match) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO matches
        (id, week, home_team_id, away_team_id, game_time, is_completed, home_score, away_score, winner_team_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(m.id)
    .bind(m.week)
    .bind(m.home_team_id)
    .bind(m.away_team_id)
    .bind(m.game_time.to_rfc3339())
    .bind(m.is_completed)
    .bind(m.home_score)
    .bind(m.away_score)
    .bind(m.winner_team_id)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_match_by_id(pool: &SqlitePool, match_id: i64) -> Result<Option<Match>> {
    let row = sqlx::query("SELECT * FROM matches WHERE id = ?")
        .bind(match_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_match).transpose()
}

pub async fn get_matches_by_week(pool: &SqlitePool, week: i64) -> Result<Vec<Match>> {
    let rows = sqlx::query("SELECT * FROM matches WHERE week = ? ORDER BY game_time, id")
        .bind(week)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_match).collect()
}

pub async fn get_all_matches(pool: &SqlitePool) -> Result<Vec<Match>> {
    let rows = sqlx::query("SELECT * FROM matches ORDER BY week, game_time, id")
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_match).collect()
}

/// Matches that have kicked off but have no recorded result yet.
pub async fn get_pending_result_matches(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Match>> {
    // kickoff comparison on parsed timestamps, not on the stored text
    let rows = sqlx::query("SELECT * FROM matches WHERE is_completed = 0 ORDER BY week, id")
        .fetch_all(pool)
        .await?;

    let mut pending = Vec::new();
    for row in &rows {
        let m = row_to_match(row)?;
        if m.has_started(now) {
            pending.push(m);
        }
    }
    pending.sort_by_key(|m| (m.game_time, m.id));
    Ok(pending)
}

pub async fn get_current_week(pool: &SqlitePool, override_week: Option<i64>) -> Result<i64> {
    if let Some(week) = override_week {
        return Ok(week);
    }

    let week: Option<i64> = sqlx::query_scalar("SELECT MIN(week) FROM matches WHERE is_completed = 0")
        .fetch_one(pool)
        .await?;

    Ok(week.unwrap_or(SEASON_WEEKS))
}

pub async fn update_match_kickoff(pool: &SqlitePool, match_id: i64, game_time: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE matches SET game_time = ? WHERE id = ?")
        .bind(game_time.to_rfc3339())
        .bind(match_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_match_result(
    conn: &mut SqliteConnection,
    match_id: i64,
    home_score: i64,
    away_score: i64,
    winner_team_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE matches
           SET is_completed = 1, home_score = ?, away_score = ?, winner_team_id = ?
           WHERE id = ?"#,
    )
    .bind(home_score)
    .bind(away_score)
    .bind(winner_team_id)
    .bind(match_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete_matches_for_week(conn: &mut SqliteConnection, week: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM matches WHERE week = ?")
        .bind(week)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

// Pick operations

/// Insert or overwrite the pick for (user, week). Overwriting clears the
/// correctness flag.
pub async fn upsert_pick(
    conn: &mut SqliteConnection,
    user_id: i64,
    match_id: i64,
    team_id: i64,
    week: i64,
    created_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO picks (user_id, match_id, team_id, week, created_at, is_correct)
           VALUES (?, ?, ?, ?, ?, NULL)
           ON CONFLICT(user_id, week) DO UPDATE SET
               match_id   = excluded.match_id,
               team_id    = excluded.team_id,
               created_at = excluded.created_at,
               is_correct = NULL"#,
    )
    .bind(user_id)
    .bind(match_id)
    .bind(team_id)
    .bind(week)
    .bind(created_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_pick_for_week(pool: &SqlitePool, user_id: i64, week: i64) -> Result<Option<Pick>> {
    let row = sqlx::query("SELECT * FROM picks WHERE user_id = ? AND week = ?")
        .bind(user_id)
        .bind(week)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_pick).transpose()
}

#[cfg(test)]
pub async fn get_picks_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Pick>> {
    let rows = sqlx::query("SELECT * FROM picks WHERE user_id = ? ORDER BY week")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_pick).collect()
}

pub async fn get_picks_for_match(conn: &mut SqliteConnection, match_id: i64) -> Result<Vec<Pick>> {
    let rows = sqlx::query("SELECT * FROM picks WHERE match_id = ? ORDER BY user_id")
        .bind(match_id)
        .fetch_all(conn)
        .await?;

    rows.iter().map(row_to_pick).collect()
}

pub async fn set_pick_correctness(conn: &mut SqliteConnection, pick_id: i64, is_correct: bool) -> Result<()> {
    sqlx::query("UPDATE picks SET is_correct = ? WHERE id = ?")
        .bind(is_correct)
        .bind(pick_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn count_picks_for_week(pool: &SqlitePool, week: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM picks WHERE week = ?")
        .bind(week)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Historical and live picks joined with user and team names.
pub async fn get_pick_history(pool: &SqlitePool) -> Result<Vec<PickHistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT u.username AS user, hp.week AS week, hp.team_name AS team,
               hp.is_correct AS is_correct, hp.created_at AS created_at
        FROM historical_picks hp
        JOIN users u ON hp.user_id = u.id
        UNION ALL
        SELECT u.username, p.week, t.name, p.is_correct, p.created_at
        FROM picks p
        JOIN users u ON p.user_id = u.id
        JOIN teams t ON p.team_id = t.id
        ORDER BY week, user
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut history = Vec::new();
    for row in rows {
        let result = match row.get::<Option<bool>, _>("is_correct") {
            Some(true) => "Correct",
            Some(false) => "Incorrect",
            None => "Pending",
        };
        history.push(PickHistoryEntry {
            user: row.get("user"),
            week: row.get("week"),
            team: row.get("team"),
            result: result.to_string(),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        });
    }
    Ok(history)
}

// Historical picks

pub async fn insert_historical_pick(conn: &mut SqliteConnection, pick: &HistoricalPick) -> Result<()> {
    sqlx::query(
        r#"INSERT OR REPLACE INTO historical_picks (user_id, week, team_name, team_id, is_correct, created_at)
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(pick.user_id)
    .bind(pick.week)
    .bind(&pick.team_name)
    .bind(pick.team_id)
    .bind(pick.is_correct)
    .bind(pick.created_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

/// Correct and total picks per user, historical plus live. Users without any
/// picks are included with zero counts.
pub async fn get_user_tallies(pool: &SqlitePool) -> Result<Vec<UserTally>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id AS user_id, u.username AS username,
               COALESCE(SUM(CASE WHEN x.is_correct = 1 THEN 1 ELSE 0 END), 0) AS correct_picks,
               COUNT(x.user_id) AS total_picks
        FROM users u
        LEFT JOIN (
            SELECT user_id, is_correct FROM historical_picks
            UNION ALL
            SELECT user_id, is_correct FROM picks
        ) x ON x.user_id = u.id
        GROUP BY u.id, u.username
        ORDER BY u.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| UserTally {
            user_id: row.get("user_id"),
            username: row.get("username"),
            correct_picks: row.get("correct_picks"),
            total_picks: row.get("total_picks"),
        })
        .collect())
}

// Team usage

pub async fn get_usage_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<TeamUsage>> {
    let rows = sqlx::query("SELECT * FROM team_usage WHERE user_id = ? ORDER BY week, id")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    let mut usage = Vec::new();
    for row in rows {
        usage.push(TeamUsage {
            user_id: row.get("user_id"),
            team_id: row.get("team_id"),
            kind: row.get::<String, _>("usage_type").parse()?,
            week: row.get("week"),
        });
    }
    Ok(usage)
}

/// Team names a user has used with the given kind, in the order used.
pub async fn get_usage_team_names(pool: &SqlitePool, user_id: i64, kind: UsageKind) -> Result<Vec<String>> {
    let names = sqlx::query_scalar(
        r#"SELECT t.name FROM team_usage tu
           JOIN teams t ON tu.team_id = t.id
           WHERE tu.user_id = ? AND tu.usage_type = ?
           ORDER BY tu.week, tu.id"#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Drop a user's winner usage for a week and record `team_id` in its place.
pub async fn replace_winner_usage(
    conn: &mut SqliteConnection,
    user_id: i64,
    team_id: i64,
    week: i64,
    created_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("DELETE FROM team_usage WHERE user_id = ? AND week = ? AND usage_type = 'winner'")
        .bind(user_id)
        .bind(week)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO team_usage (user_id, team_id, usage_type, week, created_at) VALUES (?, ?, 'winner', ?, ?)",
    )
    .bind(user_id)
    .bind(team_id)
    .bind(week)
    .bind(created_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Record a team as eliminated for a user. No-op if already eliminated.
pub async fn insert_loser_usage(
    conn: &mut SqliteConnection,
    user_id: i64,
    team_id: i64,
    week: i64,
    created_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO team_usage (user_id, team_id, usage_type, week, created_at) VALUES (?, ?, 'loser', ?, ?)",
    )
    .bind(user_id)
    .bind(team_id)
    .bind(week)
    .bind(created_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

// Result audit

pub async fn insert_result_audit(conn: &mut SqliteConnection, audit: &ResultAudit) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO result_audit (id, match_id, home_score, away_score, winner_team_id, recorded_by, recorded_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&audit.id)
    .bind(audit.match_id)
    .bind(audit.home_score)
    .bind(audit.away_score)
    .bind(audit.winner_team_id)
    .bind(&audit.recorded_by)
    .bind(audit.recorded_at.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn get_result_audit(pool: &SqlitePool, match_id: i64) -> Result<Vec<ResultAudit>> {
    let rows = sqlx::query("SELECT * FROM result_audit WHERE match_id = ? ORDER BY recorded_at")
        .bind(match_id)
        .fetch_all(pool)
        .await?;

    let mut audit = Vec::new();
    for row in rows {
        audit.push(ResultAudit {
            id: row.get("id"),
            match_id: row.get("match_id"),
            home_score: row.get("home_score"),
            away_score: row.get("away_score"),
            winner_team_id: row.get("winner_team_id"),
            recorded_by: row.get("recorded_by"),
            recorded_at: parse_timestamp(&row.get::<String, _>("recorded_at"))?,
        });
    }
    Ok(audit)
}

/// In-memory database with schema and default seed data, for tests.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    init_database_with_pool(&pool).await.unwrap();
    seed_data(&pool, &crate::config::AppConfig::default()).await.unwrap();
    pool
}
