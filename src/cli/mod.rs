use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db::{
    create_pool, get_current_week, get_match_by_id, get_result_audit, get_users, init_database_with_pool, seed_data,
};
use crate::services::{leaderboard, ScheduleFetcher, ScheduleSource};

async fn open(config: &AppConfig) -> Result<SqlitePool> {
    let pool = create_pool(&config.database_url).await?;
    init_database_with_pool(&pool).await?;
    seed_data(&pool, config).await?;
    Ok(pool)
}

pub async fn init_db(config: &AppConfig) -> Result<()> {
    let pool = open(config).await?;
    let users = get_users(&pool).await?;

    println!("✅ Database ready at {}", config.database_url);
    println!("👥 Participants:");
    for user in users {
        let marker = if config.is_admin(&user.username) { " (admin)" } else { "" };
        println!("   • {}{}", user.username, marker);
    }
    Ok(())
}

pub async fn sync_week(config: &AppConfig, week: Option<i64>) -> Result<()> {
    let pool = open(config).await?;
    let week = match week {
        Some(week) => week,
        None => get_current_week(&pool, config.current_week_override).await?,
    };

    println!("📥 Syncing week {} from ESPN...", week);
    let outcome = ScheduleFetcher::new(config)?.sync_week(&pool, week).await?;

    match outcome.source {
        ScheduleSource::Espn => {
            println!("✅ {} matches updated, {} results recorded", outcome.matches_updated, outcome.results_recorded);
        }
        ScheduleSource::Fallback => {
            println!("⚠️  ESPN unavailable, keeping the stored schedule for week {}", week);
        }
    }
    Ok(())
}

pub async fn print_standings(config: &AppConfig) -> Result<()> {
    let pool = open(config).await?;
    let board = leaderboard(&pool, config.rank_policy).await?;
    let week = get_current_week(&pool, config.current_week_override).await?;

    println!("🏆 Standings before week {}:\n", week);
    for entry in board {
        println!(
            "{:>2}. {:<12} {:>2} pts ({}/{} correct)",
            entry.rank, entry.username, entry.points, entry.correct_picks, entry.total_picks
        );
    }
    Ok(())
}

pub async fn print_audit(config: &AppConfig, match_id: i64) -> Result<()> {
    let pool = open(config).await?;

    let Some(game) = get_match_by_id(&pool, match_id).await? else {
        println!("❌ No match with id {}", match_id);
        return Ok(());
    };

    println!("📋 Result history for match {} (week {}):", game.id, game.week);
    let audit = get_result_audit(&pool, match_id).await?;
    if audit.is_empty() {
        println!("   No results recorded yet");
    }
    for entry in audit {
        println!(
            "   {} {}-{} by {}",
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            entry.home_score,
            entry.away_score,
            entry.recorded_by
        );
    }
    Ok(())
}
