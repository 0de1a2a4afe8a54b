use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::{get_match_by_id, get_pick_for_week, get_team_by_id, get_usage_for_user, replace_winner_usage, upsert_pick};
use crate::error::{AppError, AppResult};
use crate::models::{Pick, Team};
use crate::services::eligibility::UsageLedger;

#[derive(Debug, Clone, Copy)]
pub struct PickSubmission {
    pub match_id: i64,
    pub team_id: i64,
    /// Optional cross-check against the match's own week.
    pub week: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SavedPick {
    pub pick: Pick,
    pub team: Team,
}

/// Validate and store a user's pick for the match's week, replacing any
/// earlier pick for that week.
pub async fn submit_pick(
    pool: &SqlitePool,
    user_id: i64,
    submission: PickSubmission,
    now: DateTime<Utc>,
) -> AppResult<SavedPick> {
    let game = get_match_by_id(pool, submission.match_id)
        .await?
        .ok_or_else(|| AppError::not_found("Spiel nicht gefunden"))?;

    if let Some(week) = submission.week {
        if week != game.week {
            return Err(AppError::bad_request(format!(
                "Spiel gehört nicht zu Woche {}",
                week
            )));
        }
    }

    if !game.involves(submission.team_id) {
        return Err(AppError::bad_request("Team spielt nicht in diesem Spiel"));
    }

    if game.has_started(now) {
        return Err(AppError::GameStarted);
    }

    // The week's existing pick is locked once its own match has kicked off
    if let Some(current) = get_pick_for_week(pool, user_id, game.week).await? {
        if current.match_id != game.id {
            let locked = get_match_by_id(pool, current.match_id)
                .await?
                .map_or(false, |m| m.is_completed || m.has_started(now));
            if locked {
                return Err(AppError::GameStarted);
            }
        }
    }

    let usage = get_usage_for_user(pool, user_id).await?;
    UsageLedger::for_week(&usage, game.week).check(submission.team_id)?;

    let team = get_team_by_id(pool, submission.team_id)
        .await?
        .ok_or_else(|| AppError::not_found("Team nicht gefunden"))?;

    let mut tx = pool.begin().await?;
    upsert_pick(&mut tx, user_id, game.id, team.id, game.week, now).await?;
    replace_winner_usage(&mut tx, user_id, team.id, game.week, now).await?;
    tx.commit().await?;

    tracing::info!(
        "User {} picked {} for week {} (match {})",
        user_id,
        team.abbreviation,
        game.week,
        game.id
    );

    let pick = get_pick_for_week(pool, user_id, game.week)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("pick for week {} vanished after save", game.week)))?;

    Ok(SavedPick { pick, team })
}
