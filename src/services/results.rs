use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::cmp::Ordering;

use crate::db::{get_match_by_id, get_picks_for_match, insert_loser_usage, insert_result_audit, mark_match_result, set_pick_correctness};
use crate::error::{AppError, AppResult};
use crate::models::{Match, RecordedResult, ResultAudit};

/// Winner by strictly greater score; `None` on a tie.
pub fn decide_winner(game: &Match, home_score: i64, away_score: i64) -> Option<i64> {
    match home_score.cmp(&away_score) {
        Ordering::Greater => Some(game.home_team_id),
        Ordering::Less => Some(game.away_team_id),
        Ordering::Equal => None,
    }
}

/// Store a final score, mark the match completed and (re)score every pick on
/// it. Each picker's non-chosen side is eliminated for them. Running it again
/// overwrites the previous result.
pub async fn record_result(
    pool: &SqlitePool,
    match_id: i64,
    home_score: i64,
    away_score: i64,
    recorded_by: &str,
    now: DateTime<Utc>,
) -> AppResult<RecordedResult> {
    if home_score < 0 || away_score < 0 {
        return Err(AppError::bad_request("Punkte dürfen nicht negativ sein"));
    }

    let game = get_match_by_id(pool, match_id)
        .await?
        .ok_or_else(|| AppError::not_found("Spiel nicht gefunden"))?;

    let winner = decide_winner(&game, home_score, away_score);

    let mut tx = pool.begin().await?;
    mark_match_result(&mut tx, game.id, home_score, away_score, winner).await?;

    let picks = get_picks_for_match(&mut tx, game.id).await?;
    for pick in &picks {
        let is_correct = winner == Some(pick.team_id);
        set_pick_correctness(&mut tx, pick.id, is_correct).await?;

        if let Some(other_side) = game.opponent_of(pick.team_id) {
            insert_loser_usage(&mut tx, pick.user_id, other_side, game.week, now).await?;
        }
    }

    insert_result_audit(
        &mut tx,
        &ResultAudit {
            id: uuid::Uuid::new_v4().to_string(),
            match_id: game.id,
            home_score,
            away_score,
            winner_team_id: winner,
            recorded_by: recorded_by.to_string(),
            recorded_at: now,
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        "{} recorded match {} (week {}) as {}-{}, winner {:?}, {} picks scored",
        recorded_by,
        game.id,
        game.week,
        home_score,
        away_score,
        winner,
        picks.len()
    );

    Ok(RecordedResult {
        match_id: game.id,
        home_score,
        away_score,
        winner_team_id: winner,
        picks_scored: picks.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_matches_by_week, get_picks_for_user, get_result_audit, get_usage_for_user, test_pool};
    use crate::models::UsageKind;
    use crate::services::eligibility::{Ineligibility, UsageLedger};
    use crate::services::picks::{submit_pick, PickSubmission};
    use chrono::Duration;

    async fn pick(pool: &SqlitePool, user_id: i64, game: &Match, team_id: i64) {
        submit_pick(
            pool,
            user_id,
            PickSubmission { match_id: game.id, team_id, week: Some(game.week) },
            game.game_time - Duration::hours(1),
        )
        .await
        .unwrap();
    }

    async fn correctness(pool: &SqlitePool, user_id: i64) -> Option<bool> {
        get_picks_for_user(pool, user_id).await.unwrap()[0].is_correct
    }

    #[tokio::test]
    async fn home_win_scores_home_pickers_correct() {
        let pool = test_pool().await;
        let game = get_matches_by_week(&pool, 3).await.unwrap().remove(0);

        pick(&pool, 1, &game, game.home_team_id).await;
        pick(&pool, 2, &game, game.home_team_id).await;
        pick(&pool, 3, &game, game.away_team_id).await;

        let result = record_result(&pool, game.id, 24, 17, "Manuel", game.game_time + Duration::hours(4))
            .await
            .unwrap();
        assert_eq!(result.winner_team_id, Some(game.home_team_id));
        assert_eq!(result.picks_scored, 3);

        assert_eq!(correctness(&pool, 1).await, Some(true));
        assert_eq!(correctness(&pool, 2).await, Some(true));
        assert_eq!(correctness(&pool, 3).await, Some(false));

        let stored = get_match_by_id(&pool, game.id).await.unwrap().unwrap();
        assert!(stored.is_completed);
        assert_eq!((stored.home_score, stored.away_score), (Some(24), Some(17)));
        assert_eq!(stored.winner_team_id, Some(game.home_team_id));
    }

    #[tokio::test]
    async fn tie_records_no_winner() {
        let pool = test_pool().await;
        let game = get_matches_by_week(&pool, 3).await.unwrap().remove(0);
        pick(&pool, 4, &game, game.away_team_id).await;

        let result = record_result(&pool, game.id, 20, 20, "Manuel", Utc::now()).await.unwrap();
        assert_eq!(result.winner_team_id, None);
        assert_eq!(correctness(&pool, 4).await, Some(false));
    }

    #[tokio::test]
    async fn re_recording_overwrites_and_rescores() {
        let pool = test_pool().await;
        let game = get_matches_by_week(&pool, 3).await.unwrap().remove(0);
        pick(&pool, 1, &game, game.away_team_id).await;

        record_result(&pool, game.id, 24, 17, "Manuel", Utc::now()).await.unwrap();
        assert_eq!(correctness(&pool, 1).await, Some(false));

        record_result(&pool, game.id, 10, 13, "Manuel", Utc::now()).await.unwrap();
        assert_eq!(correctness(&pool, 1).await, Some(true));

        let audit = get_result_audit(&pool, game.id).await.unwrap();
        assert_eq!(audit.len(), 2);
        assert!(audit.iter().all(|a| a.recorded_by == "Manuel"));

        // the non-chosen side is eliminated exactly once
        let losers: Vec<_> = get_usage_for_user(&pool, 1)
            .await
            .unwrap()
            .into_iter()
            .filter(|u| u.kind == UsageKind::Loser)
            .collect();
        assert_eq!(losers.len(), 1);
        assert_eq!(losers[0].team_id, game.home_team_id);
    }

    #[tokio::test]
    async fn non_chosen_side_becomes_unpickable() {
        let pool = test_pool().await;
        let game = get_matches_by_week(&pool, 3).await.unwrap().remove(0);
        pick(&pool, 2, &game, game.home_team_id).await;
        record_result(&pool, game.id, 3, 0, "Manuel", Utc::now()).await.unwrap();

        let usage = get_usage_for_user(&pool, 2).await.unwrap();
        let ledger = UsageLedger::for_week(&usage, 4);
        assert_eq!(ledger.check(game.away_team_id), Err(Ineligibility::UsedAsLoser));
        assert_eq!(ledger.check(game.home_team_id), Ok(()));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let pool = test_pool().await;
        let err = record_result(&pool, 1, -1, 3, "Manuel", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = record_result(&pool, 4242, 1, 3, "Manuel", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
