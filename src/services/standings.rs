use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{AppConfig, RankPolicy};
use crate::db::{get_current_week, get_pick_for_week, get_usage_team_names, get_user_tallies};
use crate::models::{DashboardSummary, LeaderboardEntry, UsageKind, UserTally};

/// Order users by points (descending, ties by user id) and assign ranks
/// according to `policy`.
pub fn rank_tallies(mut tallies: Vec<UserTally>, policy: RankPolicy) -> Vec<LeaderboardEntry> {
    tallies.sort_by(|a, b| {
        b.correct_picks
            .cmp(&a.correct_picks)
            .then(a.user_id.cmp(&b.user_id))
    });

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(tallies.len());
    for (i, tally) in tallies.into_iter().enumerate() {
        let rank = match (policy, entries.last()) {
            (RankPolicy::Competition, Some(prev)) if prev.points == tally.correct_picks => prev.rank,
            _ => i + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            user_id: tally.user_id,
            username: tally.username,
            points: tally.correct_picks,
            total_picks: tally.total_picks,
            correct_picks: tally.correct_picks,
        });
    }
    entries
}

pub async fn leaderboard(pool: &SqlitePool, policy: RankPolicy) -> Result<Vec<LeaderboardEntry>> {
    let tallies = get_user_tallies(pool).await?;
    Ok(rank_tallies(tallies, policy))
}

pub async fn dashboard(pool: &SqlitePool, config: &AppConfig, user_id: i64) -> Result<DashboardSummary> {
    let board = leaderboard(pool, config.rank_policy).await?;
    let entry = board.iter().find(|e| e.user_id == user_id);

    let current_week = get_current_week(pool, config.current_week_override).await?;
    let submitted = get_pick_for_week(pool, user_id, current_week).await?.is_some();

    Ok(DashboardSummary {
        current_week,
        picks_submitted: i64::from(submitted),
        total_points: entry.map_or(0, |e| e.points),
        correct_picks: entry.map_or(0, |e| e.correct_picks),
        total_picks: entry.map_or(0, |e| e.total_picks),
        rank: entry.map_or(board.len() + 1, |e| e.rank),
        winner_teams: get_usage_team_names(pool, user_id, UsageKind::Winner).await?,
        loser_teams: get_usage_team_names(pool, user_id, UsageKind::Loser).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use pretty_assertions::assert_eq;

    fn tally(user_id: i64, name: &str, correct: i64, total: i64) -> UserTally {
        UserTally {
            user_id,
            username: name.to_string(),
            correct_picks: correct,
            total_picks: total,
        }
    }

    fn seeded_tallies() -> Vec<UserTally> {
        vec![
            tally(1, "Manuel", 1, 2),
            tally(2, "Daniel", 2, 2),
            tally(3, "Raff", 2, 2),
            tally(4, "Haunschi", 2, 2),
        ]
    }

    #[test]
    fn sequential_ranks_do_not_collapse_ties() {
        let ranked = rank_tallies(seeded_tallies(), RankPolicy::Sequential);
        let view: Vec<_> = ranked.iter().map(|e| (e.rank, e.username.as_str(), e.points)).collect();
        assert_eq!(
            view,
            vec![(1, "Daniel", 2), (2, "Raff", 2), (3, "Haunschi", 2), (4, "Manuel", 1)]
        );
    }

    #[test]
    fn competition_ranks_share_ties() {
        let ranked = rank_tallies(seeded_tallies(), RankPolicy::Competition);
        let ranks: Vec<_> = ranked.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 1, 1, 4]);
    }

    #[test]
    fn rank_never_improves_with_fewer_points() {
        let tallies = vec![tally(1, "a", 0, 3), tally(2, "b", 5, 5), tally(3, "c", 3, 4), tally(4, "d", 3, 3)];
        for policy in [RankPolicy::Sequential, RankPolicy::Competition] {
            let ranked = rank_tallies(tallies.clone(), policy);
            for pair in ranked.windows(2) {
                assert!(pair[0].points >= pair[1].points);
                assert!(pair[0].rank <= pair[1].rank);
            }
        }
    }

    #[tokio::test]
    async fn manuel_dashboard_counts_history() {
        let pool = test_pool().await;
        let config = AppConfig::default();

        let summary = dashboard(&pool, &config, 1).await.unwrap();
        assert_eq!(summary.total_points, 1);
        assert_eq!(summary.correct_picks, 1);
        assert_eq!(summary.total_picks, 2);
        assert_eq!(summary.rank, 4);
        assert_eq!(summary.current_week, 3);
        assert_eq!(summary.picks_submitted, 0);
        assert_eq!(summary.winner_teams, vec!["Green Bay Packers", "Dallas Cowboys"]);
        assert!(summary.loser_teams.is_empty());
    }
}
