use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::models::{TeamUsage, UsageKind};

/// A team may be picked as the projected winner at most this many times.
pub const MAX_WINNER_PICKS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    /// The team was on the losing side of one of the user's resolved matchups.
    UsedAsLoser,
    /// The team was already picked as winner `MAX_WINNER_PICKS` times.
    WinnerLimitReached,
}

impl Ineligibility {
    pub fn message(&self) -> &'static str {
        match self {
            Ineligibility::UsedAsLoser => "Team wurde bereits als Verlierer verwendet",
            Ineligibility::WinnerLimitReached => "Team wurde bereits zweimal als Gewinner verwendet",
        }
    }
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Per-user view over team usage records, for one week being picked.
///
/// Winner usages recorded for `week` itself are ignored: they belong to the
/// pick being replaced, so changing a pick within a week never counts twice.
#[derive(Debug, Default)]
pub struct UsageLedger {
    winner_counts: HashMap<i64, usize>,
    eliminated: BTreeSet<i64>,
}

impl UsageLedger {
    pub fn for_week(usage: &[TeamUsage], week: i64) -> Self {
        let mut ledger = Self::default();
        for record in usage {
            match record.kind {
                UsageKind::Loser => {
                    ledger.eliminated.insert(record.team_id);
                }
                UsageKind::Winner if record.week != week => {
                    *ledger.winner_counts.entry(record.team_id).or_insert(0) += 1;
                }
                UsageKind::Winner => {}
            }
        }
        ledger
    }

    pub fn check(&self, team_id: i64) -> Result<(), Ineligibility> {
        if self.eliminated.contains(&team_id) {
            return Err(Ineligibility::UsedAsLoser);
        }
        if self.winner_uses(team_id) >= MAX_WINNER_PICKS {
            return Err(Ineligibility::WinnerLimitReached);
        }
        Ok(())
    }

    pub fn winner_uses(&self, team_id: i64) -> usize {
        self.winner_counts.get(&team_id).copied().unwrap_or(0)
    }

    /// All teams the user may not pick this week, ascending by id.
    pub fn unpickable_teams(&self) -> Vec<i64> {
        let mut teams: BTreeSet<i64> = self.eliminated.clone();
        teams.extend(
            self.winner_counts
                .iter()
                .filter(|(_, &count)| count >= MAX_WINNER_PICKS)
                .map(|(&team, _)| team),
        );
        teams.into_iter().collect()
    }
}
