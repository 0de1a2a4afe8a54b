use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    #[serde(rename = "abbr")]
    pub abbreviation: String,
    pub logo_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub week: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub game_time: DateTime<Utc>,
    pub is_completed: bool,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub winner_team_id: Option<i64>,
}

impl Match {
    pub fn involves(&self, team_id: i64) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }

    /// The other side of the matchup, or `None` if `team_id` isn't playing.
    pub fn opponent_of(&self, team_id: i64) -> Option<i64> {
        if team_id == self.home_team_id {
            Some(self.away_team_id)
        } else if team_id == self.away_team_id {
            Some(self.home_team_id)
        } else {
            None
        }
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.game_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub id: i64,
    pub user_id: i64,
    pub match_id: i64,
    pub team_id: i64,
    pub week: i64,
    pub created_at: DateTime<Utc>,
    pub is_correct: Option<bool>, // None until the match is scored
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Winner,
    Loser,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Winner => "winner",
            UsageKind::Loser => "loser",
        }
    }
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "winner" => Ok(UsageKind::Winner),
            "loser" => Ok(UsageKind::Loser),
            other => Err(anyhow::anyhow!("Unknown usage type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamUsage {
    pub user_id: i64,
    pub team_id: i64,
    pub kind: UsageKind,
    pub week: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPick {
    pub user_id: i64,
    pub week: i64,
    pub team_name: String,
    pub team_id: Option<i64>,
    pub is_correct: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultAudit {
    pub id: String,
    pub match_id: i64,
    pub home_score: i64,
    pub away_score: i64,
    pub winner_team_id: Option<i64>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

/// Per-user correctness tallies, historical and live combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTally {
    pub user_id: i64,
    pub username: String,
    pub correct_picks: i64,
    pub total_picks: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    #[serde(skip)]
    pub user_id: i64,
    pub username: String,
    pub points: i64,
    pub total_picks: i64,
    pub correct_picks: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStatus {
    Completed,
    Active,
    Upcoming,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekInfo {
    pub week: i64,
    pub status: WeekStatus,
    pub games_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PickHistoryEntry {
    pub user: String,
    pub week: i64,
    pub team: String,
    pub result: String, // "Correct", "Incorrect", "Pending"
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub id: i64,
    pub week: i64,
    pub home_team: Team,
    pub away_team: Team,
    pub game_time: String, // Vienna local time, RFC 3339
    pub is_completed: bool,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub winner_team_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub current_week: i64,
    pub picks_submitted: i64,
    pub total_points: i64,
    pub correct_picks: i64,
    pub total_picks: i64,
    pub rank: usize,
    pub winner_teams: Vec<String>,
    pub loser_teams: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedResult {
    pub match_id: i64,
    pub home_score: i64,
    pub away_score: i64,
    pub winner_team_id: Option<i64>,
    pub picks_scored: usize,
}

// Request bodies. Fields are optional so missing ones become 400s, not 422s.

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PickRequest {
    pub match_id: Option<i64>,
    pub team_id: Option<i64>,
    pub week: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub match_id: Option<i64>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

// API envelope: {"success": true, ...payload} or {"success": false, "message": ...}
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}
