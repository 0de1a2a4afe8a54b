use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::env;
use std::fmt;
use std::str::FromStr;

/// How ties on the leaderboard are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankPolicy {
    /// 1, 2, 3, 4 regardless of ties
    #[default]
    Sequential,
    /// 1, 1, 3, 4
    Competition,
}

impl FromStr for RankPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sequential" | "strict" => Ok(RankPolicy::Sequential),
            "competition" | "shared" => Ok(RankPolicy::Competition),
            other => Err(anyhow!("Unknown rank policy: {}", other)),
        }
    }
}

/// A participant from the fixed user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub users: Vec<Participant>,
    pub admins: Vec<String>,
    pub rank_policy: RankPolicy,
    pub current_week_override: Option<i64>,
    pub season_start: NaiveDate,
    pub espn_timeout_secs: u64,
    pub espn_sync: bool,
}

pub const DEFAULT_USERS: [&str; 4] = ["Manuel", "Daniel", "Raff", "Haunschi"];
pub const SEASON_WEEKS: i64 = 18;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:nfl_pickem.db".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
            session_secret: "nfl_pickem_dev_secret".to_string(),
            session_ttl_hours: 24 * 14,
            users: participants(DEFAULT_USERS.iter().copied()),
            admins: vec!["Manuel".to_string()],
            rank_policy: RankPolicy::Sequential,
            current_week_override: None,
            season_start: NaiveDate::from_ymd_opt(2025, 9, 7).unwrap_or(NaiveDate::MIN),
            espn_timeout_secs: 10,
            espn_sync: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_env_only()
    }

    /// Reads only the process environment, without touching `.env`.
    pub fn from_env_only() -> Result<Self> {
        let defaults = Self::default();

        let users = match env::var("PICKEM_USERS") {
            Ok(list) => participants(split_list(&list)),
            Err(_) => defaults.users,
        };
        if users.is_empty() {
            return Err(anyhow!("PICKEM_USERS must name at least one participant"));
        }

        let admins = env::var("PICKEM_ADMINS")
            .map(|list| split_list(&list).map(str::to_string).collect())
            .unwrap_or(defaults.admins);

        let rank_policy = match env::var("RANK_POLICY") {
            Ok(p) => p.parse()?,
            Err(_) => defaults.rank_policy,
        };

        let current_week_override = match env::var("CURRENT_WEEK") {
            Ok(w) => Some(parse_week(&w)?),
            Err(_) => None,
        };

        let season_start = match env::var("SEASON_START") {
            Ok(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|e| anyhow!("Invalid SEASON_START '{}': {}", d, e))?,
            Err(_) => defaults.season_start,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            host: env::var("HOST").unwrap_or(defaults.host),
            port: var_or("PORT", defaults.port)?,
            session_secret: env::var("SESSION_SECRET").unwrap_or(defaults.session_secret),
            session_ttl_hours: var_or("SESSION_TTL_HOURS", defaults.session_ttl_hours)?,
            users,
            admins,
            rank_policy,
            current_week_override,
            season_start,
            espn_timeout_secs: var_or("ESPN_TIMEOUT_SECS", defaults.espn_timeout_secs)?,
            espn_sync: env::var("ESPN_SYNC")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.espn_sync),
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn find_user_by_name(&self, name: &str) -> Option<&Participant> {
        self.users.iter().find(|u| u.name == name)
    }

    pub fn is_admin(&self, name: &str) -> bool {
        self.admins.iter().any(|a| a == name)
    }
}

fn parse_setting<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {} '{}': {}", name, raw, e))
}

/// Parsed value of an environment variable, or `default` when it is unset.
fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_setting(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_week(raw: &str) -> Result<i64> {
    let week: i64 = parse_setting("CURRENT_WEEK", raw)?;
    if !(1..=SEASON_WEEKS).contains(&week) {
        return Err(anyhow!("CURRENT_WEEK must be between 1 and {}, got {}", SEASON_WEEKS, week));
    }
    Ok(week)
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn participants<'a>(names: impl Iterator<Item = &'a str>) -> Vec<Participant> {
    names
        .enumerate()
        .map(|(i, name)| Participant {
            id: i as i64 + 1,
            name: name.to_string(),
        })
        .collect()
}
