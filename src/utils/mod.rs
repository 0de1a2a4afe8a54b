use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Vienna;

use crate::models::{Match, WeekStatus};

/// An instant as Vienna wall-clock time, with the offset in effect then.
pub fn to_vienna(utc: DateTime<Utc>) -> DateTime<FixedOffset> {
    utc.with_timezone(&Vienna).fixed_offset()
}

/// Interpret a wall-clock time in Vienna and return the UTC instant.
/// Ambiguous autumn times resolve to the earlier instant; times skipped by
/// the spring change move forward by the gap.
pub fn vienna_local_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    Vienna
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| Vienna.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// Status of a week given its matches and the season's current week.
/// Earlier weeks that still have open matches stay active.
pub fn week_status(week: i64, current_week: i64, matches: &[Match]) -> WeekStatus {
    if !matches.is_empty() && matches.iter().all(|m| m.is_completed) {
        WeekStatus::Completed
    } else if week <= current_week {
        WeekStatus::Active
    } else {
        WeekStatus::Upcoming
    }
}

pub fn team_logo_url(abbreviation: &str) -> String {
    format!(
        "https://a.espncdn.com/i/teamlogos/nfl/500/{}.png",
        abbreviation.to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    fn game(week: i64, is_completed: bool) -> Match {
        Match {
            id: week,
            week,
            home_team_id: 1,
            away_team_id: 2,
            game_time: Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap(),
            is_completed,
            home_score: None,
            away_score: None,
            winner_team_id: None,
        }
    }

    #[test]
    fn test_vienna_offsets() {
        let september = Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap();
        assert_eq!(to_vienna(september).offset().local_minus_utc(), 7200);
        assert_eq!(to_vienna(september).to_rfc3339(), "2025-09-07T19:00:00+02:00");

        let december = Utc.with_ymd_and_hms(2025, 12, 7, 18, 0, 0).unwrap();
        assert_eq!(to_vienna(december).offset().local_minus_utc(), 3600);

        // summer time ends at 01:00 UTC on the last Sunday of October
        let before_change = Utc.with_ymd_and_hms(2025, 10, 26, 0, 59, 0).unwrap();
        let after_change = Utc.with_ymd_and_hms(2025, 10, 26, 1, 0, 0).unwrap();
        assert_eq!(to_vienna(before_change).offset().local_minus_utc(), 7200);
        assert_eq!(to_vienna(after_change).offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_local_to_utc() {
        assert_eq!(
            vienna_local_to_utc(local(2025, 9, 7, 19, 0)),
            Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap()
        );
        assert_eq!(
            vienna_local_to_utc(local(2025, 11, 2, 19, 0)),
            Utc.with_ymd_and_hms(2025, 11, 2, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_local_to_utc_around_changes() {
        // 02:30 happens twice on 2025-10-26; the first one is CEST
        assert_eq!(
            vienna_local_to_utc(local(2025, 10, 26, 2, 30)),
            Utc.with_ymd_and_hms(2025, 10, 26, 0, 30, 0).unwrap()
        );
        // 02:30 does not exist on 2026-03-29
        assert_eq!(
            vienna_local_to_utc(local(2026, 3, 29, 2, 30)),
            Utc.with_ymd_and_hms(2026, 3, 29, 1, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_week_status() {
        let done = vec![game(1, true), game(1, true)];
        let open = vec![game(2, true), game(2, false)];

        assert_eq!(week_status(1, 3, &done), WeekStatus::Completed);
        assert_eq!(week_status(2, 3, &open), WeekStatus::Active);
        assert_eq!(week_status(3, 3, &open), WeekStatus::Active);
        assert_eq!(week_status(4, 3, &open), WeekStatus::Upcoming);
        assert_eq!(week_status(5, 3, &[]), WeekStatus::Upcoming);
    }

    #[test]
    fn test_logo_url() {
        assert_eq!(team_logo_url("GB"), "https://a.espncdn.com/i/teamlogos/nfl/500/gb.png");
    }
}
