//! NBA season arithmetic. A season is identified by the year it starts in;
//! the league proxy and the local store use the `"2024-25"` spelling instead.

use chrono::{Datelike, NaiveDate, Utc};

/// Season start year for a calendar date. Seasons tip off in October, so
/// January through September still belong to the previous year's season.
pub fn current_season(today: NaiveDate) -> i32 {
    if today.month() < 10 {
        today.year() - 1
    } else {
        today.year()
    }
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// `2024` → `"2024-25"`.
pub fn season_string(year: i32) -> String {
    format!("{}-{:02}", year, (year + 1).rem_euclid(100))
}

/// `"2024-25"` → `2024`. Accepts a bare year too.
pub fn parse_season_string(s: &str) -> Option<i32> {
    s.trim().split('-').next()?.parse().ok()
}
