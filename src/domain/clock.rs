use chrono::{NaiveDate, NaiveTime};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_24H: &str = "%H:%M";
const TIME_12H: &str = "%I:%M %p";

/// Parses a calendar date in `YYYY-MM-DD` form.
pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|error| format!("'{value}' is not a YYYY-MM-DD date: {error}"))
}

/// Parses a wall-clock time written either as `HH:MM` or `hh:mm AM/PM`.
///
/// The 24-hour form is tried first, so `"07:15"` is always a morning time.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time is empty".to_string());
    }
    NaiveTime::parse_from_str(trimmed, TIME_24H)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, TIME_12H))
        .map_err(|_| format!("'{value}' is neither HH:MM nor hh:mm AM/PM"))
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), TIME_24H).ok()
}

pub fn format_hhmm(value: NaiveTime) -> String {
    value.format(TIME_24H).to_string()
}

/// Renders whole minutes as `"{hours}h {minutes}m"`, e.g. 90 -> `"1h 30m"`.
pub fn format_duration(minutes: i64) -> String {
    format!("{}h {}m", minutes.div_euclid(60), minutes.rem_euclid(60))
}
