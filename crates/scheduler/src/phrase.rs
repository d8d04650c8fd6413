//! Natural language to cron expression conversion.
//!
//! Rule-based (no LLM call): a fixed, ordered list of patterns maps
//! human-readable scheduling phrases onto standard cron expressions.
//! Unrecognised input yields `None`; the caller reports an error with
//! examples.

use regex_lite::Regex;
use std::sync::LazyLock;

const DAY_MAP: &[(&str, &str)] = &[
    ("monday", "1"),
    ("tuesday", "2"),
    ("wednesday", "3"),
    ("thursday", "4"),
    ("friday", "5"),
    ("saturday", "6"),
    ("sunday", "0"),
    ("mon", "1"),
    ("tue", "2"),
    ("wed", "3"),
    ("thu", "4"),
    ("fri", "5"),
    ("sat", "6"),
    ("sun", "0"),
];

static EVERY_N_MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)every\s+(\d+)\s+minutes?").expect("pattern is valid"));

static EVERY_N_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)every\s+(\d+)\s+hours?").expect("pattern is valid"));

static EVERY_MINUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)every\s+minute").expect("pattern is valid"));

static EVERY_HOUR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)every\s+hour").expect("pattern is valid"));

static EVERY_DAY_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)every\s+day\s+at\s+(\d{1,2})\s*(am|pm)?").expect("pattern is valid")
});

static EVERY_WEEKDAY_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)every\s+weekday\s+at\s+(\d{1,2})\s*(am|pm)?").expect("pattern is valid")
});

static EVERY_NAMED_DAY_AT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)every\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tue|wed|thu|fri|sat|sun)\s+at\s+(\d{1,2})\s*(am|pm)?",
    )
    .expect("pattern is valid")
});

static EVERY_MONTH_ON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)every\s+month\s+on\s+the\s+(\d{1,2})(st|nd|rd|th)?").expect("pattern is valid")
});

static RAW_CRON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([*\d/,\-]+\s+[*\d/,\-]+\s+[*\d/,\-]+\s+[*\d/,\-]+\s+[*\d/,\-]+)$")
        .expect("pattern is valid")
});

/// Convert a 12-hour or 24-hour time to a 24-hour integer.
fn parse_hour(hour_str: &str, ampm: Option<&str>) -> u32 {
    let hour: u32 = hour_str.parse().unwrap_or(0);
    match ampm.map(str::to_ascii_lowercase).as_deref() {
        Some("pm") if hour != 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    }
}

/// Convert a natural language scheduling phrase to a cron expression.
///
/// Returns the cron string, or `None` if the phrase is not recognised.
pub fn parse_phrase(expression: &str) -> Option<String> {
    let text = expression.trim();

    if let Some(caps) = EVERY_N_MINUTES.captures(text) {
        return Some(format!("*/{} * * * *", &caps[1]));
    }
    if let Some(caps) = EVERY_N_HOURS.captures(text) {
        return Some(format!("0 */{} * * *", &caps[1]));
    }
    if EVERY_MINUTE.is_match(text) {
        return Some("* * * * *".into());
    }
    if EVERY_HOUR.is_match(text) {
        return Some("0 * * * *".into());
    }
    if let Some(caps) = EVERY_MONTH_ON.captures(text) {
        return Some(format!("0 0 {} * *", &caps[1]));
    }
    if let Some(caps) = EVERY_DAY_AT.captures(text) {
        let hour = parse_hour(&caps[1], caps.get(2).map(|m| m.as_str()));
        return Some(format!("0 {hour} * * *"));
    }
    if let Some(caps) = EVERY_NAMED_DAY_AT.captures(text) {
        let name = caps[1].to_ascii_lowercase();
        let day = DAY_MAP
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, d)| *d)
            .unwrap_or("0");
        let hour = parse_hour(&caps[2], caps.get(3).map(|m| m.as_str()));
        return Some(format!("0 {hour} * * {day}"));
    }
    if let Some(caps) = EVERY_WEEKDAY_AT.captures(text) {
        let hour = parse_hour(&caps[1], caps.get(2).map(|m| m.as_str()));
        return Some(format!("0 {hour} * * 1-5"));
    }
    if let Some(caps) = RAW_CRON.captures(text) {
        return Some(caps[1].to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_n_minutes() {
        assert_eq!(parse_phrase("every 5 minutes").as_deref(), Some("*/5 * * * *"));
        assert_eq!(parse_phrase("every 1 minute").as_deref(), Some("*/1 * * * *"));
    }

    #[test]
    fn every_minute_and_hour() {
        assert_eq!(parse_phrase("every minute").as_deref(), Some("* * * * *"));
        assert_eq!(parse_phrase("every hour").as_deref(), Some("0 * * * *"));
    }

    #[test]
    fn every_n_hours() {
        assert_eq!(parse_phrase("every 2 hours").as_deref(), Some("0 */2 * * *"));
    }

    #[test]
    fn every_day_with_meridiem() {
        assert_eq!(parse_phrase("every day at 9am").as_deref(), Some("0 9 * * *"));
        assert_eq!(parse_phrase("every day at 9pm").as_deref(), Some("0 21 * * *"));
        assert_eq!(parse_phrase("every day at 12am").as_deref(), Some("0 0 * * *"));
        assert_eq!(parse_phrase("every day at 12pm").as_deref(), Some("0 12 * * *"));
    }

    #[test]
    fn every_day_24h() {
        assert_eq!(parse_phrase("every day at 14").as_deref(), Some("0 14 * * *"));
    }

    #[test]
    fn named_days() {
        assert_eq!(parse_phrase("every Monday at 3pm").as_deref(), Some("0 15 * * 1"));
        assert_eq!(parse_phrase("every Friday at 5pm").as_deref(), Some("0 17 * * 5"));
        assert_eq!(parse_phrase("every sunday at 6am").as_deref(), Some("0 6 * * 0"));
    }

    #[test]
    fn abbreviated_day_names() {
        assert_eq!(parse_phrase("every Mon at 8am").as_deref(), Some("0 8 * * 1"));
        assert_eq!(parse_phrase("every Wed at 12pm").as_deref(), Some("0 12 * * 3"));
        assert_eq!(parse_phrase("every Sun at 6am").as_deref(), Some("0 6 * * 0"));
    }

    #[test]
    fn monthly_ordinals() {
        assert_eq!(parse_phrase("every month on the 1st").as_deref(), Some("0 0 1 * *"));
        assert_eq!(parse_phrase("every month on the 2nd").as_deref(), Some("0 0 2 * *"));
        assert_eq!(parse_phrase("every month on the 3rd").as_deref(), Some("0 0 3 * *"));
        assert_eq!(parse_phrase("every month on the 15th").as_deref(), Some("0 0 15 * *"));
    }

    #[test]
    fn weekday_shortcut() {
        assert_eq!(parse_phrase("every weekday at 9am").as_deref(), Some("0 9 * * 1-5"));
        assert_eq!(parse_phrase("every weekday at 18").as_deref(), Some("0 18 * * 1-5"));
    }

    #[test]
    fn raw_cron_passthrough() {
        assert_eq!(parse_phrase("*/10 * * * *").as_deref(), Some("*/10 * * * *"));
        assert_eq!(parse_phrase("0 9 * * 1-5").as_deref(), Some("0 9 * * 1-5"));
        assert_eq!(parse_phrase("15,45 */2 1-15 * *").as_deref(), Some("15,45 */2 1-15 * *"));
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        assert_eq!(parse_phrase("  EVERY 5 MINUTES  ").as_deref(), Some("*/5 * * * *"));
    }

    #[test]
    fn unrecognised_returns_none() {
        assert_eq!(parse_phrase("whenever I feel like it"), None);
        assert_eq!(parse_phrase(""), None);
        assert_eq!(parse_phrase("* * * *"), None); // 4 fields is not raw cron
    }

    #[test]
    fn reparse_is_stable() {
        // Every recognised phrase maps to a cron expression that the raw
        // passthrough maps to itself.
        let phrases = [
            "every 5 minutes",
            "every 2 hours",
            "every minute",
            "every hour",
            "every day at 9am",
            "every Monday at 3pm",
            "every month on the 15th",
            "every weekday at 9am",
        ];
        for phrase in phrases {
            let cron = parse_phrase(phrase).unwrap();
            assert_eq!(parse_phrase(&cron).as_deref(), Some(cron.as_str()), "{phrase}");
        }
    }
}
