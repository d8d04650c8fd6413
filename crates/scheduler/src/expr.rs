//! 5-field cron expression parser and matcher.
//!
//! Supports standard expressions: `minute hour day-of-month month
//! day-of-week`, with `*`, `*/N` (step), `N` (literal), `N-M` (range), and
//! `N,M` (list). Day-of-week uses 0=Sunday through 6=Saturday.
//!
//! When *both* day-of-month and day-of-week are restricted (neither is
//! `*`), a date matches if **either** field matches — the classic cron(8)
//! OR-semantics that naive matchers get wrong.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// A parsed 5-field cron expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>, // 0=Sun, 6=Sat
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    /// Parse a standard 5-field cron expression.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.trim().split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "Expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        }

        Ok(CronExpr {
            minutes: Self::parse_field(fields[0], 0, 59)?,
            hours: Self::parse_field(fields[1], 0, 23)?,
            days_of_month: Self::parse_field(fields[2], 1, 31)?,
            months: Self::parse_field(fields[3], 1, 12)?,
            days_of_week: Self::parse_field(fields[4], 0, 6)?,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
        let mut values = Vec::new();

        for part in field.split(',') {
            let part = part.trim();

            if let Some((base, step)) = part.split_once('/') {
                // Step: */N, M/N, or M-N/S
                let step: u32 = step.parse().map_err(|_| format!("Invalid step: {step}"))?;
                if step == 0 {
                    return Err("Step cannot be zero".into());
                }
                let (start, end) = if base == "*" {
                    (min, max)
                } else if base.contains('-') {
                    Self::parse_range(base, min, max)?
                } else {
                    let s: u32 = base.parse().map_err(|_| format!("Invalid number: {base}"))?;
                    (s, max)
                };
                let mut v = start;
                while v <= end {
                    values.push(v);
                    v += step;
                }
            } else if part.contains('-') {
                // Range: M-N
                let (start, end) = Self::parse_range(part, min, max)?;
                for v in start..=end {
                    values.push(v);
                }
            } else if part == "*" {
                for v in min..=max {
                    values.push(v);
                }
            } else {
                // Literal
                let v: u32 = part.parse().map_err(|_| format!("Invalid number: {part}"))?;
                if v < min || v > max {
                    return Err(format!("{v} out of range {min}-{max}"));
                }
                values.push(v);
            }
        }

        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err("Field produced no values".into());
        }
        Ok(values)
    }

    fn parse_range(s: &str, min: u32, max: u32) -> Result<(u32, u32), String> {
        let Some((start, end)) = s.split_once('-') else {
            return Err(format!("Invalid range: {s}"));
        };
        let start: u32 = start
            .parse()
            .map_err(|_| format!("Invalid range start: {start}"))?;
        let end: u32 = end.parse().map_err(|_| format!("Invalid range end: {end}"))?;
        if start < min || end > max || start > end {
            return Err(format!("Range {start}-{end} invalid for {min}-{max}"));
        }
        Ok((start, end))
    }

    /// Check whether the given datetime matches this expression.
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        let time_matches = self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.months.contains(&dt.month());
        if !time_matches {
            return false;
        }

        let dom_matches = self.days_of_month.contains(&dt.day());
        let dow_matches = self
            .days_of_week
            .contains(&dt.weekday().num_days_from_sunday());

        // cron(8): when both day fields are restricted, either may match.
        if self.dom_restricted && self.dow_restricted {
            dom_matches || dow_matches
        } else {
            dom_matches && dow_matches
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn every_minute() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        assert_eq!(expr.minutes.len(), 60);
        assert_eq!(expr.hours.len(), 24);
        assert!(expr.matches(&at(2026, 7, 1, 13, 37)));
    }

    #[test]
    fn specific_time() {
        let expr = CronExpr::parse("30 9 * * 1-5").unwrap();
        assert_eq!(expr.minutes, vec![30]);
        assert_eq!(expr.hours, vec![9]);
        assert_eq!(expr.days_of_week, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn step_values() {
        let expr = CronExpr::parse("*/15 * * * *").unwrap();
        assert_eq!(expr.minutes, vec![0, 15, 30, 45]);
    }

    #[test]
    fn list_values() {
        let expr = CronExpr::parse("0,30 * * * *").unwrap();
        assert_eq!(expr.minutes, vec![0, 30]);
    }

    #[test]
    fn matches_weekday_schedule() {
        // "At 09:30 on weekdays"
        let expr = CronExpr::parse("30 9 * * 1-5").unwrap();

        // 2026-02-23 is a Monday (dow=1)
        assert!(expr.matches(&at(2026, 2, 23, 9, 30)));
        // 2026-02-22 is a Sunday (dow=0)
        assert!(!expr.matches(&at(2026, 2, 22, 9, 30)));
        // Monday, wrong time
        assert!(!expr.matches(&at(2026, 2, 23, 10, 0)));
    }

    #[test]
    fn dom_dow_or_semantics_when_both_restricted() {
        // "At 00:00 on the 13th AND on Fridays" — cron(8) fires on either.
        let expr = CronExpr::parse("0 0 13 * 5").unwrap();

        // 2026-02-13 is a Friday: both match.
        assert!(expr.matches(&at(2026, 2, 13, 0, 0)));
        // 2026-03-13 is a Friday too; 2026-05-13 is a Wednesday: dom matches.
        assert!(expr.matches(&at(2026, 5, 13, 0, 0)));
        // 2026-02-06 is a Friday but not the 13th: dow matches.
        assert!(expr.matches(&at(2026, 2, 6, 0, 0)));
        // 2026-02-11 is a Wednesday and not the 13th: neither matches.
        assert!(!expr.matches(&at(2026, 2, 11, 0, 0)));
    }

    #[test]
    fn dom_and_semantics_when_dow_unrestricted() {
        let expr = CronExpr::parse("0 0 13 * *").unwrap();
        assert!(expr.matches(&at(2026, 5, 13, 0, 0)));
        assert!(!expr.matches(&at(2026, 5, 14, 0, 0)));
    }

    #[test]
    fn dow_and_semantics_when_dom_unrestricted() {
        let expr = CronExpr::parse("0 0 * * 5").unwrap();
        // 2026-02-06 is a Friday.
        assert!(expr.matches(&at(2026, 2, 6, 0, 0)));
        assert!(!expr.matches(&at(2026, 2, 7, 0, 0)));
    }

    #[test]
    fn step_dom_counts_as_restricted() {
        // */2 on dom is a restriction, so dow OR-joins.
        let expr = CronExpr::parse("0 0 */2 * 5").unwrap();
        // 2026-02-06 is a Friday on an even day — dow side matches anyway.
        assert!(expr.matches(&at(2026, 2, 6, 0, 0)));
        // 2026-02-05 is a Thursday, day 5 (odd; steps from 1: 1,3,5,...) — dom matches.
        assert!(expr.matches(&at(2026, 2, 5, 0, 0)));
    }

    #[test]
    fn month_field_respected() {
        let expr = CronExpr::parse("0 0 1 1 *").unwrap();
        assert!(expr.matches(&at(2026, 1, 1, 0, 0)));
        assert!(!expr.matches(&at(2026, 2, 1, 0, 0)));
    }

    #[test]
    fn invalid_field_count_rejected() {
        assert!(CronExpr::parse("* * *").is_err());
        assert!(CronExpr::parse("").is_err());
    }

    #[test]
    fn out_of_range_rejected() {
        assert!(CronExpr::parse("70 * * * *").is_err());
        assert!(CronExpr::parse("* 25 * * *").is_err());
        assert!(CronExpr::parse("* * 32 * *").is_err());
        assert!(CronExpr::parse("* * * 13 *").is_err());
        assert!(CronExpr::parse("* * * * 7").is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(CronExpr::parse("not a cron").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("5-2 * * * *").is_err());
    }
}
