//! Schedule parsing for posts
//!
//! Accepted forms:
//! - RFC 3339 timestamps: "2025-11-20T15:00:00Z", "2025-11-20T15:00:00+02:00"
//! - Naive UTC date-times: "2025-11-20 15:00"
//! - Relative durations from now: "30m", "2h", "1day 2h"

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{PostifyError, Result};

/// Parse a schedule string into a unix timestamp (seconds)
pub fn parse_schedule(input: &str) -> Result<i64> {
    parse_schedule_at(input, Utc::now())
}

/// Same as [`parse_schedule`] with an explicit reference time for relative input
pub fn parse_schedule_at(input: &str, now: DateTime<Utc>) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PostifyError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp());
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Ok(naive.and_utc().timestamp());
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let seconds = i64::try_from(duration.as_secs())
            .map_err(|_| PostifyError::InvalidInput("Duration out of range".to_string()))?;
        return now
            .timestamp()
            .checked_add(seconds)
            .ok_or_else(|| PostifyError::InvalidInput("Duration out of range".to_string()));
    }

    Err(PostifyError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_schedule_at("2025-11-20T15:00:00Z", reference()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 11, 20, 15, 0, 0).unwrap().timestamp());

        let offset = parse_schedule_at("2025-11-20T17:00:00+02:00", reference()).unwrap();
        assert_eq!(offset, ts);
    }

    #[test]
    fn test_parse_naive_datetime_as_utc() {
        let ts = parse_schedule_at("2025-11-20 15:00", reference()).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2025, 11, 20, 15, 0, 0).unwrap().timestamp());
    }

    #[test]
    fn test_parse_relative_duration() {
        let now = reference();
        assert_eq!(parse_schedule_at("30m", now).unwrap(), now.timestamp() + 1800);
        assert_eq!(parse_schedule_at("2h", now).unwrap(), now.timestamp() + 7200);
        assert_eq!(
            parse_schedule_at("1day 2h", now).unwrap(),
            now.timestamp() + 86400 + 7200
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_schedule("").is_err());
        assert!(parse_schedule("   ").is_err());
        let err = parse_schedule("next blue moon").unwrap_err();
        assert!(err.to_string().contains("Could not parse schedule string"));
    }
}
