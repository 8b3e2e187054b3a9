//! Parsing of the UTC offset that defines the attendance day.

use chrono::{FixedOffset, Offset, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DayOffsetError {
    #[error("day offset must look like +HH:MM, +HH, Z or UTC, got '{0}'")]
    Format(String),
    #[error("day offset out of range: '{0}'")]
    Range(String),
}

/// Parse `+HH:MM`, `-HH:MM`, `+HH`, `Z` or `UTC` into a fixed offset.
pub fn parse_day_offset(raw: &str) -> Result<FixedOffset, DayOffsetError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(DayOffsetError::Format(raw.to_string())),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let format_err = || DayOffsetError::Format(raw.to_string());
    let hours: i32 = hours.parse().map_err(|_| format_err())?;
    let minutes: i32 = minutes.parse().map_err(|_| format_err())?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(DayOffsetError::Range(raw.to_string()));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| DayOffsetError::Range(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset_variants() {
        assert_eq!(parse_day_offset("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_day_offset("-08:00").unwrap().local_minus_utc(), -28_800);
        assert_eq!(parse_day_offset("+02").unwrap().local_minus_utc(), 7_200);
        assert_eq!(parse_day_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_day_offset(" z ").unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_parse_offset_rejects_garbage() {
        assert!(matches!(parse_day_offset("05:00"), Err(DayOffsetError::Format(_))));
        assert!(matches!(parse_day_offset("+25:00"), Err(DayOffsetError::Range(_))));
        assert!(matches!(parse_day_offset("+01:75"), Err(DayOffsetError::Range(_))));
        assert!(matches!(parse_day_offset("+ab:00"), Err(DayOffsetError::Format(_))));
        assert!(parse_day_offset("").is_err());
    }
}
