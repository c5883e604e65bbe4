//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as Unix epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert stored Unix seconds to a UTC timestamp
///
/// Out-of-range values clamp to the Unix epoch.
pub fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_now_millis_matches_now() {
        let millis = now_millis();
        let secs = now().timestamp();
        assert!((millis / 1000 - secs).abs() <= 1);
    }

    #[test]
    fn test_from_unix_round_trips_seconds() {
        let ts = from_unix(1_700_000_000);
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_from_unix_out_of_range_clamps() {
        assert_eq!(from_unix(i64::MAX), DateTime::<Utc>::UNIX_EPOCH);
    }
}
