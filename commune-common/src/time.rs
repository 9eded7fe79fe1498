//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp `minutes` after `from`
pub fn minutes_after(from: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    from + Duration::minutes(minutes)
}

/// Timestamp `hours` after `from`
pub fn hours_after(from: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    from + Duration::hours(hours)
}

/// Calendar month key (`YYYY-MM`) used for donation reporting
pub fn month_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_minutes_after() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let later = minutes_after(base, 15);
        assert_eq!(later, Utc.with_ymd_and_hms(2024, 3, 1, 12, 15, 0).unwrap());
    }

    #[test]
    fn test_hours_after_crosses_day() {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        let later = hours_after(base, 168);
        assert_eq!(later, Utc.with_ymd_and_hms(2024, 3, 8, 20, 0, 0).unwrap());
    }

    #[test]
    fn test_month_key_is_zero_padded() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        assert_eq!(month_key(ts), "2024-02");
    }
}
