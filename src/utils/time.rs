use chrono::{DateTime, Duration, Utc};

/// Current wall clock time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Whether the RFC 3339 `timestamp` lies further than `age` in the past.
///
/// Unparseable timestamps count as expired so stale records are not stuck
/// forever.
pub fn is_older_than(timestamp: &str, age: Duration) -> bool {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(ts) => ts.with_timezone(&Utc) + age < Utc::now(),
        Err(_) => true,
    }
}
