//! UTC time helpers and the injectable clock (no chrono dependency).
//!
//! Uses Howard Hinnant's civil_from_days algorithm for Unix-to-date conversion.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::MS_PER_DAY;

/// Source of "now" in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        now_ms()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Current UTC time as Unix milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Fractional days between two instants (negative if `to` is earlier).
pub fn days_between(from_ms: i64, to_ms: i64) -> f64 {
    to_ms.saturating_sub(from_ms) as f64 / MS_PER_DAY
}

/// Convert Unix milliseconds to an ISO-8601 UTC string.
pub fn ms_to_iso8601(ms: i64) -> String {
    let secs = ms.div_euclid(1000);
    let days = secs.div_euclid(86400);
    let time_of_day = secs.rem_euclid(86400);
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (y, m, d) = civil_from_days(days);
    format!("{y:04}-{m:02}-{d:02}T{hours:02}:{minutes:02}:{seconds:02}Z")
}

/// Parse `YYYY-MM-DD` (midnight UTC) or a bare integer of Unix milliseconds.
pub fn parse_date_ms(input: &str) -> Option<i64> {
    let input = input.trim();
    if let Ok(ms) = input.parse::<i64>() {
        return Some(ms);
    }
    let mut parts = input.splitn(3, '-');
    let y: i64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let d: u64 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return None;
    }
    Some(days_from_civil(y, m, d) * 86_400_000)
}

/// Howard Hinnant's civil_from_days: Unix epoch days → (year, month, day).
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Inverse of `civil_from_days`.
fn days_from_civil(y: i64, m: u64, d: u64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u64;
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe as i64 - 719468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        assert_eq!(ms_to_iso8601(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_known_date() {
        // 2026-02-21T00:00:00Z
        assert_eq!(ms_to_iso8601(1_771_632_000_000), "2026-02-21T00:00:00Z");
        assert_eq!(parse_date_ms("2026-02-21"), Some(1_771_632_000_000));
    }

    #[test]
    fn test_pre_epoch() {
        assert_eq!(ms_to_iso8601(-1000), "1969-12-31T23:59:59Z");
        assert_eq!(parse_date_ms("1969-12-31"), Some(-86_400_000));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_date_ms("2026-13-01"), None);
        assert_eq!(parse_date_ms("soon"), None);
        assert_eq!(parse_date_ms("1700000000000"), Some(1_700_000_000_000));
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(0, 86_400_000 * 3), 3.0);
        assert_eq!(days_between(86_400_000, 0), -1.0);
    }

    #[test]
    fn test_days_between_extreme_instants_saturate() {
        let forward = days_between(i64::MIN, i64::MAX);
        let backward = days_between(i64::MAX, i64::MIN);
        assert!(forward.is_finite() && forward > 0.0);
        assert!(backward.is_finite() && backward < 0.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(7);
        assert_eq!(clock.now_ms(), 7);
    }

    #[test]
    fn test_now_is_recent() {
        let ts = ms_to_iso8601(SystemClock.now_ms());
        assert!(ts.starts_with("20"), "timestamp should be this century: {ts}");
    }
}
