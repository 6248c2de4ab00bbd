//! Clock-style duration strings used by player status pages.

use std::time::Duration;

/// Parse `hh:mm:ss[.fff]`, `mm:ss[.fff]` or plain (fractional) seconds.
pub fn parse_clock(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut parts = s.rsplitn(3, ':');
    let seconds: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: u64 = match parts.next() {
        Some(m) => m.trim().parse().ok()?,
        None => 0,
    };
    let hours: u64 = match parts.next() {
        Some(h) => h.trim().parse().ok()?,
        None => 0,
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let whole = Duration::from_secs(hours * 3600 + minutes * 60);
    Some(whole + Duration::from_secs_f64(seconds))
}

/// Format as `HH:MM:SS`, truncating sub-second precision.
pub fn format_clock(d: Duration) -> String {
    let total = d.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
