//! Trading session clock
//!
//! Day-scoped orders expire at session close, 16:00 local civil time. The
//! background pruner sleeps until the next close boundary plus a short grace
//! period and then sweeps the book. The clock is injected so tests can pin
//! the boundary; production uses the host's local time.

use chrono::{DateTime, Local, LocalResult, NaiveTime};
use std::time::Duration;

/// Hour of local civil time at which the trading session ends.
pub const SESSION_CLOSE_HOUR: u32 = 16;

/// Slack added past the close boundary before sweeping.
pub const PRUNE_GRACE: Duration = Duration::from_millis(100);

/// Source of local civil time for the pruner
pub trait SessionClock: Send + 'static {
    fn now(&self) -> DateTime<Local>;
}

/// Production clock reading the host's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SessionClock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Next 16:00 local boundary strictly after `now`
///
/// At or past the close hour the boundary moves to the next day.
pub fn next_session_close(now: DateTime<Local>) -> DateTime<Local> {
    let close_time = NaiveTime::from_hms_opt(SESSION_CLOSE_HOUR, 0, 0).unwrap_or_default();

    let mut close_date = now.date_naive();
    if now.time() >= close_time {
        close_date = close_date.succ_opt().unwrap_or(close_date);
    }

    match close_date.and_time(close_time).and_local_timezone(Local) {
        LocalResult::Single(close) | LocalResult::Ambiguous(close, _) => close,
        // 16:00 skipped by an offset transition; fall back to one day out
        LocalResult::None => now + chrono::Duration::hours(24),
    }
}

/// Wall-clock wait from `now` until the next sweep
pub fn until_next_prune(now: DateTime<Local>) -> Duration {
    let close = next_session_close(now);
    (close - now).to_std().unwrap_or_default() + PRUNE_GRACE
}
