//! Engine tuning knobs.

use std::time::Duration;

use crate::candidates::{MAX_RETRY, MAX_STAY};
use crate::dedupe::RESEND_PROTECT;
use crate::pipeline::sink::SortMode;

/// Timing and policy settings for one engine run.
///
/// The settings document supplies the user-facing fields. The rest are
/// fixed behaviour that tests shorten.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest allowed modification time difference inside a pair.
    /// `None` disables the check.
    pub delta: Option<Duration>,
    /// Largest age of a newly created file for its event to count.
    /// `None` disables the check.
    pub freshness: Option<Duration>,
    /// Debounce window before pending events are flushed.
    pub sort_delay: Duration,
    pub sort: SortMode,
    /// Deliver pairs whose decoded text is empty.
    pub accept_empty_text: bool,

    /// Write events older than this are attribute noise, not content.
    pub write_deadline: Duration,
    pub resend_window: Duration,
    /// Re-evaluation delay after a cycle that left candidates waiting.
    pub recheck_delay: Duration,
    /// Re-evaluation delay after the host could not be reached.
    pub host_retry_delay: Duration,
    pub project_poll_interval: Duration,
    /// Quiet period after a settings write before reloading.
    pub settings_debounce: Duration,
    pub max_retry: u32,
    pub max_stay: u32,
    /// Pending paths that force an early flush.
    pub max_batch_events: usize,
    /// Capacity of the watcher-to-loop queue.
    pub signal_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delta: Some(Duration::from_secs(15)),
            freshness: Some(Duration::from_secs(5)),
            sort_delay: Duration::from_millis(100),
            sort: SortMode::ModDate,
            accept_empty_text: false,
            write_deadline: Duration::from_secs(5),
            resend_window: RESEND_PROTECT,
            recheck_delay: Duration::from_millis(500),
            host_retry_delay: Duration::from_secs(3),
            project_poll_interval: Duration::from_secs(5),
            settings_debounce: Duration::from_millis(100),
            max_retry: MAX_RETRY,
            max_stay: MAX_STAY,
            max_batch_events: 1024,
            signal_capacity: 10_000,
        }
    }
}

impl EngineConfig {
    /// Map a seconds value from the settings document, `0` meaning off.
    pub fn optional_secs(secs: f64) -> Option<Duration> {
        (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
    }
}
