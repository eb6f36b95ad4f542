//! Connection-level configuration for the dispatch core.

use std::time::Duration;

use crate::catcher::CapturePolicy;

/// Per-connection settings controlling pump bounds and fault capture.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound for a single pump when the caller does not pass one.
    pub iterate_timeout: Duration,
    /// Deadline for synchronous calls and `ResponseFuture::wait`.
    /// `None` waits forever.
    pub sync_timeout: Option<Duration>,
    /// What the fault catcher does with a second fault before the first drains.
    pub capture_policy: CapturePolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            iterate_timeout: Duration::from_millis(50),
            sync_timeout: Some(Duration::from_secs(30)),
            capture_policy: CapturePolicy::KeepFirst,
        }
    }
}
