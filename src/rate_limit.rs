use std::sync::Arc;

use crate::ephemeral::EphemeralStore;
use crate::error::EphemeralError;

/// Fixed-window message rate limiter backed by the ephemeral counter. The
/// first write in a window sets the TTL; increments never refresh it, so the
/// window is fixed rather than sliding.
pub struct RateLimiter {
    store: Arc<dyn EphemeralStore>,
    limit: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn EphemeralStore>, limit: u32, window_secs: u64) -> Self {
        RateLimiter { store, limit, window_secs }
    }

    /// Whether the user may send another message right now. A denial does
    /// not consume capacity.
    pub async fn allow(&self, user_id: &str) -> Result<bool, EphemeralError> {
        self.store.check_rate_limit(user_id, self.limit, self.window_secs).await
    }
}
