use std::sync::Arc;
use std::time::Instant;

use crate::registry::Broadcaster;
use crate::switch::SourceSwitch;

/// Main server state shared across all handlers
pub struct AppState {
    pub hub: Broadcaster,
    pub switch: Arc<SourceSwitch>,
    /// Outbound events buffered per client
    pub session_queue_capacity: usize,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hub: Broadcaster, switch: Arc<SourceSwitch>, session_queue_capacity: usize) -> Self {
        Self {
            hub,
            switch,
            session_queue_capacity,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
