use std::time::Duration;

use trueshot::{DEFAULT_MAX_PEERS, TICK_RATE};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: u32,
    pub max_clients: usize,
    /// Upper bound on how long one loop iteration waits for network events.
    pub poll_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            max_clients: DEFAULT_MAX_PEERS,
            poll_timeout: Duration::from_millis(1),
        }
    }
}
