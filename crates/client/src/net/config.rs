use std::time::Duration;

use trueshot::TICK_RATE;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub tick_rate: u32,
    /// How long the handshake may take before the attempt is abandoned.
    pub connect_timeout: Duration,
    pub poll_timeout: Duration,
    pub max_pending_inputs: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            connect_timeout: Duration::from_secs(5),
            poll_timeout: Duration::from_millis(1),
            max_pending_inputs: 1024,
        }
    }
}
