/// Outbound loss injection for exercising the reliable channel.
#[derive(Debug, Clone, Default)]
pub struct PacketLossSimulation {
    pub enabled: bool,
    /// 0 to 100.
    pub loss_percent: f32,
}

impl PacketLossSimulation {
    pub fn with_loss(loss_percent: f32) -> Self {
        Self {
            enabled: loss_percent > 0.0,
            loss_percent: loss_percent.clamp(0.0, 100.0),
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand_percent() * 100.0 < self.loss_percent
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub resends: u64,
    /// Outbound datagrams discarded by [`PacketLossSimulation`].
    pub simulated_drops: u64,
    /// Inbound datagrams that were not valid frames.
    pub malformed_frames: u64,
    pub rtt_ms: f32,
    pub rtt_variance: f32,
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }
}

/// Uniform in `[0, 1)`.
pub fn rand_percent() -> f32 {
    (rand_u64() >> 40) as f32 / (1u64 << 24) as f32
}

pub fn rand_u64() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};
    use std::time::Instant;

    let mut hasher = RandomState::new().build_hasher();
    Instant::now().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_simulation_never_drops() {
        let sim = PacketLossSimulation::default();
        assert!((0..1000).all(|_| !sim.should_drop()));
    }

    #[test]
    fn full_loss_always_drops() {
        let sim = PacketLossSimulation::with_loss(100.0);
        assert!((0..1000).all(|_| sim.should_drop()));
    }

    #[test]
    fn loss_percent_is_clamped() {
        let sim = PacketLossSimulation::with_loss(250.0);
        assert_eq!(sim.loss_percent, 100.0);
        assert!(!PacketLossSimulation::with_loss(-1.0).enabled);
    }

    #[test]
    fn rand_percent_stays_in_range() {
        for _ in 0..1000 {
            let value = rand_percent();
            assert!((0.0..1.0).contains(&value));
        }
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = NetworkStats::default();
        stats.record_sent(27);
        stats.record_sent(45);
        stats.record_received(10);
        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.bytes_sent, 72);
        assert_eq!(stats.bytes_received, 10);
    }
}
