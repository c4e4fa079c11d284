use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use glam::Vec3;

use trueshot::{
    Channel, ClientPredictor, ConnectionState, EncodeError, FixedTimestep, InputIntent,
    InputState, Packet, PeerHandle, PlayerId, PredictionError, ReconcileOutcome, Transport,
    TransportError, TransportEvent,
};

use super::config::ClientConfig;
use super::input::InputSource;

/// Extra time granted past the handshake timeout before giving up on the
/// transport ever reporting an outcome.
const CONNECT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("already connected or connecting")]
    AlreadyConnected,
    #[error("not connected to a server")]
    NotConnected,
    #[error("connection to {0} timed out")]
    ConnectTimeout(SocketAddr),
    #[error("connection to {0} was rejected")]
    ConnectRejected(SocketAddr),
    #[error("prediction stalled: {0}")]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub inputs_sent: u64,
    pub send_failures: u64,
    pub snapshots_received: u64,
    pub snapshots_applied: u64,
    /// Stale, future or foreign snapshots the predictor skipped.
    pub snapshots_ignored: u64,
    pub decode_failures: u64,
    pub unexpected_packets: u64,
}

/// Drives a [`ClientPredictor`] over any [`Transport`].
///
/// One call to [`NetworkClient::tick_once`] drains the transport, predicts
/// the next tick and ships the stamped input on the reliable channel.
pub struct NetworkClient<T: Transport> {
    transport: T,
    config: ClientConfig,
    state: ConnectionState,
    server: Option<PeerHandle>,
    server_addr: Option<SocketAddr>,
    predictor: ClientPredictor,
    stats: ClientStats,
    connection_start_time: Option<Instant>,
    running: Arc<AtomicBool>,
}

impl<T: Transport> NetworkClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            predictor: ClientPredictor::with_capacity(config.max_pending_inputs),
            state: ConnectionState::Disconnected,
            server: None,
            server_addr: None,
            stats: ClientStats::default(),
            connection_start_time: None,
            running: Arc::new(AtomicBool::new(true)),
            config,
        }
    }

    /// Starts the handshake. Completion is observed through [`Self::poll_network`].
    pub fn connect(&mut self, server_addr: SocketAddr) -> Result<PeerHandle, ClientError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::AlreadyConnected);
        }

        log::info!("Connecting to {}", server_addr);
        let server = self
            .transport
            .connect(server_addr, self.config.connect_timeout)?;

        self.state = ConnectionState::Connecting;
        self.server = Some(server);
        self.server_addr = Some(server_addr);
        self.connection_start_time = Some(Instant::now());
        Ok(server)
    }

    /// Connects and waits for the handshake to finish.
    pub fn connect_blocking(&mut self, server_addr: SocketAddr) -> Result<PeerHandle, ClientError> {
        let started = Instant::now();
        let server = self.connect(server_addr)?;
        let deadline = self.config.connect_timeout + CONNECT_GRACE;

        loop {
            self.poll_network()?;

            match self.state {
                ConnectionState::Connected => return Ok(server),
                ConnectionState::Disconnected => {
                    return if started.elapsed() >= self.config.connect_timeout {
                        Err(ClientError::ConnectTimeout(server_addr))
                    } else {
                        Err(ClientError::ConnectRejected(server_addr))
                    };
                }
                ConnectionState::Connecting => {
                    if started.elapsed() >= deadline {
                        log::warn!("Giving up on {} after {:?}", server_addr, started.elapsed());
                        self.disconnect();
                        return Err(ClientError::ConnectTimeout(server_addr));
                    }
                }
            }
        }
    }

    /// Drains every pending transport event.
    pub fn poll_network(&mut self) -> Result<(), ClientError> {
        let events = self.transport.poll(self.config.poll_timeout)?;
        for event in events {
            self.handle_event(event);
        }
        Ok(())
    }

    /// Keeps polling for `duration`, so late snapshots still get reconciled.
    pub fn poll_for(&mut self, duration: Duration) -> Result<(), ClientError> {
        let start = Instant::now();
        while start.elapsed() < duration && self.state != ConnectionState::Disconnected {
            self.poll_network()?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect(peer) if self.server == Some(peer) => {
                if self.state == ConnectionState::Connecting {
                    self.state = ConnectionState::Connected;
                    let elapsed = self
                        .connection_start_time
                        .map(|start| start.elapsed())
                        .unwrap_or_default();
                    log::info!("Connected to {} in {:?}", peer, elapsed);
                }
            }
            TransportEvent::Disconnect(peer) if self.server == Some(peer) => {
                match self.state {
                    ConnectionState::Connecting => log::warn!("Connection attempt failed"),
                    _ => log::warn!("Disconnected from server"),
                }
                self.reset();
            }
            TransportEvent::Receive(peer, bytes) if self.server == Some(peer) => {
                self.handle_payload(&bytes);
            }
            other => log::trace!("Ignoring {:?}", other),
        }
    }

    fn handle_payload(&mut self, bytes: &[u8]) {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.decode_failures += 1;
                log::debug!("Dropping {} byte packet from server: {}", bytes.len(), e);
                return;
            }
        };

        let snapshot = match packet {
            Packet::Snapshot(snapshot) => snapshot,
            other => {
                self.stats.unexpected_packets += 1;
                log::debug!("Ignoring {} packet from server", other.kind().as_str());
                return;
            }
        };

        self.stats.snapshots_received += 1;
        match self.predictor.reconcile(&snapshot) {
            ReconcileOutcome::Applied { .. } => self.stats.snapshots_applied += 1,
            _ => self.stats.snapshots_ignored += 1,
        }
    }

    /// Runs one client tick. Returns the input sent, or `None` while not connected.
    pub fn tick_once(&mut self, intent: &InputIntent) -> Result<Option<InputState>, ClientError> {
        self.poll_network()?;

        let Some(server) = self.server else {
            return Ok(None);
        };
        if self.state != ConnectionState::Connected {
            return Ok(None);
        }

        let input = match self.predictor.predict(intent) {
            Ok(input) => input,
            Err(e) => {
                log::error!(
                    "Dropping connection after tick {}: {}",
                    self.predictor.current_tick(),
                    e
                );
                self.disconnect();
                return Err(e.into());
            }
        };
        let bytes = Packet::ClientInput(input).encode()?;

        match self.transport.send(server, Channel::ReliableOrdered, &bytes) {
            Ok(()) => self.stats.inputs_sent += 1,
            Err(TransportError::Closed) => return Err(TransportError::Closed.into()),
            Err(e) => {
                self.stats.send_failures += 1;
                log::warn!("Failed to send input {}: {}", input.tick, e);
            }
        }

        Ok(Some(input))
    }

    /// Runs `ticks` ticks at the configured rate, sampling `input` for each.
    /// Stops early once the flag from [`Self::running`] is cleared.
    pub fn run_ticks(
        &mut self,
        input: &mut impl InputSource,
        ticks: u32,
    ) -> Result<u32, ClientError> {
        let mut timestep = FixedTimestep::new(self.config.tick_rate);
        let mut last_time = Instant::now();
        let mut completed = 0;

        while completed < ticks && self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            timestep.accumulate((now - last_time).as_secs_f32());
            last_time = now;

            while completed < ticks && timestep.consume_tick() {
                let intent = input.sample(self.predictor.current_tick() + 1);
                if self.tick_once(&intent)?.is_none() {
                    return Err(ClientError::NotConnected);
                }
                completed += 1;
            }

            std::thread::sleep(Duration::from_millis(1));
        }

        Ok(completed)
    }

    pub fn disconnect(&mut self) {
        if let Some(server) = self.server.take() {
            self.transport.disconnect(server);
            log::info!("Disconnected from {}", server);
        }
        self.reset();
    }

    /// Disconnects and closes the transport for good.
    pub fn shutdown(&mut self) {
        self.disconnect();
        self.transport.close();
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.server = None;
        self.connection_start_time = None;
        self.predictor.reset();
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    pub fn predictor(&self) -> &ClientPredictor {
        &self.predictor
    }

    pub fn predicted_position(&self) -> Vec3 {
        self.predictor.predicted().pos
    }

    pub fn local_player_id(&self) -> Option<PlayerId> {
        self.predictor.local_id()
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

}
