use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::tracking::{AckTracker, ReceiveTracker};
use super::transport::{PeerHandle, TransportError};

pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_PENDING_RELIABLE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

#[derive(Debug)]
pub struct PeerConnection {
    pub handle: PeerHandle,
    pub addr: SocketAddr,
    pub state: ConnectionState,
    /// Chosen by the connecting side and echoed in the accept.
    pub salt: u64,
    pub connect_started: Instant,
    pub connect_timeout: Duration,
    pub last_request_sent: Instant,
    pub last_receive_time: Instant,
    pub last_send_time: Instant,
    pub ack_tracker: AckTracker,
    pub receive_tracker: ReceiveTracker,
    /// Set when reliable data arrived that has not been acknowledged yet.
    pub ack_pending: bool,
}

impl PeerConnection {
    pub fn new(handle: PeerHandle, addr: SocketAddr, salt: u64, now: Instant) -> Self {
        Self {
            handle,
            addr,
            state: ConnectionState::Connecting,
            salt,
            connect_started: now,
            connect_timeout: DEFAULT_PEER_TIMEOUT,
            last_request_sent: now,
            last_receive_time: now,
            last_send_time: now,
            ack_tracker: AckTracker::new(MAX_PENDING_RELIABLE),
            receive_tracker: ReceiveTracker::new(),
            ack_pending: false,
        }
    }

    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.duration_since(self.last_receive_time) > timeout
    }

    pub fn connect_expired(&self, now: Instant) -> bool {
        now.duration_since(self.connect_started) > self.connect_timeout
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_receive_time = now;
    }
}

/// Peers of one endpoint, indexed by handle and by remote address.
#[derive(Debug)]
pub struct PeerTable {
    peers_by_addr: HashMap<SocketAddr, PeerHandle>,
    peers: HashMap<PeerHandle, PeerConnection>,
    next_handle: u64,
    max_peers: usize,
    timeout: Duration,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        Self::with_timeout(max_peers, DEFAULT_PEER_TIMEOUT)
    }

    pub fn with_timeout(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers_by_addr: HashMap::new(),
            peers: HashMap::new(),
            next_handle: 1,
            max_peers,
            timeout,
        }
    }

    pub fn insert(
        &mut self,
        addr: SocketAddr,
        salt: u64,
        now: Instant,
    ) -> Result<&mut PeerConnection, TransportError> {
        if self.peers.len() >= self.max_peers {
            return Err(TransportError::ServerFull);
        }

        let handle = PeerHandle::new(self.next_handle);
        self.next_handle += 1;

        self.peers_by_addr.insert(addr, handle);
        let connection = self
            .peers
            .entry(handle)
            .or_insert_with(|| PeerConnection::new(handle, addr, salt, now));
        Ok(connection)
    }

    pub fn handle_for(&self, addr: &SocketAddr) -> Option<PeerHandle> {
        self.peers_by_addr.get(addr).copied()
    }

    pub fn get(&self, handle: PeerHandle) -> Option<&PeerConnection> {
        self.peers.get(&handle)
    }

    pub fn get_mut(&mut self, handle: PeerHandle) -> Option<&mut PeerConnection> {
        self.peers.get_mut(&handle)
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut PeerConnection> {
        let handle = self.peers_by_addr.get(addr)?;
        self.peers.get_mut(handle)
    }

    pub fn remove(&mut self, handle: PeerHandle) -> Option<PeerConnection> {
        let connection = self.peers.remove(&handle)?;
        self.peers_by_addr.remove(&connection.addr);
        Some(connection)
    }

    pub fn remove_by_addr(&mut self, addr: &SocketAddr) -> Option<PeerConnection> {
        let handle = self.peers_by_addr.remove(addr)?;
        self.peers.remove(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerConnection> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PeerConnection> {
        self.peers.values_mut()
    }

    pub fn handles(&self) -> Vec<PeerHandle> {
        self.peers.keys().copied().collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|c| c.state == ConnectionState::Connected)
            .count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
        self.peers_by_addr.clear();
    }
}
