use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use super::codec::EncodeError;
use super::stats::NetworkStats;

/// Opaque per-connection handle, unique for the lifetime of one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(u64);

impl PeerHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    ReliableOrdered,
    Unreliable,
}

impl Channel {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Channel::ReliableOrdered),
            1 => Some(Channel::Unreliable),
            _ => None,
        }
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::ReliableOrdered => 0,
            Channel::Unreliable => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect(PeerHandle),
    Disconnect(PeerHandle),
    Receive(PeerHandle, Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("transport is closed")]
    Closed,
    #[error("unknown peer {0}")]
    UnknownPeer(PeerHandle),
    #[error("peer {0} is not connected yet")]
    NotConnected(PeerHandle),
    #[error("no endpoint listening at {0}")]
    Unreachable(SocketAddr),
    #[error("server is full")]
    ServerFull,
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("reliable send queue for {0} overflowed")]
    SendQueueFull(PeerHandle),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Connection-oriented datagram transport with a reliable-ordered and an
/// unreliable channel.
///
/// `connect` only starts the handshake. The outcome arrives later through
/// `poll` as `Connect(peer)` or `Disconnect(peer)`. After `close`, every call
/// fails with [`TransportError::Closed`].
pub trait Transport {
    fn connect(&mut self, addr: SocketAddr, timeout: Duration)
    -> Result<PeerHandle, TransportError>;

    fn send(
        &mut self,
        peer: PeerHandle,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Waits at most `timeout` and returns as soon as at least one event is ready.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>, TransportError>;

    /// Locally initiated; no `Disconnect` event is produced for `peer` on this side.
    fn disconnect(&mut self, peer: PeerHandle);

    fn close(&mut self);

    fn local_addr(&self) -> SocketAddr;

    fn stats(&self) -> &NetworkStats;
}
