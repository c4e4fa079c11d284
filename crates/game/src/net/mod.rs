mod codec;
mod connection;
mod endpoint;
mod frame;
mod loopback;
mod protocol;
mod stats;
mod tracking;
mod transport;

pub use codec::{DecodeError, EncodeError, WireReader, WireWriter};
pub use connection::{
    ConnectionState, DEFAULT_PEER_TIMEOUT, MAX_PENDING_RELIABLE, PeerConnection, PeerTable,
};
pub use endpoint::{CONNECT_RETRY_INTERVAL, KEEPALIVE_INTERVAL, NetworkEndpoint};
pub use frame::{FRAME_MAGIC, Frame, MAX_DATAGRAM_SIZE, MAX_FRAME_PAYLOAD};
pub use loopback::{LoopbackEndpoint, LoopbackNetwork};
pub use protocol::{
    DEFAULT_MAX_PEERS, DEFAULT_PORT, ENTITY_STATE_SIZE, EntityState, INPUT_PACKET_SIZE,
    InputState, Packet, PacketKind, PlayerId, SNAPSHOT_HEADER_SIZE, Snapshot, TICK_RATE, Tick,
};
pub use stats::{NetworkStats, PacketLossSimulation, rand_u64};
pub use tracking::{AckTracker, ReceiveTracker, next_sequence, sequence_greater_than};
pub use transport::{Channel, PeerHandle, Transport, TransportError, TransportEvent};
