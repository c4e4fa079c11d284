pub mod authority;
pub mod net;
pub mod prediction;
pub mod session;
pub mod simulation;

pub use authority::{AuthorityStats, Outgoing, ServerAuthority};
pub use net::{
    Channel, ConnectionState, DEFAULT_MAX_PEERS, DEFAULT_PORT, DecodeError, EncodeError,
    EntityState, InputState, LoopbackEndpoint, LoopbackNetwork, NetworkEndpoint, NetworkStats,
    Packet, PacketKind, PacketLossSimulation, PeerHandle, PlayerId, Snapshot, TICK_RATE, Tick,
    Transport, TransportError, TransportEvent,
};
pub use prediction::{
    BufferFull, ClientPredictor, InputIntent, PendingInputBuffer, PredictionError,
    ReconcileOutcome,
};
pub use session::{SessionError, SessionRegistry};
pub use simulation::{
    FixedTimestep, PLAYER_SPEED, TICK_DT, TickClock, TickOverflow, apply_input,
};
