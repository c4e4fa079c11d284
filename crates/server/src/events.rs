use trueshot::{PeerHandle, PlayerId};

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ClientConnected {
        player_id: PlayerId,
        peer: PeerHandle,
    },
    ClientDisconnected {
        player_id: PlayerId,
        reason: DisconnectReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Disconnected,
    Kicked,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Disconnected => "disconnected",
            DisconnectReason::Kicked => "kicked",
            DisconnectReason::Shutdown => "dropped at shutdown",
        }
    }
}
