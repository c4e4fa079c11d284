mod stats;

use std::collections::HashMap;

use crate::net::{
    Channel, DecodeError, EntityState, InputState, Packet, PeerHandle, PlayerId, Snapshot,
    Tick,
};
use crate::session::{SessionError, SessionRegistry};
use crate::simulation::apply_input;

pub use stats::AuthorityStats;

#[derive(Debug, Clone, Copy, PartialEq)]
struct PlayerSlot {
    entity: EntityState,
    last_input_tick: Option<Tick>,
}

/// An encoded packet the caller should hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub peer: PeerHandle,
    pub channel: Channel,
    pub payload: Vec<u8>,
}

/// Server half of prediction and reconciliation.
///
/// Owns the canonical state of every connected player. Each accepted input
/// is applied with the same integrator the client predicts with, and the
/// result goes back to that player alone, stamped with the input's tick.
#[derive(Debug, Default)]
pub struct ServerAuthority {
    sessions: SessionRegistry,
    players: HashMap<PlayerId, PlayerSlot>,
    stats: AuthorityStats,
}

impl ServerAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `peer` and spawns its player at the origin.
    pub fn on_connect(&mut self, peer: PeerHandle) -> Result<PlayerId, SessionError> {
        let player_id = self.sessions.register(peer)?;
        self.players.entry(player_id).or_insert(PlayerSlot {
            entity: EntityState::new(player_id),
            last_input_tick: None,
        });
        log::info!("Player {} joined on {}", player_id, peer);
        Ok(player_id)
    }

    pub fn on_disconnect(&mut self, peer: PeerHandle) -> Option<PlayerId> {
        let player_id = self.sessions.unregister(peer)?;
        self.players.remove(&player_id);
        log::info!("Player {} left ({})", player_id, peer);
        Some(player_id)
    }

    /// Handles one received payload. Anything that is not a usable input
    /// from a registered peer is counted and dropped.
    pub fn on_receive(&mut self, peer: PeerHandle, bytes: &[u8]) -> Option<Outgoing> {
        self.stats.packets_received += 1;

        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(DecodeError::UnknownKind(kind)) => {
                self.stats.unknown_kinds += 1;
                log::warn!("Dropping packet of unknown kind 0x{:02x} from {}", kind, peer);
                return None;
            }
            Err(e) => {
                self.stats.decode_failures += 1;
                log::debug!("Dropping {} byte packet from {}: {}", bytes.len(), peer, e);
                return None;
            }
        };

        match &packet {
            Packet::ClientInput(input) => self.apply_client_input(peer, input),
            Packet::Event(_) | Packet::Rpc(_) => {
                self.stats.reserved_kinds += 1;
                log::debug!(
                    "Dropping {} packet from {}: not implemented",
                    packet.kind().as_str(),
                    peer
                );
                None
            }
            Packet::Snapshot(_) => {
                self.stats.unexpected_kinds += 1;
                log::warn!("Dropping snapshot sent by client {}", peer);
                None
            }
        }
    }

    fn apply_client_input(&mut self, peer: PeerHandle, input: &InputState) -> Option<Outgoing> {
        let Some(player_id) = self.sessions.lookup(peer) else {
            self.stats.orphan_inputs += 1;
            log::debug!("Dropping input from unregistered {}", peer);
            return None;
        };
        let Some(slot) = self.players.get_mut(&player_id) else {
            self.stats.orphan_inputs += 1;
            return None;
        };

        if slot.last_input_tick.is_some_and(|last| input.tick <= last) {
            self.stats.stale_inputs += 1;
            log::trace!(
                "Dropping replayed input {} from player {}",
                input.tick,
                player_id
            );
            return None;
        }

        apply_input(&mut slot.entity, input);
        slot.last_input_tick = Some(input.tick);
        self.stats.inputs_applied += 1;

        let snapshot = Snapshot::new(input.tick).with_entity(slot.entity);
        let payload = match Packet::Snapshot(snapshot).encode() {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to encode snapshot {} for {}: {}", input.tick, peer, e);
                return None;
            }
        };
        self.stats.snapshots_sent += 1;

        Some(Outgoing {
            peer,
            channel: Channel::Unreliable,
            payload,
        })
    }

    pub fn entity(&self, player_id: PlayerId) -> Option<&EntityState> {
        self.players.get(&player_id).map(|slot| &slot.entity)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn stats(&self) -> &AuthorityStats {
        &self.stats
    }
}
