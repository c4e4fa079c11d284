use std::collections::HashMap;

use crate::net::{PeerHandle, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("player ids exhausted")]
    IdsExhausted,
}

/// Maps transport peers to player ids.
///
/// Ids start at 1 and only ever grow, so an id is never handed to a second
/// player even after the first one leaves.
#[derive(Debug)]
pub struct SessionRegistry {
    players_by_peer: HashMap<PeerHandle, PlayerId>,
    peers_by_player: HashMap<PlayerId, PeerHandle>,
    next_player_id: Option<PlayerId>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(first_id: PlayerId) -> Self {
        Self {
            players_by_peer: HashMap::new(),
            peers_by_player: HashMap::new(),
            next_player_id: Some(first_id),
        }
    }

    pub fn register(&mut self, peer: PeerHandle) -> Result<PlayerId, SessionError> {
        if let Some(&existing) = self.players_by_peer.get(&peer) {
            return Ok(existing);
        }

        let player_id = self.next_player_id.ok_or(SessionError::IdsExhausted)?;
        self.next_player_id = player_id.checked_add(1);

        self.players_by_peer.insert(peer, player_id);
        self.peers_by_player.insert(player_id, peer);
        Ok(player_id)
    }

    pub fn lookup(&self, peer: PeerHandle) -> Option<PlayerId> {
        self.players_by_peer.get(&peer).copied()
    }

    pub fn peer_of(&self, player_id: PlayerId) -> Option<PeerHandle> {
        self.peers_by_player.get(&player_id).copied()
    }

    pub fn unregister(&mut self, peer: PeerHandle) -> Option<PlayerId> {
        let player_id = self.players_by_peer.remove(&peer)?;
        self.peers_by_player.remove(&player_id);
        Some(player_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PeerHandle, PlayerId)> + '_ {
        self.players_by_peer.iter().map(|(&peer, &id)| (peer, id))
    }

    pub fn len(&self) -> usize {
        self.players_by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players_by_peer.is_empty()
    }
}
