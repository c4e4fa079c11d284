use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use trueshot::{
    AuthorityStats, FixedTimestep, NetworkStats, PlayerId, ServerAuthority, Tick, TickClock,
    Transport, TransportError, TransportEvent,
};

use crate::config::ServerConfig;
use crate::events::{DisconnectReason, ServerEvent};

/// Poll-driven server loop around a [`ServerAuthority`].
pub struct GameServer<T: Transport> {
    transport: T,
    authority: ServerAuthority,
    config: ServerConfig,
    clock: TickClock,
    timestep: FixedTimestep,
    last_tick_time: Instant,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<ServerEvent>,
}

impl<T: Transport> GameServer<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        Self {
            transport,
            authority: ServerAuthority::new(),
            clock: TickClock::new(),
            timestep: FixedTimestep::new(config.tick_rate),
            last_tick_time: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            pending_events: VecDeque::new(),
            config,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// One loop iteration: drain the transport, dispatch every event, then
    /// advance the tick clock by the fixed steps that elapsed.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.timestep
            .accumulate((now - self.last_tick_time).as_secs_f32());
        self.last_tick_time = now;

        match self.transport.poll(self.config.poll_timeout) {
            Ok(events) => {
                for event in events {
                    self.dispatch(event);
                }
            }
            Err(TransportError::Closed) => {
                self.running.store(false, Ordering::SeqCst);
            }
            Err(e) => {
                self.pending_events.push_back(ServerEvent::Error {
                    message: format!("Network error: {}", e),
                });
            }
        }

        while self.timestep.consume_tick() {
            if let Err(e) = self.clock.advance() {
                log::error!("Stopping: {}", e);
                self.pending_events.push_back(ServerEvent::Error {
                    message: e.to_string(),
                });
                self.running.store(false, Ordering::SeqCst);
                break;
            }
        }
    }

    fn dispatch(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect(peer) => match self.authority.on_connect(peer) {
                Ok(player_id) => {
                    self.pending_events
                        .push_back(ServerEvent::ClientConnected { player_id, peer });
                }
                Err(e) => {
                    self.transport.disconnect(peer);
                    self.pending_events.push_back(ServerEvent::Error {
                        message: format!("Refused {}: {}", peer, e),
                    });
                }
            },
            TransportEvent::Disconnect(peer) => {
                if let Some(player_id) = self.authority.on_disconnect(peer) {
                    self.pending_events.push_back(ServerEvent::ClientDisconnected {
                        player_id,
                        reason: DisconnectReason::Disconnected,
                    });
                }
            }
            TransportEvent::Receive(peer, bytes) => {
                let Some(reply) = self.authority.on_receive(peer, &bytes) else {
                    return;
                };
                if let Err(e) = self.transport.send(reply.peer, reply.channel, &reply.payload) {
                    log::warn!("Failed to send snapshot to {}: {}", reply.peer, e);
                    self.pending_events.push_back(ServerEvent::Error {
                        message: format!("Failed to send snapshot to {}: {}", reply.peer, e),
                    });
                }
            }
        }
    }

    /// Disconnects `player_id`. Returns false if no such player is connected.
    pub fn kick(&mut self, player_id: PlayerId) -> bool {
        self.drop_player(player_id, DisconnectReason::Kicked)
    }

    fn drop_player(&mut self, player_id: PlayerId, reason: DisconnectReason) -> bool {
        let Some(peer) = self.authority.sessions().peer_of(player_id) else {
            return false;
        };

        self.transport.disconnect(peer);
        self.authority.on_disconnect(peer);
        self.pending_events
            .push_back(ServerEvent::ClientDisconnected { player_id, reason });
        true
    }

    /// Drops every player and closes the transport.
    pub fn shutdown(&mut self) {
        let players: Vec<PlayerId> = self
            .authority
            .sessions()
            .iter()
            .map(|(_, player_id)| player_id)
            .collect();
        for player_id in players {
            self.drop_player(player_id, DisconnectReason::Shutdown);
        }

        self.transport.close();
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn tick(&self) -> Tick {
        self.clock.current()
    }

    pub fn authority(&self) -> &ServerAuthority {
        &self.authority
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.clock.current(),
            client_count: self.authority.player_count(),
            max_clients: self.config.max_clients,
            authority: self.authority.stats().clone(),
            network: self.transport.stats().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: Tick,
    pub client_count: usize,
    pub max_clients: usize,
    pub authority: AuthorityStats,
    pub network: NetworkStats,
}
