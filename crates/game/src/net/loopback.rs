//! In-process [`Transport`]. Sends land directly in the remote inbox.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;

use super::frame::MAX_FRAME_PAYLOAD;
use super::stats::NetworkStats;
use super::transport::{Channel, PeerHandle, Transport, TransportError, TransportEvent};

const FIRST_CLIENT_PORT: u16 = 50000;

#[derive(Debug, Clone, Copy)]
struct Link {
    remote: SocketAddr,
    remote_handle: PeerHandle,
}

#[derive(Debug)]
struct Slot {
    listening: bool,
    max_peers: usize,
    inbox: VecDeque<TransportEvent>,
    links: HashMap<PeerHandle, Link>,
    next_handle: u64,
}

impl Slot {
    fn new(listening: bool, max_peers: usize) -> Self {
        Self {
            listening,
            max_peers,
            inbox: VecDeque::new(),
            links: HashMap::new(),
            next_handle: 1,
        }
    }

    fn allocate_handle(&mut self) -> PeerHandle {
        let handle = PeerHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }
}

#[derive(Debug)]
struct Hub {
    slots: HashMap<SocketAddr, Slot>,
    next_port: u16,
    drop_interval: Option<u32>,
    unreliable_sent: u32,
}

impl Default for Hub {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            next_port: FIRST_CLIENT_PORT,
            drop_interval: None,
            unreliable_sent: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(
        &self,
        addr: SocketAddr,
        max_peers: usize,
    ) -> Result<LoopbackEndpoint, TransportError> {
        let mut hub = self.hub.borrow_mut();
        if hub.slots.contains_key(&addr) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{addr} is already bound"),
            )
            .into());
        }
        hub.slots.insert(addr, Slot::new(true, max_peers));
        log::debug!("Loopback server bound to {}", addr);

        Ok(LoopbackEndpoint::new(Rc::clone(&self.hub), addr))
    }

    pub fn client(&self) -> LoopbackEndpoint {
        let mut hub = self.hub.borrow_mut();
        let addr = loop {
            let port = hub.next_port;
            hub.next_port = hub.next_port.checked_add(1).unwrap_or(FIRST_CLIENT_PORT);
            let candidate = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            if !hub.slots.contains_key(&candidate) {
                break candidate;
            }
        };
        hub.slots.insert(addr, Slot::new(false, usize::MAX));

        LoopbackEndpoint::new(Rc::clone(&self.hub), addr)
    }

    /// Silently discards every `n`th unreliable send made through this hub.
    pub fn drop_every_nth_unreliable(&self, n: u32) {
        self.hub.borrow_mut().drop_interval = (n > 0).then_some(n);
    }
}

#[derive(Debug)]
pub struct LoopbackEndpoint {
    hub: Rc<RefCell<Hub>>,
    addr: SocketAddr,
    closed: bool,
    stats: NetworkStats,
}

impl LoopbackEndpoint {
    fn new(hub: Rc<RefCell<Hub>>, addr: SocketAddr) -> Self {
        Self {
            hub,
            addr,
            closed: false,
            stats: NetworkStats::default(),
        }
    }

    pub fn peer_count(&self) -> usize {
        self.hub
            .borrow()
            .slots
            .get(&self.addr)
            .map_or(0, |s| s.links.len())
    }
}

impl Transport for LoopbackEndpoint {
    fn connect(
        &mut self,
        addr: SocketAddr,
        _timeout: Duration,
    ) -> Result<PeerHandle, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let mut hub = self.hub.borrow_mut();
        let own_handle = hub
            .slots
            .get_mut(&self.addr)
            .ok_or(TransportError::Closed)?
            .allocate_handle();

        let target = hub
            .slots
            .get_mut(&addr)
            .filter(|slot| slot.listening)
            .ok_or(TransportError::Unreachable(addr))?;

        if target.links.len() >= target.max_peers {
            log::warn!("Loopback connection to {} refused: server full", addr);
            if let Some(own) = hub.slots.get_mut(&self.addr) {
                own.inbox.push_back(TransportEvent::Disconnect(own_handle));
            }
            return Ok(own_handle);
        }

        let remote_handle = target.allocate_handle();
        target.links.insert(
            remote_handle,
            Link {
                remote: self.addr,
                remote_handle: own_handle,
            },
        );
        target.inbox.push_back(TransportEvent::Connect(remote_handle));

        if let Some(own) = hub.slots.get_mut(&self.addr) {
            own.links.insert(
                own_handle,
                Link {
                    remote: addr,
                    remote_handle,
                },
            );
            own.inbox.push_back(TransportEvent::Connect(own_handle));
        }

        Ok(own_handle)
    }

    fn send(
        &mut self,
        peer: PeerHandle,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let mut hub = self.hub.borrow_mut();
        let link = hub
            .slots
            .get(&self.addr)
            .and_then(|slot| slot.links.get(&peer))
            .copied()
            .ok_or(TransportError::UnknownPeer(peer))?;

        if channel == Channel::Unreliable {
            if let Some(n) = hub.drop_interval {
                hub.unreliable_sent = hub.unreliable_sent.wrapping_add(1);
                if hub.unreliable_sent % n == 0 {
                    self.stats.simulated_drops += 1;
                    return Ok(());
                }
            }
        }

        if let Some(remote) = hub.slots.get_mut(&link.remote) {
            remote
                .inbox
                .push_back(TransportEvent::Receive(link.remote_handle, payload.to_vec()));
        }
        self.stats.record_sent(payload.len());
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Vec<TransportEvent>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let events: Vec<TransportEvent> = self
            .hub
            .borrow_mut()
            .slots
            .get_mut(&self.addr)
            .map(|slot| slot.inbox.drain(..).collect())
            .unwrap_or_default();

        for event in &events {
            if let TransportEvent::Receive(_, bytes) = event {
                self.stats.record_received(bytes.len());
            }
        }
        Ok(events)
    }

    fn disconnect(&mut self, peer: PeerHandle) {
        let mut hub = self.hub.borrow_mut();
        let Some(link) = hub
            .slots
            .get_mut(&self.addr)
            .and_then(|slot| slot.links.remove(&peer))
        else {
            return;
        };

        if let Some(remote) = hub.slots.get_mut(&link.remote) {
            remote.links.remove(&link.remote_handle);
            remote
                .inbox
                .push_back(TransportEvent::Disconnect(link.remote_handle));
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        let handles: Vec<PeerHandle> = self
            .hub
            .borrow()
            .slots
            .get(&self.addr)
            .map(|slot| slot.links.keys().copied().collect())
            .unwrap_or_default();
        for handle in handles {
            self.disconnect(handle);
        }

        self.hub.borrow_mut().slots.remove(&self.addr);
        self.closed = true;
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

impl Drop for LoopbackEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}
