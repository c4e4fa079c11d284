use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::connection::{ConnectionState, PeerTable};
use super::frame::{Frame, MAX_DATAGRAM_SIZE, MAX_FRAME_PAYLOAD};
use super::stats::{NetworkStats, PacketLossSimulation, rand_u64};
use super::transport::{Channel, PeerHandle, Transport, TransportError, TransportEvent};

pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(250);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

const CLIENT_MAX_PEERS: usize = 8;
const MIN_WAIT: Duration = Duration::from_millis(1);

/// UDP implementation of [`Transport`].
///
/// One socket serves every peer. A small handshake (request, accept or deny,
/// echoed salt) establishes each connection, and the reliable-ordered channel
/// is built from per-peer sequence numbers, cumulative acks and resends.
pub struct NetworkEndpoint {
    socket: Option<UdpSocket>,
    local_addr: SocketAddr,
    peers: PeerTable,
    accepting: bool,
    stats: NetworkStats,
    loss: PacketLossSimulation,
    events: VecDeque<TransportEvent>,
}

impl NetworkEndpoint {
    fn bind<A: ToSocketAddrs>(
        addr: A,
        max_peers: usize,
        accepting: bool,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket: Some(socket),
            local_addr,
            peers: PeerTable::new(max_peers),
            accepting,
            stats: NetworkStats::default(),
            loss: PacketLossSimulation::default(),
            events: VecDeque::new(),
        })
    }

    /// Listening endpoint that accepts up to `max_peers` connections.
    pub fn server<A: ToSocketAddrs>(addr: A, max_peers: usize) -> Result<Self, TransportError> {
        let endpoint = Self::bind(addr, max_peers, true)?;
        log::info!(
            "Listening on {} (max {} peers)",
            endpoint.local_addr,
            max_peers
        );
        Ok(endpoint)
    }

    /// Endpoint on an ephemeral port that only makes outgoing connections.
    pub fn client() -> Result<Self, TransportError> {
        Self::bind("0.0.0.0:0", CLIENT_MAX_PEERS, false)
    }

    pub fn set_packet_loss(&mut self, loss: PacketLossSimulation) {
        if loss.enabled {
            log::info!("Simulating {:.1}% outbound packet loss", loss.loss_percent);
        }
        self.loss = loss;
    }

    pub fn set_peer_timeout(&mut self, timeout: Duration) {
        self.peers.set_timeout(timeout);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.connected_count()
    }

    pub fn is_closed(&self) -> bool {
        self.socket.is_none()
    }

    fn send_frame(&mut self, addr: SocketAddr, frame: &Frame) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        send_best_effort(socket, &mut self.stats, &self.loss, addr, frame);
    }

    fn drain_socket(&mut self) -> Result<(), TransportError> {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let Some(socket) = self.socket.as_ref() else {
                return Err(TransportError::Closed);
            };
            match socket.recv_from(&mut buffer) {
                Ok((size, from)) => self.handle_datagram(&buffer[..size], from, Instant::now()),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if is_transient(e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn wait_for_datagram(&mut self, wait: Duration) -> Result<(), TransportError> {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let Some(socket) = self.socket.as_ref() else {
            return Err(TransportError::Closed);
        };

        socket.set_nonblocking(false)?;
        socket.set_read_timeout(Some(wait.max(MIN_WAIT)))?;
        let result = socket.recv_from(&mut buffer);
        socket.set_nonblocking(true)?;

        match result {
            Ok((size, from)) => {
                self.handle_datagram(&buffer[..size], from, Instant::now());
                Ok(())
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) || is_transient(e) =>
            {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_datagram(&mut self, data: &[u8], from: SocketAddr, now: Instant) {
        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.malformed_frames += 1;
                log::debug!("Dropping malformed datagram from {}: {}", from, e);
                return;
            }
        };
        self.stats.record_received(data.len());

        match frame {
            Frame::ConnectRequest { salt } => self.handle_connect_request(from, salt, now),
            Frame::ConnectAccept { salt } => self.handle_connect_accept(from, salt, now),
            Frame::ConnectDenied { salt } => {
                let matches = self
                    .peers
                    .get_by_addr_mut(&from)
                    .is_some_and(|p| p.state == ConnectionState::Connecting && p.salt == salt);
                if matches {
                    if let Some(peer) = self.peers.remove_by_addr(&from) {
                        log::warn!("Connection to {} denied: server full", from);
                        self.events.push_back(TransportEvent::Disconnect(peer.handle));
                    }
                }
            }
            Frame::Disconnect => {
                if let Some(peer) = self.peers.remove_by_addr(&from) {
                    log::info!("{} ({}) disconnected", peer.handle, from);
                    self.events.push_back(TransportEvent::Disconnect(peer.handle));
                }
            }
            Frame::Payload {
                channel,
                sequence,
                ack,
                ack_bits,
                payload,
            } => self.handle_payload(from, channel, sequence, ack, ack_bits, payload, now),
            Frame::Ack { ack, ack_bits } => {
                if let Some(peer) = self.peers.get_by_addr_mut(&from) {
                    if peer.state == ConnectionState::Connected {
                        peer.touch(now);
                        if peer.ack_tracker.process_ack(ack, ack_bits, now) > 0 {
                            self.stats.rtt_ms = peer.ack_tracker.srtt();
                            self.stats.rtt_variance = peer.ack_tracker.rtt_var();
                        }
                    }
                }
            }
            Frame::Keepalive => {
                if let Some(peer) = self.peers.get_by_addr_mut(&from) {
                    peer.touch(now);
                }
            }
        }
    }

    fn handle_connect_request(&mut self, from: SocketAddr, salt: u64, now: Instant) {
        if !self.accepting {
            log::trace!("Ignoring connect request from {}", from);
            return;
        }

        let existing = self.peers.get_by_addr_mut(&from).map(|p| (p.handle, p.salt));
        match existing {
            Some((_, known)) if known == salt => {
                // Our accept was lost, the client is still retrying.
                self.send_frame(from, &Frame::ConnectAccept { salt });
                return;
            }
            Some((stale, _)) => {
                log::info!("{} reconnected, dropping {}", from, stale);
                self.peers.remove(stale);
                self.events.push_back(TransportEvent::Disconnect(stale));
            }
            None => {}
        }

        match self.peers.insert(from, salt, now) {
            Ok(peer) => {
                peer.state = ConnectionState::Connected;
                let handle = peer.handle;
                log::info!("{} connected from {}", handle, from);
                self.events.push_back(TransportEvent::Connect(handle));
                self.send_frame(from, &Frame::ConnectAccept { salt });
            }
            Err(e) => {
                log::warn!("Rejecting connection from {}: {}", from, e);
                self.send_frame(from, &Frame::ConnectDenied { salt });
            }
        }
    }

    fn handle_connect_accept(&mut self, from: SocketAddr, salt: u64, now: Instant) {
        let Some(peer) = self.peers.get_by_addr_mut(&from) else {
            return;
        };
        if peer.state != ConnectionState::Connecting || peer.salt != salt {
            return;
        }

        peer.state = ConnectionState::Connected;
        peer.touch(now);
        peer.last_send_time = now;
        let handle = peer.handle;
        log::info!("Connected to {} as {}", from, handle);
        self.events.push_back(TransportEvent::Connect(handle));
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_payload(
        &mut self,
        from: SocketAddr,
        channel: Channel,
        sequence: u32,
        ack: u32,
        ack_bits: u32,
        payload: Vec<u8>,
        now: Instant,
    ) {
        let Some(peer) = self.peers.get_by_addr_mut(&from) else {
            log::trace!("Payload from unknown address {}", from);
            return;
        };
        if peer.state != ConnectionState::Connected {
            return;
        }

        peer.touch(now);
        if peer.ack_tracker.process_ack(ack, ack_bits, now) > 0 {
            self.stats.rtt_ms = peer.ack_tracker.srtt();
            self.stats.rtt_variance = peer.ack_tracker.rtt_var();
        }

        let handle = peer.handle;
        match channel {
            Channel::ReliableOrdered => {
                peer.ack_pending = true;
                for bytes in peer.receive_tracker.record_received(sequence, payload) {
                    self.events.push_back(TransportEvent::Receive(handle, bytes));
                }
            }
            Channel::Unreliable => {
                self.events.push_back(TransportEvent::Receive(handle, payload));
            }
        }
    }

    /// Handshake retries, resends, acks, keepalives and timeouts.
    fn update_peers(&mut self, now: Instant) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        let timeout = self.peers.timeout();
        let mut dropped = Vec::new();

        for peer in self.peers.iter_mut() {
            match peer.state {
                ConnectionState::Connecting => {
                    if peer.connect_expired(now) {
                        log::warn!("Connection to {} timed out", peer.addr);
                        dropped.push(peer.handle);
                        continue;
                    }
                    if now.duration_since(peer.last_request_sent) >= CONNECT_RETRY_INTERVAL {
                        peer.last_request_sent = now;
                        let frame = Frame::ConnectRequest { salt: peer.salt };
                        send_best_effort(socket, &mut self.stats, &self.loss, peer.addr, &frame);
                    }
                }
                ConnectionState::Connected => {
                    if peer.is_timed_out(timeout, now) {
                        log::warn!("{} ({}) timed out", peer.handle, peer.addr);
                        dropped.push(peer.handle);
                        continue;
                    }

                    let (ack, ack_bits) = peer.receive_tracker.ack_data();
                    for (sequence, payload) in peer.ack_tracker.due_resends(now) {
                        self.stats.resends += 1;
                        let frame = Frame::Payload {
                            channel: Channel::ReliableOrdered,
                            sequence,
                            ack,
                            ack_bits,
                            payload,
                        };
                        send_best_effort(socket, &mut self.stats, &self.loss, peer.addr, &frame);
                        peer.last_send_time = now;
                        peer.ack_pending = false;
                    }

                    if peer.ack_pending {
                        let frame = Frame::Ack { ack, ack_bits };
                        send_best_effort(socket, &mut self.stats, &self.loss, peer.addr, &frame);
                        peer.last_send_time = now;
                        peer.ack_pending = false;
                    }

                    if now.duration_since(peer.last_send_time) >= KEEPALIVE_INTERVAL {
                        send_best_effort(
                            socket,
                            &mut self.stats,
                            &self.loss,
                            peer.addr,
                            &Frame::Keepalive,
                        );
                        peer.last_send_time = now;
                    }
                }
                ConnectionState::Disconnected => dropped.push(peer.handle),
            }
        }

        for handle in dropped {
            if self.peers.remove(handle).is_some() {
                self.events.push_back(TransportEvent::Disconnect(handle));
            }
        }
    }
}

impl Transport for NetworkEndpoint {
    fn connect(
        &mut self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<PeerHandle, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        if let Some(handle) = self.peers.handle_for(&addr) {
            return Ok(handle);
        }

        let salt = rand_u64();
        let peer = self.peers.insert(addr, salt, Instant::now())?;
        peer.connect_timeout = timeout;
        let handle = peer.handle;
        log::info!("Connecting to {} ({})", addr, handle);

        if let Err(e) = transmit(
            socket,
            &mut self.stats,
            &self.loss,
            addr,
            &Frame::ConnectRequest { salt },
        ) {
            self.peers.remove(handle);
            return Err(e);
        }
        Ok(handle)
    }

    fn send(
        &mut self,
        peer: PeerHandle,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let now = Instant::now();
        let connection = self
            .peers
            .get_mut(peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        if connection.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected(peer));
        }

        let addr = connection.addr;
        let (ack, ack_bits) = connection.receive_tracker.ack_data();
        let sequence = match channel {
            Channel::ReliableOrdered => match connection.ack_tracker.track_packet(payload, now) {
                Some(sequence) => sequence,
                None => {
                    log::warn!("Reliable queue to {} overflowed, disconnecting", addr);
                    send_best_effort(socket, &mut self.stats, &self.loss, addr, &Frame::Disconnect);
                    self.peers.remove(peer);
                    self.events.push_back(TransportEvent::Disconnect(peer));
                    return Err(TransportError::SendQueueFull(peer));
                }
            },
            Channel::Unreliable => 0,
        };
        connection.last_send_time = now;
        connection.ack_pending = false;

        let frame = Frame::Payload {
            channel,
            sequence,
            ack,
            ack_bits,
            payload: payload.to_vec(),
        };
        transmit(socket, &mut self.stats, &self.loss, addr, &frame)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<TransportEvent>, TransportError> {
        if self.socket.is_none() {
            return Err(TransportError::Closed);
        }

        let deadline = Instant::now() + timeout;
        loop {
            self.drain_socket()?;
            self.update_peers(Instant::now());

            if !self.events.is_empty() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.wait_for_datagram(deadline - now)?;
        }

        Ok(self.events.drain(..).collect())
    }

    fn disconnect(&mut self, peer: PeerHandle) {
        if let Some(connection) = self.peers.remove(peer) {
            log::info!("Disconnecting {} ({})", peer, connection.addr);
            self.send_frame(connection.addr, &Frame::Disconnect);
        }
    }

    fn close(&mut self) {
        if self.socket.is_none() {
            return;
        }

        for handle in self.peers.handles() {
            self.disconnect(handle);
        }
        self.peers.clear();
        self.events.clear();
        self.socket = None;
        log::info!("Endpoint {} closed", self.local_addr);
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

fn transmit(
    socket: &UdpSocket,
    stats: &mut NetworkStats,
    loss: &PacketLossSimulation,
    addr: SocketAddr,
    frame: &Frame,
) -> Result<(), TransportError> {
    let data = frame.encode()?;
    if loss.should_drop() {
        stats.simulated_drops += 1;
        log::trace!("Simulated loss of {} to {}", frame.as_str(), addr);
        return Ok(());
    }

    let sent = socket.send_to(&data, addr)?;
    stats.record_sent(sent);
    Ok(())
}

fn send_best_effort(
    socket: &UdpSocket,
    stats: &mut NetworkStats,
    loss: &PacketLossSimulation,
    addr: SocketAddr,
    frame: &Frame,
) {
    if let Err(e) = transmit(socket, stats, loss, addr, frame) {
        log::warn!("Failed to send {} to {}: {}", frame.as_str(), addr, e);
    }
}

// ICMP errors from earlier sends surface on later reads on some platforms.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}
