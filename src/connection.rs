use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::time::Instant;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crossbeam_channel::Sender;
use uuid::Uuid;

use crate::bytes::Bytes;
use crate::consts::{GRACE_PERIOD, MAX_LOSSES, WINDOW_SIZE};
use crate::error::{ProtocolError, Result};
use crate::frame::{EthernetFrame, MacAddr};

/// Two machine UUIDs, a sequence number and a packet type.
pub const HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PacketKind {
    Request = 0,
    Response = 1,
    Data = 2,
    Ack = 3,
    Close = 4,
}

impl TryFrom<i32> for PacketKind {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::Data),
            3 => Ok(Self::Ack),
            4 => Ok(Self::Close),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// One unit of the reliable channel.
///
/// The machine UUIDs address a process rather than an interface, so two
/// clients sharing a MAC can still tell each other's traffic apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPacket {
    pub source_machine: Uuid,
    pub dest_machine: Uuid,
    pub sequence: u32,
    pub kind: PacketKind,
    pub payload: Vec<u8>,
}

impl ConnectionPacket {
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        log::debug!(
            "serializing connection packet of type {:?} sequence {}",
            self.kind,
            self.sequence
        );
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        self.source_machine.write(&mut buf)?;
        self.dest_machine.write(&mut buf)?;
        buf.write_u32::<BigEndian>(self.sequence)?;
        buf.write_i32::<BigEndian>(self.kind as i32)?;
        buf.write_all(&self.payload)?;
        Ok(buf)
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::MalformedHeader("connection packet"));
        }

        let mut reader = Cursor::new(buf);
        let source_machine = Uuid::read(&mut reader)?;
        let dest_machine = Uuid::read(&mut reader)?;
        let sequence = reader.read_u32::<BigEndian>()?;
        let kind = PacketKind::try_from(reader.read_i32::<BigEndian>()?)?;
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;

        Ok(Self {
            source_machine,
            dest_machine,
            sequence,
            kind,
            payload,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Requested,
    Responded,
    Established,
}

/// The reliable, ordered channel to a single peer.
///
/// A process has at most one of these. The session owns it and is the only
/// thing that touches it; worker threads feed it through channels. All
/// time-dependent operations take the current `Instant` from the caller,
/// which keeps the retransmission logic deterministic under test.
///
/// Sending is a two-step affair: packets are queued here, and each tick the
/// session drains [`get_packets`](Connection::get_packets) /
/// [`get_ack_packets`](Connection::get_ack_packets) onto the wire. The send
/// window is go-back-N: on a missed deadline the window position rewinds to
/// the head and everything in flight goes out again.
pub struct Connection {
    local_id: Uuid,
    local_mac: MacAddr,
    peer: Option<MacAddr>,
    peer_id: Uuid,
    state: ConnectionState,
    sent_seq: u32,
    expected_recv_seq: u32,
    ack_sent: Option<Instant>,
    ack_recv: Option<Instant>,
    send_window: VecDeque<ConnectionPacket>,
    ack_queue: Vec<ConnectionPacket>,
    window_pos: usize,
    loss_deadline: Option<Instant>,
    num_losses: u32,
    send_tx: Sender<Vec<u8>>,
}

impl Connection {
    pub fn new(local_id: Uuid, local_mac: MacAddr, send_tx: Sender<Vec<u8>>) -> Self {
        Self {
            local_id,
            local_mac,
            peer: None,
            peer_id: Uuid::nil(),
            state: ConnectionState::Idle,
            sent_seq: 0,
            expected_recv_seq: 0,
            ack_sent: None,
            ack_recv: None,
            send_window: VecDeque::new(),
            ack_queue: Vec::new(),
            window_pos: 0,
            loss_deadline: None,
            num_losses: 0,
            send_tx,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != ConnectionState::Idle
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> Option<MacAddr> {
        self.peer
    }

    /// Starts the three-way handshake towards `peer`.
    pub fn open(&mut self, peer: MacAddr, now: Instant) -> Result<()> {
        if self.is_active() {
            return Err(ProtocolError::AlreadyConnected);
        }

        self.peer = Some(peer);
        let request = self.request_packet();
        self.queue_packet(request);
        self.set_state(ConnectionState::Requested);

        // Time how long we take to get a response
        self.ack_sent = Some(now);

        Ok(())
    }

    /// Tears the connection down, telling the peer on a best-effort basis.
    ///
    /// The CLOSE bypasses the send window: we are about to drop all tracking
    /// state, so there will be nothing left to retransmit it from. A peer
    /// that misses it will notice the silence through its own loss checks.
    pub fn close(&mut self) {
        if let Some(peer) = self.peer {
            match self.close_packet().serialize() {
                Ok(data) => {
                    let frame = EthernetFrame::new(data, peer, self.local_mac);
                    if self.send_tx.try_send(frame.encode()).is_err() {
                        log::debug!("send channel closed, dropping connection close");
                    }
                }
                Err(err) => log::debug!("error sending connection close: {err}"),
            }
        }

        self.reset();
    }

    /// Dispatches one inbound packet through the state machine.
    ///
    /// Returns whether the connection status changed (established or torn
    /// down) and, for in-order DATA, the payload to hand up the stack.
    pub fn handle(
        &mut self,
        packet: ConnectionPacket,
        source: MacAddr,
        now: Instant,
    ) -> Result<(bool, Option<Vec<u8>>)> {
        log::debug!(
            "received connection packet, type {:?} sequence {}",
            packet.kind,
            packet.sequence
        );

        // Until a peer is known, REQUEST/RESPONSE legitimately carry ids we
        // have not seen; after that, everything must match the connection.
        let pinned = !matches!(
            self.state,
            ConnectionState::Idle | ConnectionState::Requested
        );
        if pinned && packet.dest_machine != self.local_id {
            log::debug!(
                "not addressed to us, addressed to {}, we are {}",
                packet.dest_machine,
                self.local_id
            );
            return Err(ProtocolError::NotAddressedToUs);
        }
        if pinned && packet.source_machine != self.peer_id {
            return Err(ProtocolError::WrongPeer);
        }

        // Future sequences are not buffered; the sender will retransmit.
        if packet.kind != PacketKind::Ack && packet.sequence > self.expected_recv_seq {
            log::debug!(
                "ignoring out of order packet, got {} expected at most {}",
                packet.sequence,
                self.expected_recv_seq
            );
            return Err(ProtocolError::OutOfOrder);
        }

        let mut status_changed = false;
        let mut delivery = None;
        let response = match packet.kind {
            PacketKind::Request => Some(self.handle_request(&packet, source, now)?),
            PacketKind::Response => {
                let response = self.handle_response(&packet, now)?;
                status_changed = true;
                Some(response)
            }
            PacketKind::Ack => {
                status_changed = self.handle_ack(&packet, now)?;
                None
            }
            PacketKind::Data => {
                let (response, data) = self.handle_data(&packet)?;
                delivery = data;
                Some(response)
            }
            PacketKind::Close => {
                if self.is_active() {
                    self.reset();
                    status_changed = true;
                }
                None
            }
        };

        // ACKs don't consume a sequence number
        if packet.kind != PacketKind::Ack && packet.sequence == self.expected_recv_seq {
            self.expected_recv_seq += 1;
        }

        if let Some(response) = response {
            self.queue_packet(response);
        }

        Ok((status_changed, delivery))
    }

    /// Queues an outbound packet. Everything except ACKs joins the send
    /// window and gets the next sequence number; ACKs go in their own queue
    /// and are never resent.
    pub fn queue_packet(&mut self, mut packet: ConnectionPacket) {
        if packet.kind == PacketKind::Ack {
            self.ack_queue.push(packet);
        } else {
            packet.sequence = self.sent_seq;
            self.sent_seq += 1;
            self.send_window.push_back(packet);
        }
    }

    /// Builds a DATA packet for the reliable channel; the sequence number is
    /// assigned when it is queued.
    pub fn data_packet(&self, payload: Vec<u8>) -> ConnectionPacket {
        ConnectionPacket {
            source_machine: self.local_id,
            dest_machine: self.peer_id,
            sequence: 0,
            kind: PacketKind::Data,
            payload,
        }
    }

    /// Returns the part of the window that should go on the wire this tick.
    pub fn get_packets(&mut self, now: Instant) -> Vec<ConnectionPacket> {
        let from = self
            .window_pos
            .min(WINDOW_SIZE)
            .min(self.send_window.len());
        let to = WINDOW_SIZE.min(self.send_window.len());
        if from >= to {
            return Vec::new();
        }

        let slice: Vec<ConnectionPacket> = self
            .send_window
            .iter()
            .skip(from)
            .take(to - from)
            .cloned()
            .collect();

        // These packets are now in flight
        self.window_pos = to;
        self.set_deadline(now);

        log::debug!(
            "sending frames {} to {} total queue {}",
            slice[0].sequence,
            slice[slice.len() - 1].sequence,
            self.send_window.len()
        );

        slice
    }

    /// Drains the ACK queue; ACKs are unreliable and not windowed.
    pub fn get_ack_packets(&mut self) -> Vec<ConnectionPacket> {
        if self.ack_queue.is_empty() {
            return Vec::new();
        }

        log::debug!(
            "sending acks {} to {}",
            self.ack_queue[0].sequence,
            self.ack_queue[self.ack_queue.len() - 1].sequence
        );

        std::mem::take(&mut self.ack_queue)
    }

    /// Checks the loss deadline; on expiry the whole in-flight window
    /// becomes re-sendable. Returns true when the connection gave up and
    /// closed itself.
    pub fn check_loss(&mut self, now: Instant) -> bool {
        if let Some(deadline) = self.loss_deadline {
            if now > deadline {
                self.window_pos = 0;
                self.num_losses += 1;

                log::debug!("loss deadline passed, window will be resent");

                if self.num_losses > MAX_LOSSES {
                    self.close();
                    return true;
                }
            }
        }

        false
    }

    fn set_state(&mut self, state: ConnectionState) {
        log::debug!("connection state changed from {:?} to {:?}", self.state, state);
        self.state = state;
    }

    fn reset(&mut self) {
        self.set_state(ConnectionState::Idle);
        self.sent_seq = 0;
        self.expected_recv_seq = 0;
        self.ack_sent = None;
        self.ack_recv = None;
        self.send_window.clear();
        self.ack_queue.clear();
        self.window_pos = 0;
        self.loss_deadline = None;
        self.num_losses = 0;
        self.peer = None;
        self.peer_id = Uuid::nil();
    }

    fn set_deadline(&mut self, now: Instant) {
        let mut deadline = now + GRACE_PERIOD;
        if self.state == ConnectionState::Established {
            // Only add a round trip once we have actually measured one
            if let (Some(sent), Some(recv)) = (self.ack_sent, self.ack_recv) {
                deadline += recv.saturating_duration_since(sent);
            }
        }
        self.loss_deadline = Some(deadline);
    }

    fn handle_request(
        &mut self,
        packet: &ConnectionPacket,
        source: MacAddr,
        now: Instant,
    ) -> Result<ConnectionPacket> {
        if self.state != ConnectionState::Idle {
            return Err(ProtocolError::AlreadyConnected);
        }

        // We now know who is on the other end
        self.peer_id = packet.source_machine;
        self.peer = Some(source);
        self.set_state(ConnectionState::Responded);

        // Time how long we take to get the ack back
        self.ack_sent = Some(now);

        Ok(self.response_packet())
    }

    fn handle_response(&mut self, packet: &ConnectionPacket, now: Instant) -> Result<ConnectionPacket> {
        if self.state != ConnectionState::Requested {
            return Err(ProtocolError::NotRequested);
        }

        self.peer_id = packet.source_machine;
        self.set_state(ConnectionState::Established);

        let ack = self.ack_packet(packet.sequence);

        // The response doubles as the ack for our REQUEST
        self.slide_window(now);
        self.ack_recv = Some(now);

        Ok(ack)
    }

    fn handle_ack(&mut self, packet: &ConnectionPacket, now: Instant) -> Result<bool> {
        if matches!(
            self.state,
            ConnectionState::Idle | ConnectionState::Requested
        ) {
            return Err(ProtocolError::NotConnected);
        }

        match self.send_window.front() {
            Some(head) if head.sequence == packet.sequence => {}
            _ => {
                log::debug!("ack rejected, acked {} does not match window head", packet.sequence);
                return Err(ProtocolError::WindowMismatch);
            }
        }

        let mut status_changed = false;
        if self.state == ConnectionState::Responded {
            self.ack_recv = Some(now);
            self.set_state(ConnectionState::Established);
            status_changed = true;
        }

        self.slide_window(now);

        Ok(status_changed)
    }

    fn handle_data(
        &mut self,
        packet: &ConnectionPacket,
    ) -> Result<(ConnectionPacket, Option<Vec<u8>>)> {
        if matches!(
            self.state,
            ConnectionState::Idle | ConnectionState::Requested
        ) {
            return Err(ProtocolError::NotConnected);
        }

        // Always ack, but only deliver a payload we have not seen: a
        // retransmit of an old sequence means our previous ack was lost.
        let response = self.ack_packet(packet.sequence);
        let delivery = if packet.sequence == self.expected_recv_seq {
            Some(packet.payload.clone())
        } else {
            None
        };

        Ok((response, delivery))
    }

    /// A valid ACK pops the window head and refreshes the deadline.
    fn slide_window(&mut self, now: Instant) {
        self.send_window.pop_front();
        self.window_pos = self.window_pos.saturating_sub(1);
        self.num_losses = 0;
        if self.send_window.is_empty() {
            // Nothing in flight, nothing to lose
            self.loss_deadline = None;
        } else {
            self.set_deadline(now);
        }
    }

    fn request_packet(&self) -> ConnectionPacket {
        ConnectionPacket {
            source_machine: self.local_id,
            dest_machine: Uuid::nil(),
            sequence: 0,
            kind: PacketKind::Request,
            payload: Vec::new(),
        }
    }

    fn response_packet(&self) -> ConnectionPacket {
        ConnectionPacket {
            source_machine: self.local_id,
            dest_machine: self.peer_id,
            sequence: 0,
            kind: PacketKind::Response,
            payload: Vec::new(),
        }
    }

    fn ack_packet(&self, sequence: u32) -> ConnectionPacket {
        ConnectionPacket {
            source_machine: self.local_id,
            dest_machine: self.peer_id,
            sequence,
            kind: PacketKind::Ack,
            payload: Vec::new(),
        }
    }

    fn close_packet(&self) -> ConnectionPacket {
        ConnectionPacket {
            source_machine: self.local_id,
            dest_machine: self.peer_id,
            sequence: self.sent_seq,
            kind: PacketKind::Close,
            payload: Vec::new(),
        }
    }
}
