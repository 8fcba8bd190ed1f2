//! Glue between the three framing layers.
//!
//! Inbound: raw bytes -> Ethernet frame -> transport variant (selected by
//! the frame's destination address) -> application packet. Outbound helpers
//! wrap application packets into whichever transport fits and then into a
//! frame ready for the send channel.

use std::time::Instant;

use uuid::Uuid;

use crate::broadcast::{BroadcastDedup, BroadcastPacket};
use crate::connection::{Connection, ConnectionPacket};
use crate::consts::ETHER_TYPE;
use crate::error::{ProtocolError, Result};
use crate::frame::{EthernetFrame, MacAddr};
use crate::protocol::ChessPacket;

/// Runs one received frame up the stack.
///
/// Returns whether the connection status changed and, when the frame carried
/// something for the application, the parsed packet along with the sender's
/// hardware address.
pub fn handle_frame(
    data: &[u8],
    connection: &mut Connection,
    dedup: &mut BroadcastDedup,
    local_mac: MacAddr,
    now: Instant,
) -> Result<(bool, Option<(ChessPacket, MacAddr)>)> {
    // Malformed at the Ethernet level is unsalvageable
    let frame = EthernetFrame::decode(data)?;

    if frame.ether_type != ETHER_TYPE {
        return Err(ProtocolError::IncorrectEtherType(frame.ether_type));
    }

    let source = frame.source;
    let mut status_changed = false;

    let payload = if frame.dest.is_broadcast() {
        let packet = BroadcastPacket::deserialize(&frame.payload)?;
        dedup.accept(&packet)?;
        Some(packet.into_payload())
    } else if frame.dest == local_mac {
        let packet = ConnectionPacket::deserialize(&frame.payload)?;
        let (changed, data) = connection.handle(packet, source, now)?;
        status_changed = changed;
        data
    } else {
        // Someone else's conversation
        return Err(ProtocolError::NotAddressedToUs);
    };

    match payload {
        Some(data) => {
            let packet = ChessPacket::deserialize(&data)?;
            Ok((status_changed, Some((packet, source))))
        }
        None => Ok((status_changed, None)),
    }
}

/// Wraps an application packet for the reliable channel. The result still
/// has to be queued on the connection.
pub fn package_chess(packet: &ChessPacket, connection: &Connection) -> Result<ConnectionPacket> {
    Ok(connection.data_packet(packet.serialize()?))
}

/// Wraps an application packet into a broadcast frame, ready for the send
/// channel.
pub fn package_chess_broadcast(
    packet: &ChessPacket,
    local_id: Uuid,
    local_mac: MacAddr,
) -> Result<Vec<u8>> {
    let broadcast = BroadcastPacket::new(local_id, packet.serialize()?);
    let frame = EthernetFrame::new(broadcast.serialize()?, MacAddr::BROADCAST, local_mac);
    Ok(frame.encode())
}

/// Wraps a connection packet into a frame addressed to the connection peer.
pub fn package_transport(
    packet: &ConnectionPacket,
    connection: &Connection,
    local_mac: MacAddr,
) -> Result<Vec<u8>> {
    let peer = connection.peer().ok_or(ProtocolError::NotConnected)?;
    let frame = EthernetFrame::new(packet.serialize()?, peer, local_mac);
    Ok(frame.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Receiver};

    struct Stack {
        id: Uuid,
        mac: MacAddr,
        connection: Connection,
        dedup: BroadcastDedup,
        _send_rx: Receiver<Vec<u8>>,
    }

    impl Stack {
        fn new(last_octet: u8) -> Self {
            let (tx, rx) = unbounded();
            let id = Uuid::new_v4();
            let mac = MacAddr([0x02, 0, 0, 0, 0, last_octet]);
            Self {
                id,
                mac,
                connection: Connection::new(id, mac, tx),
                dedup: BroadcastDedup::new(id),
                _send_rx: rx,
            }
        }

        fn drain(&mut self, now: Instant) -> Vec<Vec<u8>> {
            let mut packets = self.connection.get_packets(now);
            packets.extend(self.connection.get_ack_packets());
            packets
                .iter()
                .map(|p| package_transport(p, &self.connection, self.mac).unwrap())
                .collect()
        }

        fn receive(
            &mut self,
            frames: &[Vec<u8>],
            now: Instant,
        ) -> Vec<(bool, Option<(ChessPacket, MacAddr)>)> {
            frames
                .iter()
                .map(|f| {
                    handle_frame(f, &mut self.connection, &mut self.dedup, self.mac, now).unwrap()
                })
                .collect()
        }
    }

    #[test]
    fn handshake_and_move_exchange_end_to_end() {
        let mut a = Stack::new(0x0A);
        let mut b = Stack::new(0x0B);
        let now = Instant::now();

        // A opens towards B; three frames later both sides are established
        a.connection.open(b.mac, now).unwrap();
        let frames = a.drain(now);
        b.receive(&frames, now);
        let frames = b.drain(now);
        let results = a.receive(&frames, now);
        assert!(results[0].0, "A should report the new connection");
        let frames = a.drain(now);
        let results = b.receive(&frames, now);
        assert!(results[0].0, "B should report the new connection");

        // A move flows from A to B through the reliable channel
        let movement = ChessPacket::MovePiece {
            src: crate::chess::Position { x: 4, y: 6 },
            dest: crate::chess::Position { x: 4, y: 4 },
        };
        let data = package_chess(&movement, &a.connection).unwrap();
        a.connection.queue_packet(data);
        let frames = a.drain(now);
        let results = b.receive(&frames, now);
        let (packet, source) = results[0].1.clone().unwrap();
        assert_eq!(packet, movement);
        assert_eq!(source, a.mac);
    }

    #[test]
    fn duplicated_broadcast_surfaces_once() {
        let mut a = Stack::new(0x0A);
        let c = Stack::new(0x0C);
        let now = Instant::now();

        let created = ChessPacket::LobbyCreated {
            name: "game1".into(),
        };
        let frame = package_chess_broadcast(&created, c.id, c.mac).unwrap();

        let first = handle_frame(&frame, &mut a.connection, &mut a.dedup, a.mac, now).unwrap();
        assert_eq!(first.1.unwrap().0, created);

        // The link layer delivered it twice
        let err =
            handle_frame(&frame, &mut a.connection, &mut a.dedup, a.mac, now).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateBroadcast));
    }

    #[test]
    fn frames_for_other_macs_are_ignored() {
        let mut a = Stack::new(0x0A);
        let now = Instant::now();

        let frame = EthernetFrame::new(Vec::new(), MacAddr([9; 6]), MacAddr([8; 6])).encode();
        let err = handle_frame(&frame, &mut a.connection, &mut a.dedup, a.mac, now).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAddressedToUs));
    }

    #[test]
    fn foreign_ethertype_is_a_distinguished_drop() {
        let mut a = Stack::new(0x0A);
        let now = Instant::now();

        let mut frame = EthernetFrame::new(Vec::new(), a.mac, MacAddr([8; 6])).encode();
        frame[12] = 0x08;
        frame[13] = 0x00;
        let err = handle_frame(&frame, &mut a.connection, &mut a.dedup, a.mac, now).unwrap_err();
        assert!(matches!(err, ProtocolError::IncorrectEtherType(0x0800)));
    }
}
