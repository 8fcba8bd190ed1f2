use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::bytes::Bytes;
use crate::error::{ProtocolError, Result};
use crate::time;

/// Sender UUID plus millisecond timestamp.
pub const HEADER_SIZE: usize = 24;

/// The stateless transport variant, sent to the Ethernet broadcast address.
///
/// Sender identity comes from the header rather than the Ethernet source:
/// several clients may share one interface, so a MAC does not identify a
/// process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastPacket {
    pub client_id: Uuid,
    pub timestamp: i64,
    payload: Vec<u8>,
}

impl BroadcastPacket {
    pub fn new(client_id: Uuid, payload: Vec<u8>) -> Self {
        Self {
            client_id,
            timestamp: time::unix_millis(),
            payload,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        self.client_id.write(&mut buf)?;
        buf.write_i64::<BigEndian>(self.timestamp)?;
        buf.write_all(&self.payload)?;
        Ok(buf)
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::MalformedHeader("broadcast packet"));
        }

        let mut reader = Cursor::new(buf);
        let client_id = Uuid::read(&mut reader)?;
        let timestamp = reader.read_i64::<BigEndian>()?;
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;

        Ok(Self {
            client_id,
            timestamp,
            payload,
        })
    }
}

/// Drops broadcasts we have already processed.
///
/// The link layer may deliver a broadcast more than once; a sender's
/// millisecond stamps increase monotonically, so remembering the latest
/// stamp per sender is enough to spot a replay. The map holds one entry per
/// active peer and is owned by the session.
pub struct BroadcastDedup {
    local_id: Uuid,
    last_seen: HashMap<Uuid, i64>,
}

impl BroadcastDedup {
    pub fn new(local_id: Uuid) -> Self {
        Self {
            local_id,
            last_seen: HashMap::new(),
        }
    }

    /// Admits a packet, or says why it should be ignored.
    pub fn accept(&mut self, packet: &BroadcastPacket) -> Result<()> {
        if packet.client_id == self.local_id {
            return Err(ProtocolError::OwnBroadcast);
        }

        if self.last_seen.get(&packet.client_id) == Some(&packet.timestamp) {
            return Err(ProtocolError::DuplicateBroadcast);
        }

        self.last_seen.insert(packet.client_id, packet.timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let packet = BroadcastPacket::new(Uuid::new_v4(), b"hello".to_vec());
        let decoded = BroadcastPacket::deserialize(&packet.serialize().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn timestamp_is_big_endian() {
        let mut packet = BroadcastPacket::new(Uuid::nil(), Vec::new());
        packet.timestamp = 0x0102030405060708;
        let buf = packet.serialize().unwrap();
        assert_eq!(&buf[16..24], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = BroadcastPacket::deserialize(&[0u8; 23]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader(_)));
    }

    #[test]
    fn own_broadcasts_are_dropped() {
        let local = Uuid::new_v4();
        let mut dedup = BroadcastDedup::new(local);
        let packet = BroadcastPacket::new(local, Vec::new());
        assert!(matches!(
            dedup.accept(&packet),
            Err(ProtocolError::OwnBroadcast)
        ));
    }

    #[test]
    fn replays_are_dropped_but_new_stamps_pass() {
        let mut dedup = BroadcastDedup::new(Uuid::new_v4());
        let sender = Uuid::new_v4();

        let mut first = BroadcastPacket::new(sender, Vec::new());
        first.timestamp = 1000;
        let mut second = BroadcastPacket::new(sender, Vec::new());
        second.timestamp = 2000;

        assert!(dedup.accept(&first).is_ok());
        assert!(matches!(
            dedup.accept(&first),
            Err(ProtocolError::DuplicateBroadcast)
        ));
        assert!(dedup.accept(&second).is_ok());
    }

    #[test]
    fn senders_are_deduplicated_independently() {
        let mut dedup = BroadcastDedup::new(Uuid::new_v4());
        let mut a = BroadcastPacket::new(Uuid::new_v4(), Vec::new());
        let mut b = BroadcastPacket::new(Uuid::new_v4(), Vec::new());
        a.timestamp = 1000;
        b.timestamp = 1000;

        assert!(dedup.accept(&a).is_ok());
        assert!(dedup.accept(&b).is_ok());
    }
}
