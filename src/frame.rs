use std::fmt;

use crate::consts::ETHER_TYPE;
use crate::error::{ProtocolError, Result};

/// Size of the Ethernet header: two MAC addresses plus the EtherType.
pub const HEADER_SIZE: usize = 14;

/// A layer-2 hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// A raw Ethernet frame: the outermost envelope of the stack.
///
/// Decoding deliberately accepts any EtherType; the layering dispatcher is
/// the one place that decides a foreign EtherType means "silently ignore".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dest: MacAddr,
    pub source: MacAddr,
    pub ether_type: u16,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    /// Wraps a payload for transmission, stamping our EtherType.
    pub fn new(payload: Vec<u8>, dest: MacAddr, source: MacAddr) -> Self {
        Self {
            dest,
            source,
            ether_type: ETHER_TYPE,
            payload,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.dest.0);
        buf.extend_from_slice(&self.source.0);
        buf.extend_from_slice(&self.ether_type.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::MalformedHeader("ethernet frame"));
        }

        let mut dest = [0u8; 6];
        dest.copy_from_slice(&buf[0..6]);
        let mut source = [0u8; 6];
        source.copy_from_slice(&buf[6..12]);
        let ether_type = u16::from_be_bytes([buf[12], buf[13]]);

        Ok(Self {
            dest: MacAddr(dest),
            source: MacAddr(source),
            ether_type,
            payload: buf[HEADER_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let frame = EthernetFrame::new(
            vec![1, 2, 3],
            MacAddr([0x02, 0, 0, 0, 0, 0x0B]),
            MacAddr([0x02, 0, 0, 0, 0, 0x0A]),
        );
        let encoded = frame.encode();
        assert_eq!(EthernetFrame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn produced_frames_carry_our_ethertype() {
        let frame = EthernetFrame::new(Vec::new(), MacAddr::BROADCAST, MacAddr([1; 6]));
        let encoded = frame.encode();
        // EtherType sits right after the two addresses, high byte first.
        assert_eq!(&encoded[12..14], &[0x95, 0x28]);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = EthernetFrame::decode(&[0u8; 13]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader(_)));
    }

    #[test]
    fn foreign_ethertype_survives_decode() {
        let mut encoded = EthernetFrame::new(Vec::new(), MacAddr([2; 6]), MacAddr([3; 6])).encode();
        encoded[12] = 0x08;
        encoded[13] = 0x00;
        let frame = EthernetFrame::decode(&encoded).unwrap();
        assert_eq!(frame.ether_type, 0x0800);
    }

    #[test]
    fn mac_display_is_colon_separated_hex() {
        let mac = MacAddr([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:01");
    }
}
