use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bytes::{read_string, write_string};
use crate::chess::Position;
use crate::error::{ProtocolError, Result};

const LOBBY_CREATED: i32 = 0;
const LOBBY_LIST_REQUEST: i32 = 1;
const LOBBY_INFO: i32 = 2;
const LOBBY_JOIN_REQUEST: i32 = 3;
const LOBBY_START_REQUEST: i32 = 4;
const LOBBY_START_ACCEPT: i32 = 5;
const MOVE_PIECE: i32 = 6;
const FORFEIT: i32 = 7;

/// Application-level message, carried as the payload of either transport
/// variant. The wire form is a leading i32 tag followed by the fields of
/// the matching arm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChessPacket {
    LobbyCreated { name: String },
    LobbyListRequest,
    LobbyInfo { name: String },
    LobbyJoinRequest { name: String },
    LobbyStartRequest,
    LobbyStartAccept,
    MovePiece { src: Position, dest: Position },
    Forfeit,
}

impl ChessPacket {
    pub fn tag(&self) -> i32 {
        match self {
            ChessPacket::LobbyCreated { .. } => LOBBY_CREATED,
            ChessPacket::LobbyListRequest => LOBBY_LIST_REQUEST,
            ChessPacket::LobbyInfo { .. } => LOBBY_INFO,
            ChessPacket::LobbyJoinRequest { .. } => LOBBY_JOIN_REQUEST,
            ChessPacket::LobbyStartRequest => LOBBY_START_REQUEST,
            ChessPacket::LobbyStartAccept => LOBBY_START_ACCEPT,
            ChessPacket::MovePiece { .. } => MOVE_PIECE,
            ChessPacket::Forfeit => FORFEIT,
        }
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_i32::<BigEndian>(self.tag())?;

        match self {
            ChessPacket::LobbyCreated { name }
            | ChessPacket::LobbyInfo { name }
            | ChessPacket::LobbyJoinRequest { name } => write_string(&mut buf, name)?,
            ChessPacket::MovePiece { src, dest } => {
                buf.write_i32::<BigEndian>(src.x as i32)?;
                buf.write_i32::<BigEndian>(src.y as i32)?;
                buf.write_i32::<BigEndian>(dest.x as i32)?;
                buf.write_i32::<BigEndian>(dest.y as i32)?;
            }
            // The rest are pure signals with no body
            ChessPacket::LobbyListRequest
            | ChessPacket::LobbyStartRequest
            | ChessPacket::LobbyStartAccept
            | ChessPacket::Forfeit => {}
        }

        Ok(buf)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let tag = reader
            .read_i32::<BigEndian>()
            .map_err(|_| ProtocolError::MalformedHeader("chess packet"))?;

        log::debug!("received chess packet of type {tag}");

        match tag {
            LOBBY_CREATED => Ok(ChessPacket::LobbyCreated {
                name: read_string(&mut reader)?,
            }),
            LOBBY_LIST_REQUEST => Ok(ChessPacket::LobbyListRequest),
            LOBBY_INFO => Ok(ChessPacket::LobbyInfo {
                name: read_string(&mut reader)?,
            }),
            LOBBY_JOIN_REQUEST => Ok(ChessPacket::LobbyJoinRequest {
                name: read_string(&mut reader)?,
            }),
            LOBBY_START_REQUEST => Ok(ChessPacket::LobbyStartRequest),
            LOBBY_START_ACCEPT => Ok(ChessPacket::LobbyStartAccept),
            MOVE_PIECE => Ok(ChessPacket::MovePiece {
                src: read_position(&mut reader)?,
                dest: read_position(&mut reader)?,
            }),
            FORFEIT => Ok(ChessPacket::Forfeit),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Positions arrive from an untrusted peer; anything outside the board is
/// malformed rather than a panic waiting to happen.
fn read_position(reader: &mut Cursor<&[u8]>) -> Result<Position> {
    let x = reader.read_i32::<BigEndian>()?;
    let y = reader.read_i32::<BigEndian>()?;
    if !(0..8).contains(&x) || !(0..8).contains(&y) {
        return Err(ProtocolError::InvalidPosition { x, y });
    }
    Ok(Position {
        x: x as usize,
        y: y as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: ChessPacket) {
        let decoded = ChessPacket::deserialize(&packet.serialize().unwrap()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn every_packet_kind_round_trips() {
        round_trip(ChessPacket::LobbyCreated {
            name: "game1".into(),
        });
        round_trip(ChessPacket::LobbyListRequest);
        round_trip(ChessPacket::LobbyInfo { name: "game".into() });
        round_trip(ChessPacket::LobbyJoinRequest { name: "g".into() });
        round_trip(ChessPacket::LobbyStartRequest);
        round_trip(ChessPacket::LobbyStartAccept);
        round_trip(ChessPacket::MovePiece {
            src: Position { x: 4, y: 6 },
            dest: Position { x: 4, y: 4 },
        });
        round_trip(ChessPacket::Forfeit);
    }

    #[test]
    fn tag_is_the_leading_big_endian_field() {
        let buf = ChessPacket::Forfeit.serialize().unwrap();
        assert_eq!(buf, vec![0, 0, 0, 7]);
    }

    #[test]
    fn move_piece_fields_are_in_wire_order() {
        let buf = ChessPacket::MovePiece {
            src: Position { x: 4, y: 6 },
            dest: Position { x: 4, y: 4 },
        }
        .serialize()
        .unwrap();
        assert_eq!(&buf[0..4], &[0, 0, 0, 6]);
        assert_eq!(&buf[4..8], &[0, 0, 0, 4]);
        assert_eq!(&buf[8..12], &[0, 0, 0, 6]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 4]);
        assert_eq!(&buf[16..20], &[0, 0, 0, 4]);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = ChessPacket::deserialize(&42i32.to_be_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownPacketType(42)));
    }

    #[test]
    fn empty_input_is_malformed() {
        let err = ChessPacket::deserialize(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeader(_)));
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MOVE_PIECE.to_be_bytes());
        buf.extend_from_slice(&8i32.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&0i32.to_be_bytes());
        let err = ChessPacket::deserialize(&buf).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPosition { x: 8, y: 0 }));
    }

    #[test]
    fn truncated_name_is_an_error() {
        let mut buf = ChessPacket::LobbyCreated {
            name: "thegame".into(),
        }
        .serialize()
        .unwrap();
        buf.truncate(buf.len() - 2);
        assert!(ChessPacket::deserialize(&buf).is_err());
    }
}
