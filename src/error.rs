use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Everything that can go wrong between the wire and the session.
///
/// Most of these are not failures so much as reasons to drop a frame: the
/// receive path hands every frame on the segment to the dispatcher, and the
/// dispatcher sorts out which ones concern us. Only the session decides what
/// is worth surfacing to the user.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("truncated {0} header")]
    MalformedHeader(&'static str),
    #[error("incorrect ethertype {0:#06x}")]
    IncorrectEtherType(u16),
    #[error("frame not addressed to us")]
    NotAddressedToUs,
    #[error("packet not received from connection peer")]
    WrongPeer,
    #[error("packet received out of order")]
    OutOfOrder,
    #[error("this is our own broadcast")]
    OwnBroadcast,
    #[error("duplicate broadcast received")]
    DuplicateBroadcast,
    #[error("unknown packet type {0}")]
    UnknownPacketType(i32),
    #[error("board position ({x}, {y}) out of range")]
    InvalidPosition { x: i32, y: i32 },
    #[error("ack does not match the head of the send window")]
    WindowMismatch,
    #[error("there is already an active connection")]
    AlreadyConnected,
    #[error("no active connection")]
    NotConnected,
    #[error("no connection was requested")]
    NotRequested,
    #[error("send channel closed")]
    ChannelClosed,
}
