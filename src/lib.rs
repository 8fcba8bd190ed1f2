//! Two-player chess over raw layer-2 Ethernet frames.
//!
//! Peers discover each other with deduplicated broadcasts and then play
//! over a reliable, ordered unicast connection built on a go-back-N sliding
//! window. No IP, no TCP; the stack starts at the Ethernet header.

mod bytes;
mod commands;
mod consts;
mod time;

pub mod broadcast;
pub mod chess;
pub mod connection;
pub mod error;
pub mod frame;
pub mod iface;
pub mod layering;
pub mod protocol;
pub mod session;
pub mod socket;
pub mod workers;

pub use error::{ProtocolError, Result};

use frame::MacAddr;
use uuid::Uuid;

/// Who we are on the network: a process-unique UUID plus the hardware
/// address of the bound interface. The UUID matters because two clients may
/// share an interface, making the MAC alone ambiguous.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub id: Uuid,
    pub mac: MacAddr,
}

impl Identity {
    pub fn generate(mac: MacAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            mac,
        }
    }
}
