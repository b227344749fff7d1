//! The AppleMIDI session layer: the command codec and the driver that runs
//! the invitation handshake, clock synchronisation and MIDI transport over
//! two adjacent UDP ports.

pub mod command;
mod driver;

use std::net::SocketAddr;

pub use command::{MAX_NAME_LEN, PROTOCOL_VERSION, SessionBody, SessionCommand};
pub use driver::{AcceptPolicy, AppleMidiDriver, MAX_SESSION_NAME_LEN};

/// Session lifecycle notifications, published through the driver's delivery
/// port.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    PeerDidSendInvitation { source: SocketAddr, name: Option<String> },
    PeerDidAcceptInvitation { ssrc: u32, addr: SocketAddr },
    PeerDidRejectInvitation { source: SocketAddr },
    PeerDidEndSession { ssrc: u32 },
}
