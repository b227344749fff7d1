//! RTP packet engine: header codec, peer table and the session that ties
//! them to a socket.

mod header;
mod peer;
mod session;

pub use header::{RTP_FIXED_HEADER_LEN, RTP_VERSION, RtpHeader};
pub use peer::{PeerTable, RTP_MAX_PEERS, RtpPeer};
pub use session::{RTP_SCRATCH_LEN, ReceivedPacket, RtpPacketInfo, RtpSession};
