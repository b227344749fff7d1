//! RTP-MIDI payload: the command-list codec and the recovery-journal
//! bookkeeping described by RFC 4695/4696.

pub mod command_list;
mod header;
mod journal;
mod session;

pub use header::{COMMAND_LIST_MAX_LEN, RtpMidiHeader};
pub use journal::{PeerJournal, RecoveryJournal};
pub use session::{MAX_MESSAGES_PER_PACKET, RTP_MIDI_PAYLOAD_TYPE, ReceivedMidi, RtpMidiSession};
