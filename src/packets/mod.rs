//! Wire codecs: the RTP packet engine and the RTP-MIDI payload on top of it.

pub mod rtp;
pub mod rtpmidi;
