use bytes::BufMut;
use zerocopy::network_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{MidiError, Result};

pub const RTP_VERSION: u8 = 2;
pub const RTP_FIXED_HEADER_LEN: usize = 12;

/// The twelve octets present in every RTP packet.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | V |P|X|  CC   |M|     PT      |        Sequence number        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RtpFixedHeader {
    flags: [u8; 2],
    sequence_number: U16,
    timestamp: U32,
    ssrc: U32,
}

/// Decoded RTP header fields, contributor list included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
}

impl RtpHeader {
    pub fn size(&self) -> usize {
        RTP_FIXED_HEADER_LEN + 4 * self.csrc.len()
    }

    /// Append the header to `buf`, returning the number of bytes written.
    pub fn write(&self, buf: &mut impl BufMut) -> usize {
        let byte0 = (RTP_VERSION << 6)
            | if self.padding { 0x20 } else { 0 }
            | if self.extension { 0x10 } else { 0 }
            | (self.csrc.len() as u8 & 0x0F);
        let byte1 = if self.marker { 0x80 } else { 0 } | (self.payload_type & 0x7F);
        let fixed = RtpFixedHeader {
            flags: [byte0, byte1],
            sequence_number: U16::new(self.sequence_number),
            timestamp: U32::new(self.timestamp),
            ssrc: U32::new(self.ssrc),
        };
        buf.put_slice(fixed.as_bytes());
        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }
        self.size()
    }

    /// Parse the header from the head of `buf`, returning it and the number
    /// of bytes consumed. Anything but version 2 is rejected.
    pub fn parse(buf: &[u8]) -> Result<(RtpHeader, usize)> {
        let (fixed, _) = RtpFixedHeader::ref_from_prefix(buf).map_err(|_| MidiError::ShortPacket)?;
        if fixed.flags[0] >> 6 != RTP_VERSION {
            return Err(MidiError::BadRtpVersion(fixed.flags[0]));
        }
        let csrc_count = (fixed.flags[0] & 0x0F) as usize;
        let size = RTP_FIXED_HEADER_LEN + 4 * csrc_count;
        if buf.len() < size {
            return Err(MidiError::ShortPacket);
        }
        let mut csrc = Vec::with_capacity(csrc_count);
        for i in 0..csrc_count {
            let at = RTP_FIXED_HEADER_LEN + 4 * i;
            csrc.push(u32::from_be_bytes(buf[at..at + 4].try_into().unwrap()));
        }
        Ok((
            RtpHeader {
                padding: fixed.flags[0] & 0x20 != 0,
                extension: fixed.flags[0] & 0x10 != 0,
                marker: fixed.flags[1] & 0x80 != 0,
                payload_type: fixed.flags[1] & 0x7F,
                sequence_number: fixed.sequence_number.get(),
                timestamp: fixed.timestamp.get(),
                ssrc: fixed.ssrc.get(),
                csrc,
            },
            size,
        ))
    }
}
