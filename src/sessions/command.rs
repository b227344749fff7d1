use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::network_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{MidiError, Result};

const SIGNATURE: [u8; 2] = [0xFF, 0xFF];

pub const PROTOCOL_VERSION: u32 = 2;

/// Longest session name accepted on the wire.
pub const MAX_NAME_LEN: usize = 63;

#[derive(Debug, KnownLayout, Unaligned, IntoBytes, Immutable, FromBytes)]
#[repr(C)]
struct CommandHeader {
    signature: [u8; 2],
    tag: [u8; 2],
}

#[derive(Debug, KnownLayout, Unaligned, IntoBytes, Immutable, FromBytes)]
#[repr(C)]
struct SessionBodyWire {
    version: U32,
    token: U32,
    ssrc: U32,
}

#[derive(Debug, KnownLayout, Unaligned, IntoBytes, Immutable, FromBytes)]
#[repr(C)]
struct SyncBodyWire {
    ssrc: U32,
    count: u8,
    reserved: [u8; 3],
    timestamps: [U64; 3],
}

#[derive(Debug, KnownLayout, Unaligned, IntoBytes, Immutable, FromBytes)]
#[repr(C)]
struct FeedbackBodyWire {
    ssrc: U32,
    seqnum: U32,
}

/// Shared body of the invitation-family commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBody {
    pub version: u32,
    pub token: u32,
    pub ssrc: u32,
    pub name: Option<String>,
}

/// One AppleMIDI session command.
///
/// Every command starts with the `0xFFFF` signature and a two-character
/// tag; all integers are big-endian. Names travel without a terminator
/// (a trailing NUL from other stacks is tolerated on decode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Invitation(SessionBody),
    InvitationAccepted(SessionBody),
    InvitationRejected(SessionBody),
    EndSession(SessionBody),
    Sync {
        ssrc: u32,
        count: u8,
        timestamps: [u64; 3],
    },
    ReceiverFeedback {
        ssrc: u32,
        seqnum: u32,
    },
}

fn truncate_utf8(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

impl SessionCommand {
    pub fn invitation(token: u32, ssrc: u32, name: &str) -> Self {
        SessionCommand::Invitation(SessionBody {
            version: PROTOCOL_VERSION,
            token,
            ssrc,
            name: Some(name.to_string()),
        })
    }

    pub fn accepted(token: u32, ssrc: u32, name: &str) -> Self {
        SessionCommand::InvitationAccepted(SessionBody {
            version: PROTOCOL_VERSION,
            token,
            ssrc,
            name: Some(name.to_string()),
        })
    }

    pub fn rejected(token: u32, ssrc: u32, name: &str) -> Self {
        SessionCommand::InvitationRejected(SessionBody {
            version: PROTOCOL_VERSION,
            token,
            ssrc,
            name: Some(name.to_string()),
        })
    }

    pub fn end_session(token: u32, ssrc: u32) -> Self {
        SessionCommand::EndSession(SessionBody {
            version: PROTOCOL_VERSION,
            token,
            ssrc,
            name: None,
        })
    }

    pub fn sync(ssrc: u32, count: u8, timestamps: [u64; 3]) -> Self {
        SessionCommand::Sync { ssrc, count, timestamps }
    }

    pub fn receiver_feedback(ssrc: u32, seqnum: u32) -> Self {
        SessionCommand::ReceiverFeedback { ssrc, seqnum }
    }

    fn tag(&self) -> &'static [u8; 2] {
        match self {
            SessionCommand::Invitation(_) => b"IN",
            SessionCommand::InvitationAccepted(_) => b"OK",
            SessionCommand::InvitationRejected(_) => b"NO",
            SessionCommand::EndSession(_) => b"BY",
            SessionCommand::Sync { .. } => b"CK",
            SessionCommand::ReceiverFeedback { .. } => b"RS",
        }
    }

    /// Whether a datagram opens with the signature and a known tag.
    pub fn is_session_command(buf: &[u8]) -> bool {
        buf.len() >= 4
            && buf[..2] == SIGNATURE
            && matches!(&buf[2..4], b"IN" | b"OK" | b"NO" | b"BY" | b"CK" | b"RS")
    }

    pub fn parse(buf: &[u8]) -> Result<SessionCommand> {
        let (header, remainder) = CommandHeader::ref_from_prefix(buf).map_err(|_| MidiError::BadSessionCommand)?;
        if header.signature != SIGNATURE {
            return Err(MidiError::BadSessionCommand);
        }
        match &header.tag {
            b"IN" | b"OK" | b"NO" | b"BY" => {
                let (body, payload) =
                    SessionBodyWire::ref_from_prefix(remainder).map_err(|_| MidiError::BadSessionCommand)?;
                let name = if payload.is_empty() {
                    None
                } else {
                    let bytes = payload.strip_suffix(&[0]).unwrap_or(payload);
                    let bytes = &bytes[..bytes.len().min(MAX_NAME_LEN)];
                    Some(String::from_utf8_lossy(bytes).into_owned())
                };
                let body = SessionBody {
                    version: body.version.get(),
                    token: body.token.get(),
                    ssrc: body.ssrc.get(),
                    name,
                };
                Ok(match &header.tag {
                    b"IN" => SessionCommand::Invitation(body),
                    b"OK" => SessionCommand::InvitationAccepted(body),
                    b"NO" => SessionCommand::InvitationRejected(body),
                    _ => SessionCommand::EndSession(body),
                })
            }
            b"CK" => {
                let body = SyncBodyWire::ref_from_bytes(remainder).map_err(|_| MidiError::BadSessionCommand)?;
                Ok(SessionCommand::Sync {
                    ssrc: body.ssrc.get(),
                    count: body.count,
                    timestamps: [
                        body.timestamps[0].get(),
                        body.timestamps[1].get(),
                        body.timestamps[2].get(),
                    ],
                })
            }
            b"RS" => {
                let body = FeedbackBodyWire::ref_from_bytes(remainder).map_err(|_| MidiError::BadSessionCommand)?;
                Ok(SessionCommand::ReceiverFeedback {
                    ssrc: body.ssrc.get(),
                    seqnum: body.seqnum.get(),
                })
            }
            _ => Err(MidiError::BadSessionCommand),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let header = CommandHeader {
            signature: SIGNATURE,
            tag: *self.tag(),
        };
        let mut buf = BytesMut::with_capacity(40 + MAX_NAME_LEN);
        buf.put_slice(header.as_bytes());
        match self {
            SessionCommand::Invitation(body)
            | SessionCommand::InvitationAccepted(body)
            | SessionCommand::InvitationRejected(body)
            | SessionCommand::EndSession(body) => {
                let wire = SessionBodyWire {
                    version: U32::new(body.version),
                    token: U32::new(body.token),
                    ssrc: U32::new(body.ssrc),
                };
                buf.put_slice(wire.as_bytes());
                if let Some(name) = &body.name {
                    buf.put_slice(truncate_utf8(name, MAX_NAME_LEN).as_bytes());
                }
            }
            SessionCommand::Sync { ssrc, count, timestamps } => {
                let wire = SyncBodyWire {
                    ssrc: U32::new(*ssrc),
                    count: *count,
                    reserved: [0; 3],
                    timestamps: [
                        U64::new(timestamps[0]),
                        U64::new(timestamps[1]),
                        U64::new(timestamps[2]),
                    ],
                };
                buf.put_slice(wire.as_bytes());
            }
            SessionCommand::ReceiverFeedback { ssrc, seqnum } => {
                let wire = FeedbackBodyWire {
                    ssrc: U32::new(*ssrc),
                    seqnum: U32::new(*seqnum),
                };
                buf.put_slice(wire.as_bytes());
            }
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_wire_image() {
        let command = SessionCommand::invitation(0xF8D180E6, 0xF519AEB9, "My MIDI Session");
        let bytes = command.to_bytes();
        let mut expected = vec![
            0xFF, 0xFF, 0x49, 0x4E, // signature, "IN"
            0x00, 0x00, 0x00, 0x02, // version
            0xF8, 0xD1, 0x80, 0xE6, // token
            0xF5, 0x19, 0xAE, 0xB9, // ssrc
        ];
        expected.extend_from_slice(b"My MIDI Session");
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_invitation_roundtrip() {
        let command = SessionCommand::invitation(1, 2, "Lovely Session");
        let parsed = SessionCommand::parse(&command.to_bytes()).unwrap();
        assert_eq!(parsed, command);
    }

    #[test]
    fn test_trailing_nul_is_tolerated() {
        let mut bytes = SessionCommand::invitation(1, 2, "Session").to_bytes().to_vec();
        bytes.push(0);
        let parsed = SessionCommand::parse(&bytes).unwrap();
        if let SessionCommand::Invitation(body) = parsed {
            assert_eq!(body.name.as_deref(), Some("Session"));
        } else {
            panic!("expected invitation");
        }
    }

    #[test]
    fn test_end_session_has_no_name() {
        let command = SessionCommand::end_session(7, 8);
        let bytes = command.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(SessionCommand::parse(&bytes).unwrap(), command);
    }

    #[test]
    fn test_sync_wire_image() {
        let command = SessionCommand::sync(0xF519AEB9, 2, [1, 2, 3]);
        let bytes = command.to_bytes();
        let expected = [
            0xFF, 0xFF, 0x43, 0x4B, // signature, "CK"
            0xF5, 0x19, 0xAE, 0xB9, // ssrc
            0x02, // count
            0x00, 0x00, 0x00, // reserved
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // timestamp 1
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, // timestamp 2
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, // timestamp 3
        ];
        assert_eq!(&bytes[..], &expected[..]);
        assert_eq!(SessionCommand::parse(&bytes).unwrap(), command);
    }

    #[test]
    fn test_receiver_feedback_roundtrip() {
        let command = SessionCommand::receiver_feedback(0xAABBCCDD, 0x1234);
        let bytes = command.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(SessionCommand::parse(&bytes).unwrap(), command);
    }

    #[test]
    fn test_probe_classification() {
        assert!(SessionCommand::is_session_command(&[0xFF, 0xFF, 0x49, 0x4E]));
        assert!(SessionCommand::is_session_command(&[0xFF, 0xFF, 0x43, 0x4B, 0x00]));
        // RTP packets start with the version bits, not the signature.
        assert!(!SessionCommand::is_session_command(&[0x80, 0x61, 0x00, 0x01]));
        // Unknown tag.
        assert!(!SessionCommand::is_session_command(&[0xFF, 0xFF, 0x00, 0x00]));
        assert!(!SessionCommand::is_session_command(&[0xFF, 0xFF]));
    }

    #[test]
    fn test_malformed_commands_rejected() {
        assert!(matches!(
            SessionCommand::parse(&[0xFF, 0xFF, 0x43]),
            Err(MidiError::BadSessionCommand)
        ));
        assert!(matches!(
            SessionCommand::parse(&[0xFF, 0xFF, 0x43, 0x4B, 0x00, 0x01]),
            Err(MidiError::BadSessionCommand)
        ));
        assert!(matches!(
            SessionCommand::parse(&[0x00, 0x00, 0x49, 0x4E]),
            Err(MidiError::BadSessionCommand)
        ));
    }

    #[test]
    fn test_long_names_are_truncated_on_encode() {
        let long = "x".repeat(100);
        let command = SessionCommand::invitation(1, 2, &long);
        let bytes = command.to_bytes();
        assert_eq!(bytes.len(), 16 + MAX_NAME_LEN);
    }
}
