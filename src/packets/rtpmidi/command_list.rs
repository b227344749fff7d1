use bytes::BufMut;

use crate::clock::Timestamp;
use crate::error::{MidiError, Result};
use crate::message::{MidiMessage, varlen};

/// Encode `messages` as an RTP-MIDI command list.
///
/// Deltas are the tick differences between consecutive message timestamps
/// (clamped at zero; a list never moves backwards). The first delta is
/// omitted when it is zero; the returned flag says whether it was written
/// and belongs in the header's `Z` bit. Statuses are coded with a running
/// status register that starts cleared for every list.
pub fn encode(messages: &[MidiMessage], base_timestamp: Timestamp, buf: &mut impl BufMut) -> (bool, usize) {
    let mut written = 0;
    let mut status: u8 = 0;
    let mut previous = base_timestamp;
    let mut zero = false;

    for (index, message) in messages.iter().enumerate() {
        let delta = message.timestamp().saturating_sub(previous).max(0) as u64;
        let delta = delta.min(varlen::VARLEN_MAX as u64) as u32;
        previous = message.timestamp();
        if index == 0 {
            zero = delta != 0;
        }
        if index > 0 || zero {
            written += varlen::write(delta, buf);
        }
        written += message.encode_running_status(&mut status, buf);
    }
    (zero, written)
}

/// Decode a command list of exactly `length` bytes.
///
/// The running timestamp starts at `base_timestamp` and advances by each
/// delta; the first command has an implicit delta of zero unless `zero` is
/// set. A command that crosses the declared end of the list is malformed.
pub fn decode(buf: &[u8], length: usize, zero: bool, base_timestamp: Timestamp) -> Result<Vec<MidiMessage>> {
    if buf.len() < length {
        return Err(MidiError::MalformedCommandList("declared length exceeds packet"));
    }
    let window = &buf[..length];
    let mut messages = Vec::new();
    let mut status: u8 = 0;
    let mut timestamp = base_timestamp;
    let mut at = 0;

    while at < length {
        let delta = if !messages.is_empty() || zero {
            let (value, consumed) = varlen::read(&window[at..]).map_err(|e| match e {
                MidiError::ShortPacket => MidiError::MalformedCommandList("delta time crosses list boundary"),
                other => other,
            })?;
            at += consumed;
            value
        } else {
            0
        };
        if at >= length {
            return Err(MidiError::MalformedCommandList("delta time without a command"));
        }

        let (mut message, consumed) =
            MidiMessage::decode_running_status(&window[at..], &mut status).map_err(|e| match e {
                MidiError::ShortPacket => MidiError::MalformedCommandList("command crosses list boundary"),
                other => other,
            })?;
        at += consumed;

        timestamp += delta as Timestamp;
        message.set_timestamp(timestamp);
        messages.push(message);
    }

    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use bytes::BytesMut;

    #[test]
    fn test_zero_delta_batch_bytes() {
        let messages = [
            MidiMessage::with_timestamp(MessageKind::NoteOn { channel: 0, key: 66, velocity: 104 }, 1000),
            MidiMessage::with_timestamp(MessageKind::PolyphonicKeyPressure { channel: 0, key: 66, pressure: 120 }, 1000),
            MidiMessage::with_timestamp(MessageKind::NoteOff { channel: 0, key: 66, velocity: 104 }, 1000),
        ];
        let mut buf = BytesMut::new();
        let (zero, length) = encode(&messages, 1000, &mut buf);
        assert!(!zero);
        assert_eq!(length, 11);
        assert_eq!(
            &buf[..],
            &[0x90, 0x42, 0x68, 0x00, 0xA0, 0x42, 0x78, 0x00, 0x80, 0x42, 0x68]
        );
    }

    #[test]
    fn test_roundtrip_with_monotone_timestamps() {
        let messages = [
            MidiMessage::with_timestamp(MessageKind::NoteOn { channel: 3, key: 60, velocity: 90 }, 100),
            MidiMessage::with_timestamp(MessageKind::NoteOn { channel: 3, key: 64, velocity: 90 }, 250),
            MidiMessage::with_timestamp(MessageKind::NoteOff { channel: 3, key: 60, velocity: 0 }, 1000),
            MidiMessage::with_timestamp(MessageKind::NoteOff { channel: 3, key: 64, velocity: 0 }, 50_000),
        ];
        let mut buf = BytesMut::new();
        let (zero, length) = encode(&messages, 100, &mut buf);
        assert!(!zero);
        let decoded = decode(&buf, length, zero, 100).unwrap();
        assert_eq!(decoded.len(), messages.len());
        for (a, b) in decoded.iter().zip(messages.iter()) {
            assert_eq!(a.kind(), b.kind());
            assert_eq!(a.timestamp(), b.timestamp());
        }
    }

    #[test]
    fn test_leading_delta_sets_zero_flag() {
        let messages = [MidiMessage::with_timestamp(
            MessageKind::NoteOn { channel: 0, key: 1, velocity: 2 },
            500,
        )];
        let mut buf = BytesMut::new();
        let (zero, length) = encode(&messages, 100, &mut buf);
        assert!(zero);
        // Delta 400 takes two varlen bytes.
        assert_eq!(length, 5);
        let decoded = decode(&buf, length, zero, 100).unwrap();
        assert_eq!(decoded[0].timestamp(), 500);
    }

    #[test]
    fn test_running_status_in_list() {
        let messages = [
            MidiMessage::with_timestamp(MessageKind::NoteOn { channel: 5, key: 10, velocity: 20 }, 0),
            MidiMessage::with_timestamp(MessageKind::NoteOn { channel: 5, key: 11, velocity: 21 }, 0),
        ];
        let mut buf = BytesMut::new();
        let (_, length) = encode(&messages, 0, &mut buf);
        // Second NoteOn rides the running status: 3 + 1 (delta) + 2.
        assert_eq!(length, 6);
        let decoded = decode(&buf, length, false, 0).unwrap();
        assert_eq!(decoded[1].kind(), messages[1].kind());
    }

    #[test]
    fn test_truncated_command_is_malformed() {
        let messages = [MidiMessage::with_timestamp(MessageKind::NoteOn { channel: 0, key: 1, velocity: 2 }, 0)];
        let mut buf = BytesMut::new();
        let (zero, length) = encode(&messages, 0, &mut buf);
        let result = decode(&buf, length - 1, zero, 0);
        assert!(matches!(result, Err(MidiError::MalformedCommandList(_))));
    }

    #[test]
    fn test_declared_length_beyond_packet_is_malformed() {
        let result = decode(&[0x90, 0x40], 5, false, 0);
        assert!(matches!(result, Err(MidiError::MalformedCommandList(_))));
    }
}
