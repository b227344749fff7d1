use bytes::BufMut;

use super::property::{Property, PropertyValue};
use super::status::Status;
use crate::clock::Timestamp;
use crate::error::{MidiError, Result};

/// A system-exclusive manufacturer id.
///
/// The short form is a single 7-bit byte. The extended form occupies two
/// wire bytes behind a zero escape byte and is stored here as `(hi << 8) | lo`
/// with both halves 7-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManufacturerId {
    Short(u8),
    Extended(u16),
}

impl ManufacturerId {
    fn wire_len(&self) -> usize {
        match self {
            ManufacturerId::Short(_) => 1,
            ManufacturerId::Extended(_) => 3,
        }
    }
}

/// Status plus variant-specific payload, one variant per legal status.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    NoteOff { channel: u8, key: u8, velocity: u8 },
    NoteOn { channel: u8, key: u8, velocity: u8 },
    PolyphonicKeyPressure { channel: u8, key: u8, pressure: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PitchWheelChange { channel: u8, value: u16 },
    /// `fragment` counts the pieces of a split transmission from 1; only the
    /// first fragment carries the status byte and manufacturer id on the
    /// wire.
    SystemExclusive {
        manufacturer: ManufacturerId,
        fragment: u8,
        data: Vec<u8>,
    },
    TimeCodeQuarterFrame { time_code_type: u8, value: u8 },
    SongPositionPointer { value: u16 },
    SongSelect { value: u8 },
    TuneRequest,
    EndOfExclusive,
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    Reset,
}

/// An owned MIDI message with the timestamp it applies at.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiMessage {
    timestamp: Timestamp,
    kind: MessageKind,
}

impl MidiMessage {
    pub fn new(kind: MessageKind) -> Self {
        MidiMessage { timestamp: 0, kind }
    }

    pub fn with_timestamp(kind: MessageKind, timestamp: Timestamp) -> Self {
        MidiMessage { timestamp, kind }
    }

    /// A message of the given status with zeroed fields.
    pub fn create(status: Status) -> Self {
        let kind = match status {
            Status::NoteOff => MessageKind::NoteOff { channel: 0, key: 0, velocity: 0 },
            Status::NoteOn => MessageKind::NoteOn { channel: 0, key: 0, velocity: 0 },
            Status::PolyphonicKeyPressure => MessageKind::PolyphonicKeyPressure { channel: 0, key: 0, pressure: 0 },
            Status::ControlChange => MessageKind::ControlChange { channel: 0, control: 0, value: 0 },
            Status::ProgramChange => MessageKind::ProgramChange { channel: 0, program: 0 },
            Status::ChannelPressure => MessageKind::ChannelPressure { channel: 0, pressure: 0 },
            Status::PitchWheelChange => MessageKind::PitchWheelChange { channel: 0, value: 0 },
            Status::SystemExclusive => MessageKind::SystemExclusive {
                manufacturer: ManufacturerId::Short(0),
                fragment: 1,
                data: Vec::new(),
            },
            Status::TimeCodeQuarterFrame => MessageKind::TimeCodeQuarterFrame { time_code_type: 0, value: 0 },
            Status::SongPositionPointer => MessageKind::SongPositionPointer { value: 0 },
            Status::SongSelect => MessageKind::SongSelect { value: 0 },
            Status::TuneRequest => MessageKind::TuneRequest,
            Status::EndOfExclusive => MessageKind::EndOfExclusive,
            Status::TimingClock => MessageKind::TimingClock,
            Status::Start => MessageKind::Start,
            Status::Continue => MessageKind::Continue,
            Status::Stop => MessageKind::Stop,
            Status::ActiveSensing => MessageKind::ActiveSensing,
            Status::Reset => MessageKind::Reset,
        };
        MidiMessage::new(kind)
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    pub fn status(&self) -> Status {
        match &self.kind {
            MessageKind::NoteOff { .. } => Status::NoteOff,
            MessageKind::NoteOn { .. } => Status::NoteOn,
            MessageKind::PolyphonicKeyPressure { .. } => Status::PolyphonicKeyPressure,
            MessageKind::ControlChange { .. } => Status::ControlChange,
            MessageKind::ProgramChange { .. } => Status::ProgramChange,
            MessageKind::ChannelPressure { .. } => Status::ChannelPressure,
            MessageKind::PitchWheelChange { .. } => Status::PitchWheelChange,
            MessageKind::SystemExclusive { .. } => Status::SystemExclusive,
            MessageKind::TimeCodeQuarterFrame { .. } => Status::TimeCodeQuarterFrame,
            MessageKind::SongPositionPointer { .. } => Status::SongPositionPointer,
            MessageKind::SongSelect { .. } => Status::SongSelect,
            MessageKind::TuneRequest => Status::TuneRequest,
            MessageKind::EndOfExclusive => Status::EndOfExclusive,
            MessageKind::TimingClock => Status::TimingClock,
            MessageKind::Start => Status::Start,
            MessageKind::Continue => Status::Continue,
            MessageKind::Stop => Status::Stop,
            MessageKind::ActiveSensing => Status::ActiveSensing,
            MessageKind::Reset => Status::Reset,
        }
    }

    /// The full wire status byte, channel nibble included.
    pub fn status_byte(&self) -> u8 {
        let channel = match &self.kind {
            MessageKind::NoteOff { channel, .. }
            | MessageKind::NoteOn { channel, .. }
            | MessageKind::PolyphonicKeyPressure { channel, .. }
            | MessageKind::ControlChange { channel, .. }
            | MessageKind::ProgramChange { channel, .. }
            | MessageKind::ChannelPressure { channel, .. }
            | MessageKind::PitchWheelChange { channel, .. } => *channel & 0x0F,
            _ => 0,
        };
        self.status().byte() | channel
    }

    /// Encoded size in bytes, status byte included.
    pub fn size(&self) -> usize {
        match &self.kind {
            MessageKind::NoteOff { .. }
            | MessageKind::NoteOn { .. }
            | MessageKind::PolyphonicKeyPressure { .. }
            | MessageKind::ControlChange { .. }
            | MessageKind::PitchWheelChange { .. }
            | MessageKind::SongPositionPointer { .. } => 3,
            MessageKind::ProgramChange { .. }
            | MessageKind::ChannelPressure { .. }
            | MessageKind::TimeCodeQuarterFrame { .. }
            | MessageKind::SongSelect { .. } => 2,
            MessageKind::SystemExclusive { manufacturer, fragment, data } => {
                if *fragment <= 1 {
                    data.len() + 1 + manufacturer.wire_len()
                } else {
                    data.len()
                }
            }
            _ => 1,
        }
    }

    /// Encode without a running-status context; the status byte is always
    /// written.
    pub fn encode(&self, buf: &mut impl BufMut) -> usize {
        let mut status = 0;
        self.encode_running_status(&mut status, buf)
    }

    /// Decode one message from the head of `buf` without a running-status
    /// context.
    pub fn decode(buf: &[u8]) -> Result<(MidiMessage, usize)> {
        let mut status = 0;
        Self::decode_running_status(buf, &mut status)
    }

    /// Encode with a running-status register (`0` = cleared).
    ///
    /// A channel-voice status equal to the register is elided; system-common
    /// statuses clear the register; real-time statuses pass through without
    /// touching it.
    pub fn encode_running_status(&self, status: &mut u8, buf: &mut impl BufMut) -> usize {
        let status_byte = self.status_byte();
        let own = self.status();

        if own.is_channel_voice() {
            let elide = *status == status_byte;
            if !elide {
                buf.put_u8(status_byte);
                *status = status_byte;
            }
            let data = self.put_channel_data(buf);
            data + if elide { 0 } else { 1 }
        } else if own.is_system_real_time() {
            buf.put_u8(status_byte);
            1
        } else {
            let written = match &self.kind {
                MessageKind::SystemExclusive { manufacturer, fragment, data } => {
                    if *fragment <= 1 {
                        buf.put_u8(0xF0);
                        match manufacturer {
                            ManufacturerId::Short(id) => buf.put_u8(id & 0x7F),
                            ManufacturerId::Extended(id) => {
                                buf.put_u8(0x00);
                                buf.put_u8(((id >> 8) & 0x7F) as u8);
                                buf.put_u8((id & 0x7F) as u8);
                            }
                        }
                        buf.put_slice(data);
                        data.len() + 1 + manufacturer.wire_len()
                    } else {
                        buf.put_slice(data);
                        data.len()
                    }
                }
                MessageKind::TimeCodeQuarterFrame { time_code_type, value } => {
                    buf.put_u8(0xF1);
                    buf.put_u8(((time_code_type & 0x07) << 4) | (value & 0x0F));
                    2
                }
                MessageKind::SongPositionPointer { value } => {
                    buf.put_u8(0xF2);
                    buf.put_u8((value & 0x7F) as u8);
                    buf.put_u8(((value >> 7) & 0x7F) as u8);
                    3
                }
                MessageKind::SongSelect { value } => {
                    buf.put_u8(0xF3);
                    buf.put_u8(value & 0x7F);
                    2
                }
                MessageKind::TuneRequest => {
                    buf.put_u8(0xF6);
                    1
                }
                MessageKind::EndOfExclusive => {
                    buf.put_u8(0xF7);
                    1
                }
                _ => unreachable!("system-common variants are exhaustive"),
            };
            *status = 0;
            written
        }
    }

    fn put_channel_data(&self, buf: &mut impl BufMut) -> usize {
        match &self.kind {
            MessageKind::NoteOff { key, velocity, .. } | MessageKind::NoteOn { key, velocity, .. } => {
                buf.put_u8(key & 0x7F);
                buf.put_u8(velocity & 0x7F);
                2
            }
            MessageKind::PolyphonicKeyPressure { key, pressure, .. } => {
                buf.put_u8(key & 0x7F);
                buf.put_u8(pressure & 0x7F);
                2
            }
            MessageKind::ControlChange { control, value, .. } => {
                buf.put_u8(control & 0x7F);
                buf.put_u8(value & 0x7F);
                2
            }
            MessageKind::ProgramChange { program, .. } => {
                buf.put_u8(program & 0x7F);
                1
            }
            MessageKind::ChannelPressure { pressure, .. } => {
                buf.put_u8(pressure & 0x7F);
                1
            }
            MessageKind::PitchWheelChange { value, .. } => {
                buf.put_u8((value & 0x7F) as u8);
                buf.put_u8(((value >> 7) & 0x7F) as u8);
                2
            }
            _ => unreachable!("channel-voice variants are exhaustive"),
        }
    }

    /// Decode with a running-status register (`0` = cleared).
    ///
    /// A leading data byte takes its status from the register; if the
    /// register is cleared the call fails with [`MidiError::NoRunningStatus`].
    pub fn decode_running_status(buf: &[u8], status: &mut u8) -> Result<(MidiMessage, usize)> {
        let &first = buf.first().ok_or(MidiError::ShortPacket)?;

        let (status_byte, data_at) = if first & 0x80 == 0 {
            if *status == 0 {
                return Err(MidiError::NoRunningStatus);
            }
            (*status, 0)
        } else {
            (first, 1)
        };

        let own = Status::from_byte(status_byte)?;
        let channel = status_byte & 0x0F;

        let need = |n: usize| {
            if buf.len() < data_at + n {
                Err(MidiError::ShortPacket)
            } else {
                Ok(())
            }
        };

        let (kind, data_len) = match own {
            Status::NoteOff => {
                need(2)?;
                (MessageKind::NoteOff { channel, key: buf[data_at], velocity: buf[data_at + 1] }, 2)
            }
            Status::NoteOn => {
                need(2)?;
                (MessageKind::NoteOn { channel, key: buf[data_at], velocity: buf[data_at + 1] }, 2)
            }
            Status::PolyphonicKeyPressure => {
                need(2)?;
                (
                    MessageKind::PolyphonicKeyPressure { channel, key: buf[data_at], pressure: buf[data_at + 1] },
                    2,
                )
            }
            Status::ControlChange => {
                need(2)?;
                (
                    MessageKind::ControlChange { channel, control: buf[data_at], value: buf[data_at + 1] },
                    2,
                )
            }
            Status::ProgramChange => {
                need(1)?;
                (MessageKind::ProgramChange { channel, program: buf[data_at] }, 1)
            }
            Status::ChannelPressure => {
                need(1)?;
                (MessageKind::ChannelPressure { channel, pressure: buf[data_at] }, 1)
            }
            Status::PitchWheelChange => {
                need(2)?;
                let value = u16::from(buf[data_at] & 0x7F) | (u16::from(buf[data_at + 1] & 0x7F) << 7);
                (MessageKind::PitchWheelChange { channel, value }, 2)
            }
            Status::SystemExclusive => return Self::decode_sysex(buf, status),
            Status::TimeCodeQuarterFrame => {
                need(1)?;
                let byte = buf[data_at];
                (
                    MessageKind::TimeCodeQuarterFrame { time_code_type: (byte >> 4) & 0x07, value: byte & 0x0F },
                    1,
                )
            }
            Status::SongPositionPointer => {
                need(2)?;
                let value = u16::from(buf[data_at] & 0x7F) | (u16::from(buf[data_at + 1] & 0x7F) << 7);
                (MessageKind::SongPositionPointer { value }, 2)
            }
            Status::SongSelect => {
                need(1)?;
                (MessageKind::SongSelect { value: buf[data_at] }, 1)
            }
            Status::TuneRequest => (MessageKind::TuneRequest, 0),
            Status::EndOfExclusive => (MessageKind::EndOfExclusive, 0),
            Status::TimingClock => (MessageKind::TimingClock, 0),
            Status::Start => (MessageKind::Start, 0),
            Status::Continue => (MessageKind::Continue, 0),
            Status::Stop => (MessageKind::Stop, 0),
            Status::ActiveSensing => (MessageKind::ActiveSensing, 0),
            Status::Reset => (MessageKind::Reset, 0),
        };

        if own.is_channel_voice() {
            *status = status_byte;
        } else if own.is_system_common() {
            *status = 0;
        }

        Ok((MidiMessage::new(kind), data_at + data_len))
    }

    /// Sysex bodies run until the next byte with the status bit; the
    /// terminating `0xF7` is left in the stream to decode as its own
    /// end-of-exclusive message.
    fn decode_sysex(buf: &[u8], status: &mut u8) -> Result<(MidiMessage, usize)> {
        if buf.len() < 2 {
            return Err(MidiError::ShortPacket);
        }
        let (manufacturer, body_at) = if buf[1] == 0 {
            if buf.len() < 4 {
                return Err(MidiError::ShortPacket);
            }
            let id = (u16::from(buf[2] & 0x7F) << 8) | u16::from(buf[3] & 0x7F);
            (ManufacturerId::Extended(id), 4)
        } else {
            (ManufacturerId::Short(buf[1] & 0x7F), 2)
        };
        let body_len = buf[body_at..].iter().take_while(|&&b| b & 0x80 == 0).count();
        let data = buf[body_at..body_at + body_len].to_vec();
        *status = 0;
        Ok((
            MidiMessage::new(MessageKind::SystemExclusive { manufacturer, fragment: 1, data }),
            body_at + body_len,
        ))
    }

    /// Read the field addressed by `property`.
    pub fn get(&self, property: Property) -> Result<PropertyValue> {
        use MessageKind::*;
        use PropertyValue::*;

        if property == Property::Status {
            return Ok(Byte(self.status_byte()));
        }
        match (&self.kind, property) {
            (
                NoteOff { channel, .. }
                | NoteOn { channel, .. }
                | PolyphonicKeyPressure { channel, .. }
                | ControlChange { channel, .. }
                | ProgramChange { channel, .. }
                | ChannelPressure { channel, .. }
                | PitchWheelChange { channel, .. },
                Property::Channel,
            ) => Ok(Byte(*channel)),
            (NoteOff { key, .. } | NoteOn { key, .. } | PolyphonicKeyPressure { key, .. }, Property::Key) => {
                Ok(Byte(*key))
            }
            (NoteOff { velocity, .. } | NoteOn { velocity, .. }, Property::Velocity) => Ok(Byte(*velocity)),
            (PolyphonicKeyPressure { pressure, .. } | ChannelPressure { pressure, .. }, Property::Pressure) => {
                Ok(Byte(*pressure))
            }
            (ControlChange { control, .. }, Property::Control) => Ok(Byte(*control)),
            (ControlChange { value, .. }, Property::Value) => Ok(Byte(*value)),
            (ProgramChange { program, .. }, Property::Program) => Ok(Byte(*program)),
            (PitchWheelChange { value, .. } | SongPositionPointer { value }, Property::Value) => Ok(Word(*value)),
            (PitchWheelChange { value, .. } | SongPositionPointer { value }, Property::ValueLsb) => {
                Ok(Byte((value & 0x7F) as u8))
            }
            (PitchWheelChange { value, .. } | SongPositionPointer { value }, Property::ValueMsb) => {
                Ok(Byte(((value >> 7) & 0x7F) as u8))
            }
            (SystemExclusive { manufacturer, .. }, Property::ManufacturerId) => Ok(Manufacturer(*manufacturer)),
            (SystemExclusive { data, .. }, Property::SysexData) => Ok(Data(data.clone())),
            (SystemExclusive { data, .. }, Property::SysexSize) => Ok(Size(data.len())),
            (SystemExclusive { fragment, .. }, Property::SysexFragment) => Ok(Byte(*fragment)),
            (TimeCodeQuarterFrame { time_code_type, .. }, Property::TimeCodeType) => Ok(Byte(*time_code_type)),
            (TimeCodeQuarterFrame { value, .. }, Property::Value) => Ok(Byte(*value)),
            (SongSelect { value }, Property::Value) => Ok(Byte(*value)),
            _ => Err(MidiError::BadProperty),
        }
    }

    /// Write the field addressed by `property`, validating its range.
    pub fn set(&mut self, property: Property, value: PropertyValue) -> Result<()> {
        use MessageKind::*;
        use PropertyValue::*;

        fn seven_bit(value: &PropertyValue) -> Result<u8> {
            match value {
                Byte(b) if *b <= 0x7F => Ok(*b),
                _ => Err(MidiError::BadProperty),
            }
        }
        fn fourteen_bit(value: &PropertyValue) -> Result<u16> {
            match value {
                Word(w) if *w <= 0x3FFF => Ok(*w),
                _ => Err(MidiError::BadProperty),
            }
        }

        if property == Property::Status {
            return self.set_status_byte(value);
        }

        match (&mut self.kind, property) {
            (
                NoteOff { channel, .. }
                | NoteOn { channel, .. }
                | PolyphonicKeyPressure { channel, .. }
                | ControlChange { channel, .. }
                | ProgramChange { channel, .. }
                | ChannelPressure { channel, .. }
                | PitchWheelChange { channel, .. },
                Property::Channel,
            ) => match value {
                Byte(b) if b <= 0x0F => {
                    *channel = b;
                    Ok(())
                }
                _ => Err(MidiError::BadProperty),
            },
            (NoteOff { key, .. } | NoteOn { key, .. } | PolyphonicKeyPressure { key, .. }, Property::Key) => {
                *key = seven_bit(&value)?;
                Ok(())
            }
            (NoteOff { velocity, .. } | NoteOn { velocity, .. }, Property::Velocity) => {
                *velocity = seven_bit(&value)?;
                Ok(())
            }
            (PolyphonicKeyPressure { pressure, .. } | ChannelPressure { pressure, .. }, Property::Pressure) => {
                *pressure = seven_bit(&value)?;
                Ok(())
            }
            (ControlChange { control, .. }, Property::Control) => {
                *control = seven_bit(&value)?;
                Ok(())
            }
            (ControlChange { value: field, .. }, Property::Value) => {
                *field = seven_bit(&value)?;
                Ok(())
            }
            (ProgramChange { program, .. }, Property::Program) => {
                *program = seven_bit(&value)?;
                Ok(())
            }
            (PitchWheelChange { value: field, .. } | SongPositionPointer { value: field }, Property::Value) => {
                *field = fourteen_bit(&value)?;
                Ok(())
            }
            (PitchWheelChange { value: field, .. } | SongPositionPointer { value: field }, Property::ValueLsb) => {
                let lsb = seven_bit(&value)?;
                *field = (*field & !0x7F) | u16::from(lsb);
                Ok(())
            }
            (PitchWheelChange { value: field, .. } | SongPositionPointer { value: field }, Property::ValueMsb) => {
                let msb = seven_bit(&value)?;
                *field = (*field & 0x7F) | (u16::from(msb) << 7);
                Ok(())
            }
            (SystemExclusive { manufacturer, .. }, Property::ManufacturerId) => match value {
                Manufacturer(id) => {
                    *manufacturer = id;
                    Ok(())
                }
                _ => Err(MidiError::BadProperty),
            },
            (SystemExclusive { data, .. }, Property::SysexData) => match value {
                Data(bytes) => {
                    *data = bytes;
                    Ok(())
                }
                _ => Err(MidiError::BadProperty),
            },
            (SystemExclusive { data, .. }, Property::SysexSize) => match value {
                Size(len) => {
                    data.resize(len, 0);
                    Ok(())
                }
                _ => Err(MidiError::BadProperty),
            },
            (SystemExclusive { fragment, .. }, Property::SysexFragment) => {
                *fragment = match value {
                    Byte(b) => b,
                    _ => return Err(MidiError::BadProperty),
                };
                Ok(())
            }
            (TimeCodeQuarterFrame { time_code_type, .. }, Property::TimeCodeType) => match value {
                Byte(b) if b <= 0x07 => {
                    *time_code_type = b;
                    Ok(())
                }
                _ => Err(MidiError::BadProperty),
            },
            (TimeCodeQuarterFrame { value: field, .. }, Property::Value) => match value {
                Byte(b) if b <= 0x0F => {
                    *field = b;
                    Ok(())
                }
                _ => Err(MidiError::BadProperty),
            },
            (SongSelect { value: field }, Property::Value) => {
                *field = seven_bit(&value)?;
                Ok(())
            }
            _ => Err(MidiError::BadProperty),
        }
    }

    /// The status is only re-pointable between the two note statuses, which
    /// share a shape; every other change would be a different variant.
    fn set_status_byte(&mut self, value: PropertyValue) -> Result<()> {
        let PropertyValue::Byte(byte) = value else {
            return Err(MidiError::BadProperty);
        };
        match self.kind {
            MessageKind::NoteOff { channel, key, velocity } => {
                if byte & 0xF0 == 0x90 {
                    self.kind = MessageKind::NoteOn { channel, key, velocity };
                    Ok(())
                } else if byte & 0xF0 == 0x80 {
                    Ok(())
                } else {
                    Err(MidiError::BadProperty)
                }
            }
            MessageKind::NoteOn { channel, key, velocity } => {
                if byte & 0xF0 == 0x80 {
                    self.kind = MessageKind::NoteOff { channel, key, velocity };
                    Ok(())
                } else if byte & 0xF0 == 0x90 {
                    Ok(())
                } else {
                    Err(MidiError::BadProperty)
                }
            }
            _ => {
                if byte == self.status_byte() {
                    Ok(())
                } else {
                    Err(MidiError::BadProperty)
                }
            }
        }
    }
}
