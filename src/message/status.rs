use crate::error::{MidiError, Result};

/// The closed family of MIDI statuses.
///
/// Channel-voice statuses occupy the high nibble of the status byte with the
/// channel in the low nibble; system statuses use the full byte. The
/// reserved bytes `0xF4`, `0xF5`, `0xF9` and `0xFD` are not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    NoteOff,
    NoteOn,
    PolyphonicKeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchWheelChange,
    SystemExclusive,
    TimeCodeQuarterFrame,
    SongPositionPointer,
    SongSelect,
    TuneRequest,
    EndOfExclusive,
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    Reset,
}

impl Status {
    /// Classify a wire status byte. Data bytes and the reserved system
    /// statuses are rejected with [`MidiError::BadStatus`].
    pub fn from_byte(byte: u8) -> Result<Status> {
        match byte {
            0x80..=0x8F => Ok(Status::NoteOff),
            0x90..=0x9F => Ok(Status::NoteOn),
            0xA0..=0xAF => Ok(Status::PolyphonicKeyPressure),
            0xB0..=0xBF => Ok(Status::ControlChange),
            0xC0..=0xCF => Ok(Status::ProgramChange),
            0xD0..=0xDF => Ok(Status::ChannelPressure),
            0xE0..=0xEF => Ok(Status::PitchWheelChange),
            0xF0 => Ok(Status::SystemExclusive),
            0xF1 => Ok(Status::TimeCodeQuarterFrame),
            0xF2 => Ok(Status::SongPositionPointer),
            0xF3 => Ok(Status::SongSelect),
            0xF6 => Ok(Status::TuneRequest),
            0xF7 => Ok(Status::EndOfExclusive),
            0xF8 => Ok(Status::TimingClock),
            0xFA => Ok(Status::Start),
            0xFB => Ok(Status::Continue),
            0xFC => Ok(Status::Stop),
            0xFE => Ok(Status::ActiveSensing),
            0xFF => Ok(Status::Reset),
            _ => Err(MidiError::BadStatus(byte)),
        }
    }

    /// The status byte with a zero channel nibble for channel-voice
    /// statuses, or the full byte for system statuses.
    pub fn byte(&self) -> u8 {
        match self {
            Status::NoteOff => 0x80,
            Status::NoteOn => 0x90,
            Status::PolyphonicKeyPressure => 0xA0,
            Status::ControlChange => 0xB0,
            Status::ProgramChange => 0xC0,
            Status::ChannelPressure => 0xD0,
            Status::PitchWheelChange => 0xE0,
            Status::SystemExclusive => 0xF0,
            Status::TimeCodeQuarterFrame => 0xF1,
            Status::SongPositionPointer => 0xF2,
            Status::SongSelect => 0xF3,
            Status::TuneRequest => 0xF6,
            Status::EndOfExclusive => 0xF7,
            Status::TimingClock => 0xF8,
            Status::Start => 0xFA,
            Status::Continue => 0xFB,
            Status::Stop => 0xFC,
            Status::ActiveSensing => 0xFE,
            Status::Reset => 0xFF,
        }
    }

    pub fn is_channel_voice(&self) -> bool {
        self.byte() < 0xF0
    }

    pub fn is_system_common(&self) -> bool {
        (0xF0..=0xF7).contains(&self.byte())
    }

    pub fn is_system_real_time(&self) -> bool {
        self.byte() >= 0xF8
    }
}
