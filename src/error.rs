use thiserror::Error;

/// Crate-wide result type.
pub type Result<T, E = MidiError> = std::result::Result<T, E>;

/// Every failure the protocol engine can report.
///
/// Codec errors are local: the enclosing session logs, drops the offending
/// packet and keeps going. Session-state errors abort the current handshake
/// but leave other peers intact. I/O errors other than `WouldBlock` leave the
/// driver usable but are surfaced to the caller.
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("reserved or invalid status byte {0:#04x}")]
    BadStatus(u8),
    #[error("property does not apply to this message or value is out of range")]
    BadProperty,
    #[error("variable-length quantity continues past four bytes")]
    MalformedVarLen,
    #[error("malformed MIDI command list: {0}")]
    MalformedCommandList(&'static str),
    #[error("unsupported RTP version (first byte {0:#04x})")]
    BadRtpVersion(u8),
    #[error("packet too short")]
    ShortPacket,
    #[error("data byte without a running status")]
    NoRunningStatus,
    #[error("malformed session command")]
    BadSessionCommand,

    #[error("peer table is full")]
    TooManyPeers,
    #[error("message queue is full")]
    QueueFull,
    #[error("runloop source table is full")]
    TooManySources,

    #[error("socket error")]
    Io(#[from] std::io::Error),
    #[error("failed to bind UDP port {port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("datagram truncated: sent {sent} of {expected} bytes")]
    SendTruncated { sent: usize, expected: usize },
    #[error("unsupported address family")]
    AddressFamilyUnsupported,
    #[error("could not resolve host {0:?}")]
    NameResolutionFailed(String),

    #[error("session is not connected")]
    NotConnected,
    #[error("no such peer")]
    PeerUnknown,
    #[error("invitation token mismatch")]
    TokenMismatch,
    #[error("peer rejected the invitation")]
    InvitationRejected,
}

impl MidiError {
    /// Stable numeric code for log lines and foreign-interface reporting.
    pub fn code(&self) -> u32 {
        match self {
            MidiError::BadStatus(_) => 1,
            MidiError::BadProperty => 2,
            MidiError::MalformedVarLen => 3,
            MidiError::MalformedCommandList(_) => 4,
            MidiError::BadRtpVersion(_) => 5,
            MidiError::ShortPacket => 6,
            MidiError::NoRunningStatus => 7,
            MidiError::BadSessionCommand => 8,
            MidiError::TooManyPeers => 20,
            MidiError::QueueFull => 21,
            MidiError::TooManySources => 22,
            MidiError::Io(_) => 40,
            MidiError::Bind { .. } => 41,
            MidiError::SendTruncated { .. } => 42,
            MidiError::AddressFamilyUnsupported => 43,
            MidiError::NameResolutionFailed(_) => 44,
            MidiError::NotConnected => 60,
            MidiError::PeerUnknown => 61,
            MidiError::TokenMismatch => 62,
            MidiError::InvitationRejected => 80,
        }
    }
}
