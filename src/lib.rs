//! A network MIDI endpoint: RTP-MIDI transport with AppleMIDI session
//! management, built on the `tokio` async runtime.
//!
//! The crate is the protocol engine only. It models MIDI messages with a
//! byte-exact codec (running status, sysex fragmentation, variable-length
//! deltas), speaks RTP with a fixed-capacity peer table, codes MIDI command
//! lists into RTP payloads, and drives the AppleMIDI invitation handshake
//! and three-way clock synchronisation across two adjacent UDP ports.
//! Decoded messages and session events flow to subscribers through a small
//! message-routing port graph; a cooperative runloop multiplexes socket
//! readiness and per-source timers behind a single await.
//!
//! # Quick start
//!
//! ```no_run
//! use netmidi::message::{MessageKind, MidiMessage};
//! use netmidi::port::{MidiPort, PortMode, PortPayload};
//! use netmidi::runloop::RunLoop;
//! use netmidi::sessions::AppleMidiDriver;
//!
//! # async fn run() -> Result<(), netmidi::error::MidiError> {
//! let driver = AppleMidiDriver::bind("My MIDI Session", 5004).await?;
//! driver.accept_from_any();
//!
//! let sink = MidiPort::new("log", PortMode::IN, |_, payload| {
//!     if let PortPayload::Messages(messages) = payload {
//!         println!("{messages:?}");
//!     }
//! });
//! driver.delivery_port().connect(&sink);
//!
//! driver.add_peer("127.0.0.1", 5006).await?;
//! driver.send_message(MidiMessage::new(MessageKind::NoteOn {
//!     channel: 0,
//!     key: 60,
//!     velocity: 100,
//! }));
//!
//! let mut runloop = RunLoop::new();
//! runloop.add_source(driver.source())?;
//! runloop.run().await
//! # }
//! ```
//!
//! The recovery journal is carried as bookkeeping only: checkpoints are
//! stored and truncated on receiver feedback, but chapter encodings are not
//! produced, so lost packets are not reconstructed.

pub mod clock;
pub mod error;
pub mod message;
pub mod packets;
pub mod port;
pub mod runloop;
pub mod sessions;

pub use clock::{MidiClock, Timestamp};
pub use error::MidiError;
pub use message::{MessageKind, MidiMessage, Status};
pub use sessions::{AppleMidiDriver, DriverEvent};
