//! The MIDI message model: the closed status family, property-addressable
//! messages, the byte-exact wire codec with running status, variable-length
//! quantities and the bounded message queue.

mod midi_message;
mod property;
mod queue;
mod status;
pub mod varlen;

pub use midi_message::{ManufacturerId, MessageKind, MidiMessage};
pub use property::{Property, PropertyValue};
pub use queue::{DEFAULT_QUEUE_CAPACITY, MessageQueue};
pub use status::Status;
