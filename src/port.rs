//! Message routing between components.
//!
//! Ports form a directed graph: a producer `send`s a payload, every
//! connected port receives it, and ports in thru mode forward it onward.
//! Connections hold strong references; cycles are broken by invalidating a
//! port, which stops delivery immediately and lets the next traversal prune
//! it from peers' connection lists.

use std::ops::BitOr;
use std::sync::{Arc, Mutex};

use crate::message::MidiMessage;
use crate::sessions::DriverEvent;

/// Port mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMode(u8);

impl PortMode {
    pub const IN: PortMode = PortMode(0x01);
    pub const OUT: PortMode = PortMode(0x02);
    pub const THRU: PortMode = PortMode(0x04);
    pub const INVALID: PortMode = PortMode(0x08);

    pub fn contains(&self, other: PortMode) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for PortMode {
    type Output = PortMode;
    fn bitor(self, rhs: PortMode) -> PortMode {
        PortMode(self.0 | rhs.0)
    }
}

/// The payload kinds that travel between ports.
#[derive(Debug, Clone)]
pub enum PortPayload {
    Message(MidiMessage),
    Messages(Vec<MidiMessage>),
    Event(DriverEvent),
}

/// Callback invoked with the sending port's name and the payload.
pub type ReceiveFn = dyn Fn(&str, &PortPayload) + Send + Sync;

/// Observer invoked before a port's own receive callback.
pub type InterceptFn = dyn Fn(&str, PortMode, &PortPayload) + Send + Sync;

struct PortInner {
    name: String,
    mode: PortMode,
    receive: Option<Arc<ReceiveFn>>,
    observer: Option<Arc<InterceptFn>>,
    ports: Vec<MidiPort>,
}

/// A node in the routing graph. Cloning yields another handle to the same
/// port.
#[derive(Clone)]
pub struct MidiPort {
    inner: Arc<Mutex<PortInner>>,
}

impl MidiPort {
    pub fn new<F>(name: &str, mode: PortMode, receive: F) -> MidiPort
    where
        F: Fn(&str, &PortPayload) + Send + Sync + 'static,
    {
        MidiPort {
            inner: Arc::new(Mutex::new(PortInner {
                name: name.to_string(),
                mode,
                receive: Some(Arc::new(receive)),
                observer: None,
                ports: Vec::new(),
            })),
        }
    }

    /// A port that only fans out to its connections (no local receiver).
    pub fn output(name: &str) -> MidiPort {
        MidiPort {
            inner: Arc::new(Mutex::new(PortInner {
                name: name.to_string(),
                mode: PortMode::OUT,
                receive: None,
                observer: None,
                ports: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    pub fn mode(&self) -> PortMode {
        self.inner.lock().unwrap().mode
    }

    pub fn is_invalid(&self) -> bool {
        self.mode().contains(PortMode::INVALID)
    }

    pub fn same_port(&self, other: &MidiPort) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Append `target` to this port's connection list.
    pub fn connect(&self, target: &MidiPort) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.ports.iter().any(|p| p.same_port(target)) {
            inner.ports.push(target.clone());
        }
    }

    pub fn disconnect(&self, target: &MidiPort) {
        let mut inner = self.inner.lock().unwrap();
        inner.ports.retain(|p| !p.same_port(target));
    }

    pub fn disconnect_all(&self) {
        self.inner.lock().unwrap().ports.clear();
    }

    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(&str, PortMode, &PortPayload) + Send + Sync + 'static,
    {
        self.inner.lock().unwrap().observer = Some(Arc::new(observer));
    }

    pub fn clear_observer(&self) {
        self.inner.lock().unwrap().observer = None;
    }

    /// Mark the port invalid. It never again invokes its target and is
    /// pruned from peers' connection lists on their next traversal.
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.mode = inner.mode | PortMode::INVALID;
        inner.receive = None;
        inner.observer = None;
        inner.ports.clear();
    }

    /// Deliver `payload` to every connected valid port, pruning invalid
    /// connections along the way.
    pub fn send(&self, payload: &PortPayload) {
        let (name, targets) = {
            let mut inner = self.inner.lock().unwrap();
            inner.ports.retain(|p| !p.is_invalid());
            (inner.name.clone(), inner.ports.clone())
        };
        for target in targets {
            target.receive_from(&name, payload);
        }
    }

    /// Receive `payload` sent by `source`. Invalid ports ignore it; thru
    /// ports forward it to their own connections afterwards.
    pub fn receive_from(&self, source: &str, payload: &PortPayload) {
        let (mode, receive, observer, thru_targets) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.mode.contains(PortMode::INVALID) {
                return;
            }
            let thru = if inner.mode.contains(PortMode::THRU) {
                inner.ports.retain(|p| !p.is_invalid());
                inner.ports.clone()
            } else {
                Vec::new()
            };
            (inner.mode, inner.receive.clone(), inner.observer.clone(), thru)
        };

        if let Some(observer) = observer {
            observer(source, mode, payload);
        }
        if let Some(receive) = receive {
            receive(source, payload);
        }
        for target in thru_targets {
            target.receive_from(source, payload);
        }
    }
}

impl std::fmt::Debug for MidiPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("MidiPort")
            .field("name", &inner.name)
            .field("mode", &inner.mode)
            .field("connections", &inner.ports.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn note() -> PortPayload {
        PortPayload::Message(MidiMessage::new(MessageKind::NoteOn { channel: 0, key: 60, velocity: 100 }))
    }

    #[test]
    fn test_send_reaches_connected_port() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        let source = MidiPort::output("source");
        let sink = MidiPort::new("sink", PortMode::IN, move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        source.connect(&sink);
        source.send(&note());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thru_forwards() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        let source = MidiPort::output("source");
        let thru = MidiPort::new("thru", PortMode::IN | PortMode::THRU, |_, _| {});
        let sink = MidiPort::new("sink", PortMode::IN, move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        source.connect(&thru);
        thru.connect(&sink);
        source.send(&note());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidated_port_stops_receiving_and_is_pruned() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        let source = MidiPort::output("source");
        let sink = MidiPort::new("sink", PortMode::IN, move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        source.connect(&sink);
        sink.invalidate();
        source.send(&note());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // The traversal pruned the invalid connection.
        assert_eq!(source.inner.lock().unwrap().ports.len(), 0);
    }

    #[test]
    fn test_observer_sees_payload_first() {
        let seen = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&seen);
        let source = MidiPort::output("source");
        let sink = MidiPort::new("sink", PortMode::IN, |_, _| {});
        sink.set_observer(move |_, _, _| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        source.connect(&sink);
        source.send(&note());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_is_idempotent() {
        let source = MidiPort::output("source");
        let sink = MidiPort::new("sink", PortMode::IN, |_, _| {});
        source.connect(&sink);
        source.connect(&sink);
        assert_eq!(source.inner.lock().unwrap().ports.len(), 1);
        source.disconnect(&sink);
        assert_eq!(source.inner.lock().unwrap().ports.len(), 0);
    }
}
