use std::collections::BTreeMap;

use crate::message::MidiMessage;

/// Checkpoints retained per direction before the oldest are dropped.
const JOURNAL_CAPACITY: usize = 64;

/// A checkpointed replay log for one direction of one peer.
///
/// Every successfully sent packet stores its messages under the issued
/// sequence number; receiver feedback truncates everything the peer has
/// acknowledged. The chapter encodings of RFC 4695 are not implemented:
/// [`recover`](RecoveryJournal::recover) reserves the contract but returns
/// nothing, and consumers must not assume recovery is lossless.
#[derive(Debug, Default)]
pub struct RecoveryJournal {
    checkpoint: Option<u16>,
    entries: BTreeMap<u16, Vec<MidiMessage>>,
}

impl RecoveryJournal {
    pub fn new() -> Self {
        RecoveryJournal::default()
    }

    /// Sequence number of the newest stored checkpoint.
    pub fn checkpoint(&self) -> Option<u16> {
        self.checkpoint
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store the messages of the packet sent as `seqnum`.
    pub fn store(&mut self, seqnum: u16, messages: &[MidiMessage]) {
        self.entries.insert(seqnum, messages.to_vec());
        self.checkpoint = Some(seqnum);
        while self.entries.len() > JOURNAL_CAPACITY {
            self.entries.pop_first();
        }
    }

    /// Drop every entry with a sequence number at or below `up_to`.
    pub fn truncate(&mut self, up_to: u16) {
        self.entries.retain(|&seqnum, _| seqnum > up_to);
        if self.entries.is_empty() {
            self.checkpoint = None;
        }
    }

    /// Messages needed to restore state lost with packet `seqnum`.
    ///
    /// Chapter decoding is reserved; no messages are recovered.
    pub fn recover(&self, _seqnum: u16) -> Vec<MidiMessage> {
        Vec::new()
    }
}

/// Both journal directions for one peer.
#[derive(Debug, Default)]
pub struct PeerJournal {
    pub send: RecoveryJournal,
    pub receive: RecoveryJournal,
}
