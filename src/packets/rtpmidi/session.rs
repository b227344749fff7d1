use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use super::command_list;
use super::header::RtpMidiHeader;
use super::journal::PeerJournal;
use crate::clock::Timestamp;
use crate::error::Result;
use crate::message::MidiMessage;
use crate::packets::rtp::{RtpPacketInfo, RtpPeer, RtpSession};

/// RTP payload type carrying RTP-MIDI.
pub const RTP_MIDI_PAYLOAD_TYPE: u8 = 97;

/// Messages coded into a single packet at most.
pub const MAX_MESSAGES_PER_PACKET: usize = 16;

/// One received packet's worth of MIDI.
#[derive(Debug)]
pub struct ReceivedMidi {
    pub messages: Vec<MidiMessage>,
    pub peer: Arc<RtpPeer>,
    pub sequence_number: u16,
    /// False when a sequence-number gap was observed for the peer.
    pub in_sequence: bool,
}

/// The RTP-MIDI payload layer on top of an [`RtpSession`].
///
/// Sending fans one command list out to every peer; receiving decodes a
/// command list and consults the peer's journal when a gap is detected.
/// Per-peer journal state lives here, keyed by ssrc.
pub struct RtpMidiSession {
    rtp: Arc<RtpSession>,
    journals: Mutex<HashMap<u32, PeerJournal>>,
}

impl RtpMidiSession {
    pub fn new(rtp: Arc<RtpSession>) -> Self {
        RtpMidiSession {
            rtp,
            journals: Mutex::new(HashMap::new()),
        }
    }

    pub fn rtp(&self) -> &Arc<RtpSession> {
        &self.rtp
    }

    /// Encode `messages` once and send the packet to every peer.
    ///
    /// The first message's timestamp becomes the RTP timestamp. A peer whose
    /// send fails is logged and skipped; its journal is not updated for the
    /// dropped packet.
    pub fn send(&self, messages: &[MidiMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let timestamp = messages[0].timestamp();

        let mut list = BytesMut::new();
        let (zero, length) = command_list::encode(messages, timestamp, &mut list);
        let header = RtpMidiHeader {
            journal: false,
            zero,
            phantom: false,
            length,
        };
        let mut header_bytes = BytesMut::new();
        header.write(&mut header_bytes)?;

        for peer in self.rtp.peers() {
            let mut info = RtpPacketInfo::outgoing(Arc::clone(&peer), RTP_MIDI_PAYLOAD_TYPE, timestamp as u32);
            match self.rtp.send_packet(&mut info, &[&header_bytes, &list]) {
                Ok(()) => {
                    self.journal_store(&peer, info.sequence_number, messages);
                    trace!(
                        peer = peer.ssrc(),
                        seqnum = info.sequence_number,
                        messages = messages.len(),
                        "rtpmidi: sent command list"
                    );
                }
                Err(e) => {
                    warn!(peer = peer.ssrc(), code = e.code(), "rtpmidi: send failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// Receive one packet from the session socket.
    pub fn receive(&self) -> Result<ReceivedMidi> {
        let packet = self.rtp.receive_packet()?;
        self.decode_packet(packet)
    }

    /// Decode a datagram that was already read from a socket.
    pub fn receive_datagram(&self, datagram: &[u8], source: SocketAddr) -> Result<ReceivedMidi> {
        let packet = self.rtp.parse_packet(datagram, source)?;
        self.decode_packet(packet)
    }

    fn decode_packet(&self, packet: crate::packets::rtp::ReceivedPacket) -> Result<ReceivedMidi> {
        let (header, consumed) = RtpMidiHeader::parse(&packet.payload)?;
        let base = packet.info.timestamp as Timestamp;
        let mut messages = command_list::decode(&packet.payload[consumed..], header.length, header.zero, base)?;

        if !packet.info.in_sequence && header.journal {
            let mut recovered = self.journal_recover(&packet.info.peer, packet.info.sequence_number);
            if !recovered.is_empty() {
                debug!(
                    peer = packet.info.peer.ssrc(),
                    recovered = recovered.len(),
                    "rtpmidi: recovered messages from journal"
                );
                recovered.append(&mut messages);
                messages = recovered;
            }
        }

        Ok(ReceivedMidi {
            messages,
            peer: Arc::clone(&packet.info.peer),
            sequence_number: packet.info.sequence_number,
            in_sequence: packet.info.in_sequence,
        })
    }

    /// Checkpoint `messages` in the peer's send journal under `seqnum`.
    pub fn journal_store(&self, peer: &Arc<RtpPeer>, seqnum: u16, messages: &[MidiMessage]) {
        let mut journals = self.journals.lock().unwrap();
        journals.entry(peer.ssrc()).or_default().send.store(seqnum, messages);
    }

    /// Messages restoring state lost before `seqnum`, per the journal
    /// contract. Chapter decoding is reserved, so this may well be empty.
    pub fn journal_recover(&self, peer: &Arc<RtpPeer>, seqnum: u16) -> Vec<MidiMessage> {
        let journals = self.journals.lock().unwrap();
        journals
            .get(&peer.ssrc())
            .map(|journal| journal.receive.recover(seqnum))
            .unwrap_or_default()
    }

    /// Drop journal entries acknowledged up to `up_to` for the peer.
    pub fn journal_truncate(&self, ssrc: u32, up_to: u16) {
        let mut journals = self.journals.lock().unwrap();
        if let Some(journal) = journals.get_mut(&ssrc) {
            journal.send.truncate(up_to);
        }
    }

    /// Entries currently held in the peer's send journal.
    pub fn journal_len(&self, ssrc: u32) -> usize {
        self.journals.lock().unwrap().get(&ssrc).map_or(0, |j| j.send.len())
    }

    /// Forget all journal state for a departed peer.
    pub fn forget_peer(&self, ssrc: u32) {
        self.journals.lock().unwrap().remove(&ssrc);
    }
}

impl std::fmt::Debug for RtpMidiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpMidiSession").field("rtp", &self.rtp).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use tokio::net::UdpSocket;

    async fn session_pair() -> (RtpMidiSession, RtpMidiSession, SocketAddr) {
        let a = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let b = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr_b = b.local_addr().unwrap();
        (
            RtpMidiSession::new(Arc::new(RtpSession::new(a))),
            RtpMidiSession::new(Arc::new(RtpSession::new(b))),
            addr_b,
        )
    }

    fn batch(timestamp: Timestamp) -> Vec<MidiMessage> {
        vec![
            MidiMessage::with_timestamp(MessageKind::NoteOn { channel: 0, key: 66, velocity: 104 }, timestamp),
            MidiMessage::with_timestamp(MessageKind::PolyphonicKeyPressure { channel: 0, key: 66, pressure: 120 }, timestamp),
            MidiMessage::with_timestamp(MessageKind::NoteOff { channel: 0, key: 66, velocity: 104 }, timestamp),
        ]
    }

    #[tokio::test]
    async fn test_send_delivers_to_peer() {
        let (sender, receiver, addr_b) = session_pair().await;
        let peer = Arc::new(RtpPeer::new(0x1234, addr_b));
        sender.rtp().add_peer(Arc::clone(&peer)).unwrap();

        sender.send(&batch(1000)).unwrap();

        receiver.rtp().socket().readable().await.unwrap();
        let received = receiver.receive().unwrap();
        assert_eq!(received.messages.len(), 3);
        assert_eq!(
            received.messages[0].kind(),
            &MessageKind::NoteOn { channel: 0, key: 66, velocity: 104 }
        );
        // All three share the packet timestamp.
        assert_eq!(received.messages[0].timestamp(), 1000);
        assert_eq!(received.messages[2].timestamp(), 1000);
        assert!(received.in_sequence);

        // The send journalled the batch under the issued sequence number.
        assert_eq!(sender.journal_len(peer.ssrc()), 1);
    }

    #[tokio::test]
    async fn test_journal_truncate_after_feedback() {
        let (sender, _, addr_b) = session_pair().await;
        let peer = Arc::new(RtpPeer::new(0x1234, addr_b));
        sender.rtp().add_peer(Arc::clone(&peer)).unwrap();

        for _ in 0..3 {
            sender.send(&batch(0)).unwrap();
        }
        assert_eq!(sender.journal_len(peer.ssrc()), 3);
        sender.journal_truncate(peer.ssrc(), 2);
        assert_eq!(sender.journal_len(peer.ssrc()), 1);
        sender.forget_peer(peer.ssrc());
        assert_eq!(sender.journal_len(peer.ssrc()), 0);
    }
}
