use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tracing::{trace, warn};

use super::header::RtpHeader;
use super::peer::{PeerTable, RtpPeer};
use crate::error::{MidiError, Result};

/// Minimum scratch space reserved for header and small payload assembly.
pub const RTP_SCRATCH_LEN: usize = 512;

/// Largest datagram the session will receive in one piece.
const RECV_BUFFER_LEN: usize = 65535;

/// Per-packet bookkeeping for one send or receive call.
#[derive(Debug)]
pub struct RtpPacketInfo {
    pub peer: Arc<RtpPeer>,
    /// Number of padding bytes trailing the payload (0 = no padding).
    pub padding: u8,
    /// When set on send, the first gather segment is a header extension.
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    /// Total bytes of the datagram as sent or received.
    pub total_size: usize,
    /// Receive side: whether this packet was the direct successor of the
    /// previous one for its peer.
    pub in_sequence: bool,
}

impl RtpPacketInfo {
    /// Info for an outgoing packet; sequence number and ssrc are filled in
    /// by [`RtpSession::send_packet`].
    pub fn outgoing(peer: Arc<RtpPeer>, payload_type: u8, timestamp: u32) -> Self {
        RtpPacketInfo {
            peer,
            padding: 0,
            extension: false,
            marker: false,
            payload_type,
            sequence_number: 0,
            timestamp,
            ssrc: 0,
            csrc: Vec::new(),
            total_size: 0,
            in_sequence: true,
        }
    }
}

/// One datagram as parsed off the wire: header fields plus the payload as
/// one slice (two when a header extension is present).
#[derive(Debug)]
pub struct ReceivedPacket {
    pub info: RtpPacketInfo,
    pub extension: Option<Bytes>,
    pub payload: Bytes,
}

/// An RTP endpoint on one socket, connected to up to sixteen peers.
///
/// The session owns its peers and a scratch buffer used to assemble the
/// current packet; gather segments are serialised into the scratch buffer
/// and shipped with a single datagram write.
pub struct RtpSession {
    socket: Arc<UdpSocket>,
    ssrc: u32,
    peers: Mutex<PeerTable>,
    scratch: Mutex<BytesMut>,
}

impl RtpSession {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        RtpSession {
            socket,
            ssrc: rand::random(),
            peers: Mutex::new(PeerTable::new()),
            scratch: Mutex::new(BytesMut::with_capacity(RECV_BUFFER_LEN.max(RTP_SCRATCH_LEN))),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    pub fn add_peer(&self, peer: Arc<RtpPeer>) -> Result<()> {
        self.peers.lock().unwrap().insert(peer)
    }

    pub fn remove_peer(&self, ssrc: u32) -> Result<Arc<RtpPeer>> {
        self.peers.lock().unwrap().remove(ssrc).ok_or(MidiError::PeerUnknown)
    }

    pub fn find_peer_by_ssrc(&self, ssrc: u32) -> Option<Arc<RtpPeer>> {
        self.peers.lock().unwrap().find_by_ssrc(ssrc)
    }

    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<Arc<RtpPeer>> {
        self.peers.lock().unwrap().find_by_addr(addr)
    }

    /// Snapshot of every peer in slot order.
    pub fn peers(&self) -> Vec<Arc<RtpPeer>> {
        self.peers.lock().unwrap().iter().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Assemble and send one packet to `info.peer`.
    ///
    /// The session stamps its own ssrc and the peer's next sequence number
    /// into `info`. When `info.extension` is set, `segments[0]` is treated
    /// as the header extension (profile + data) and padded to whole 32-bit
    /// words; remaining segments form the payload. On success the peer's
    /// outbound counters advance.
    pub fn send_packet(&self, info: &mut RtpPacketInfo, segments: &[&[u8]]) -> Result<()> {
        info.ssrc = self.ssrc;
        info.sequence_number = info.peer.out_seqnum().wrapping_add(1);

        let mut scratch = self.scratch.lock().unwrap();
        scratch.clear();

        let header = RtpHeader {
            padding: info.padding > 0,
            extension: info.extension,
            marker: info.marker,
            payload_type: info.payload_type,
            sequence_number: info.sequence_number,
            timestamp: info.timestamp,
            ssrc: info.ssrc,
            csrc: info.csrc.clone(),
        };
        header.write(&mut *scratch);

        let mut segments = segments;
        if info.extension {
            let extension = segments.first().ok_or(MidiError::ShortPacket)?;
            if extension.len() < 4 {
                return Err(MidiError::ShortPacket);
            }
            let data = &extension[4..];
            let words = data.len().div_ceil(4);
            scratch.put_slice(&extension[..2]);
            scratch.put_u16(words as u16);
            scratch.put_slice(data);
            scratch.put_bytes(0, words * 4 - data.len());
            segments = &segments[1..];
        }
        for segment in segments {
            scratch.put_slice(segment);
        }
        if info.padding > 0 {
            scratch.put_bytes(0, info.padding as usize - 1);
            scratch.put_u8(info.padding);
        }
        info.total_size = scratch.len();

        let sent = self.socket.try_send_to(&scratch, info.peer.addr())?;
        if sent != scratch.len() {
            return Err(MidiError::SendTruncated {
                sent,
                expected: scratch.len(),
            });
        }
        trace!(
            peer = info.peer.ssrc(),
            seqnum = info.sequence_number,
            bytes = info.total_size,
            "rtp: sent packet"
        );
        info.peer.record_sent(info.sequence_number, info.timestamp);
        Ok(())
    }

    /// Receive one datagram from the socket and parse it.
    pub fn receive_packet(&self) -> Result<ReceivedPacket> {
        let (datagram, source) = {
            let mut scratch = self.scratch.lock().unwrap();
            scratch.clear();
            scratch.resize(RECV_BUFFER_LEN, 0);
            let (len, source) = self.socket.try_recv_from(&mut scratch[..])?;
            (scratch.split_to(len).freeze(), source)
        };
        self.parse_packet(&datagram, source)
    }

    /// Parse a datagram that was already read from the socket.
    ///
    /// The sender is resolved through the peer table by ssrc; an unknown
    /// ssrc creates a peer from the source address. Inbound counters advance
    /// only for in-sequence packets.
    pub fn parse_packet(&self, datagram: &[u8], source: SocketAddr) -> Result<ReceivedPacket> {
        let (header, header_len) = RtpHeader::parse(datagram)?;

        let padding = if header.padding {
            *datagram.last().ok_or(MidiError::ShortPacket)?
        } else {
            0
        };

        let mut at = header_len;
        let extension = if header.extension {
            if datagram.len() < at + 4 {
                return Err(MidiError::ShortPacket);
            }
            let words = u16::from_be_bytes(datagram[at + 2..at + 4].try_into().unwrap()) as usize;
            let extension_len = 4 + words * 4;
            if datagram.len() < at + extension_len {
                return Err(MidiError::ShortPacket);
            }
            let extension = Bytes::copy_from_slice(&datagram[at..at + extension_len]);
            at += extension_len;
            Some(extension)
        } else {
            None
        };

        let payload_end = datagram
            .len()
            .checked_sub(padding as usize)
            .filter(|end| *end >= at)
            .ok_or(MidiError::ShortPacket)?;
        let payload = Bytes::copy_from_slice(&datagram[at..payload_end]);

        let peer = match self.find_peer_by_ssrc(header.ssrc) {
            Some(peer) => peer,
            None => {
                let peer = Arc::new(RtpPeer::new(header.ssrc, source));
                if let Err(e) = self.add_peer(Arc::clone(&peer)) {
                    // Keep handling the packet; the peer just isn't retained.
                    warn!(ssrc = header.ssrc, error = %e, "rtp: peer table full");
                }
                peer
            }
        };
        let in_sequence = peer.record_received(header.sequence_number, header.timestamp);

        Ok(ReceivedPacket {
            info: RtpPacketInfo {
                peer,
                padding,
                extension: header.extension,
                marker: header.marker,
                payload_type: header.payload_type,
                sequence_number: header.sequence_number,
                timestamp: header.timestamp,
                ssrc: header.ssrc,
                csrc: header.csrc,
                total_size: datagram.len(),
                in_sequence,
            },
            extension,
            payload,
        })
    }
}

impl std::fmt::Debug for RtpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtpSession")
            .field("ssrc", &self.ssrc)
            .field("peers", &self.peer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bound_pair() -> (RtpSession, RtpSession, SocketAddr, SocketAddr) {
        let a = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let b = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr_a = a.local_addr().unwrap();
        let addr_b = b.local_addr().unwrap();
        (RtpSession::new(a), RtpSession::new(b), addr_a, addr_b)
    }

    #[tokio::test]
    async fn test_send_and_parse_roundtrip() {
        let (sender, receiver, addr_a, addr_b) = bound_pair().await;
        let peer = Arc::new(RtpPeer::new(receiver.ssrc(), addr_b));
        sender.add_peer(Arc::clone(&peer)).unwrap();

        let mut info = RtpPacketInfo::outgoing(Arc::clone(&peer), 97, 1234);
        sender.send_packet(&mut info, &[b"hello", b" world"]).unwrap();
        assert_eq!(info.sequence_number, 1);
        assert_eq!(peer.out_seqnum(), 1);

        // Wait for delivery, then read without blocking.
        receiver.socket().readable().await.unwrap();
        let packet = receiver.receive_packet().unwrap();
        assert_eq!(packet.info.payload_type, 97);
        assert_eq!(packet.info.timestamp, 1234);
        assert_eq!(packet.info.ssrc, sender.ssrc());
        assert_eq!(&packet.payload[..], b"hello world");
        assert!(packet.info.in_sequence);

        // The unknown sender was added as a peer with its source address.
        let learned = receiver.find_peer_by_ssrc(sender.ssrc()).unwrap();
        assert_eq!(learned.addr(), addr_a);
        assert_eq!(learned.in_seqnum(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_does_not_advance_counter() {
        let (sender, receiver, _, addr_b) = bound_pair().await;
        let peer = Arc::new(RtpPeer::new(0xAABB, addr_b));
        sender.add_peer(Arc::clone(&peer)).unwrap();

        // Pretend two packets were already sent so the next seqnum is 3.
        peer.record_sent(2, 0);
        let mut info = RtpPacketInfo::outgoing(Arc::clone(&peer), 97, 0);
        sender.send_packet(&mut info, &[b"x"]).unwrap();
        assert_eq!(info.sequence_number, 3);

        receiver.socket().readable().await.unwrap();
        let packet = receiver.receive_packet().unwrap();
        assert!(!packet.info.in_sequence);
        assert_eq!(packet.info.peer.in_seqnum(), 0);
    }

    #[tokio::test]
    async fn test_extension_and_padding_roundtrip() {
        let (sender, receiver, _, addr_b) = bound_pair().await;
        let peer = Arc::new(RtpPeer::new(7, addr_b));
        sender.add_peer(Arc::clone(&peer)).unwrap();

        let mut info = RtpPacketInfo::outgoing(Arc::clone(&peer), 97, 0);
        info.extension = true;
        info.padding = 4;
        // Profile 0xAB00, three data bytes padded up to one word.
        let extension = [0xAB, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03];
        sender.send_packet(&mut info, &[&extension, b"payload"]).unwrap();

        receiver.socket().readable().await.unwrap();
        let packet = receiver.receive_packet().unwrap();
        let extension = packet.extension.unwrap();
        assert_eq!(&extension[..], &[0xAB, 0x00, 0x00, 0x01, 0x01, 0x02, 0x03, 0x00]);
        assert_eq!(&packet.payload[..], b"payload");
        assert_eq!(packet.info.padding, 4);
    }
}
