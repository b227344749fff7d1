use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, info, instrument, trace, warn};

use super::DriverEvent;
use super::command::SessionCommand;
use crate::clock::MidiClock;
use crate::error::{MidiError, Result};
use crate::message::MidiMessage;
use crate::packets::rtp::{RtpPeer, RtpSession};
use crate::packets::rtpmidi::{MAX_MESSAGES_PER_PACKET, RtpMidiSession};
use crate::port::{MidiPort, PortPayload};
use crate::runloop::Source;

/// Longest advertised session name.
pub const MAX_SESSION_NAME_LEN: usize = 31;

/// Period of the driver's idle timer.
const IDLE_PERIOD: Duration = Duration::from_secs(1);

/// Peers we invited that go this long without a completed clock sync are
/// reaped.
const STALE_PEER_TIMEOUT: Duration = Duration::from_secs(30);

/// An unanswered sync exchange is abandoned after this long.
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_BUFFER_LEN: usize = 65535;

/// Who may establish a session with us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptPolicy {
    /// Reject every invitation.
    None,
    /// Accept every invitation.
    Any,
    /// Accept only invitations from this control address.
    Peer(SocketAddr),
}

#[derive(Debug, Clone)]
struct PeerMeta {
    invited_by_us: bool,
    last_sync: Instant,
    clock_offset: i64,
    clock_delay: u64,
}

impl PeerMeta {
    fn new(invited_by_us: bool) -> Self {
        PeerMeta {
            invited_by_us,
            last_sync: Instant::now(),
            clock_offset: 0,
            clock_delay: 0,
        }
    }
}

/// A network MIDI endpoint speaking the AppleMIDI session protocol.
///
/// The driver owns two adjacent UDP ports: session commands arrive on the
/// control port, RTP-MIDI and media-channel commands (sync, feedback) on
/// the next one. Outgoing messages are queued and drained in batches of up
/// to sixteen per packet when the RTP socket is writable; incoming messages
/// and session events are published through the driver's delivery port.
pub struct AppleMidiDriver {
    name: String,
    port: AtomicU16,
    token: u32,
    control_socket: Arc<UdpSocket>,
    rtp_socket: Arc<UdpSocket>,
    rtp: Arc<RtpSession>,
    rtpmidi: RtpMidiSession,
    accept: Mutex<AcceptPolicy>,
    /// In-flight sync counter; zero means the driver may start a new
    /// exchange.
    sync: AtomicU8,
    sync_started: Mutex<Option<Instant>>,
    sync_cursor: AtomicUsize,
    out_queue: Mutex<VecDeque<MidiMessage>>,
    peer_meta: Mutex<HashMap<u32, PeerMeta>>,
    delivery: MidiPort,
    recv_buf: Mutex<Vec<u8>>,
}

fn control_addr_of(rtp_addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(rtp_addr.ip(), rtp_addr.port().wrapping_sub(1))
}

fn rtp_addr_of(control_addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(control_addr.ip(), control_addr.port().wrapping_add(1))
}

impl AppleMidiDriver {
    /// Bind the control and RTP sockets on `port` and `port + 1`.
    pub async fn bind(name: &str, port: u16) -> Result<Arc<AppleMidiDriver>> {
        let control_socket = Arc::new(
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
                .await
                .map_err(|source| MidiError::Bind { port, source })?,
        );
        let port = control_socket.local_addr()?.port();
        let rtp_socket = Arc::new(
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port + 1))
                .await
                .map_err(|source| MidiError::Bind { port: port + 1, source })?,
        );

        let mut end = name.len().min(MAX_SESSION_NAME_LEN);
        while end > 0 && !name.is_char_boundary(end) {
            end -= 1;
        }
        let name = name[..end].to_string();

        let rtp = Arc::new(RtpSession::new(Arc::clone(&rtp_socket)));
        let rtpmidi = RtpMidiSession::new(Arc::clone(&rtp));
        let token = match MidiClock::global().now() as u32 {
            0 => rand::random(),
            now => now,
        };
        let delivery = MidiPort::output(&format!("{name}.out"));

        info!(name, port, ssrc = rtp.ssrc(), "driver: listening");
        Ok(Arc::new(AppleMidiDriver {
            name,
            port: AtomicU16::new(port),
            token,
            control_socket,
            rtp_socket,
            rtp,
            rtpmidi,
            accept: Mutex::new(AcceptPolicy::None),
            sync: AtomicU8::new(0),
            sync_started: Mutex::new(None),
            sync_cursor: AtomicUsize::new(0),
            out_queue: Mutex::new(VecDeque::new()),
            peer_meta: Mutex::new(HashMap::new()),
            delivery,
            recv_buf: Mutex::new(vec![0; RECV_BUFFER_LEN]),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The control port; the RTP port is one above.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Relaxed)
    }

    /// Change the stored base port. The live sockets keep the ports they
    /// were bound with; the new value applies when a driver is next bound.
    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Relaxed);
    }

    pub fn ssrc(&self) -> u32 {
        self.rtp.ssrc()
    }

    /// The port through which received messages and session events are
    /// published. Connect a [`MidiPort`] to it to subscribe.
    pub fn delivery_port(&self) -> &MidiPort {
        &self.delivery
    }

    pub fn rtp_session(&self) -> &Arc<RtpSession> {
        &self.rtp
    }

    pub fn peers(&self) -> Vec<Arc<RtpPeer>> {
        self.rtp.peers()
    }

    pub fn accept_from_none(&self) {
        *self.accept.lock().unwrap() = AcceptPolicy::None;
    }

    pub fn accept_from_any(&self) {
        *self.accept.lock().unwrap() = AcceptPolicy::Any;
    }

    /// Accept invitations only from `addr` (a control address).
    pub fn accept_from_peer(&self, addr: SocketAddr) {
        *self.accept.lock().unwrap() = AcceptPolicy::Peer(addr);
    }

    /// Invite a peer by name; `port` is its control port.
    pub async fn add_peer(&self, host: &str, port: u16) -> Result<()> {
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|_| MidiError::NameResolutionFailed(host.to_string()))?;
        let addr = addrs.next().ok_or_else(|| MidiError::NameResolutionFailed(host.to_string()))?;
        self.add_peer_addr(addr)
    }

    /// Invite a peer at a resolved control address.
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn add_peer_addr(&self, addr: SocketAddr) -> Result<()> {
        let invitation = SessionCommand::invitation(self.token, self.ssrc(), &self.name);
        self.send_command(&self.control_socket, &invitation, addr)?;
        info!("driver: sent invitation");
        Ok(())
    }

    /// End the session with the peer at `addr` (a control address).
    pub async fn remove_peer(&self, host: &str, port: u16) -> Result<()> {
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|_| MidiError::NameResolutionFailed(host.to_string()))?;
        let addr = addrs.next().ok_or_else(|| MidiError::NameResolutionFailed(host.to_string()))?;
        self.remove_peer_addr(addr)
    }

    pub fn remove_peer_addr(&self, addr: SocketAddr) -> Result<()> {
        let peer = self
            .rtp
            .find_peer_by_addr(rtp_addr_of(addr))
            .or_else(|| self.rtp.find_peer_by_addr(addr))
            .ok_or(MidiError::PeerUnknown)?;
        self.disconnect_peer(&peer);
        Ok(())
    }

    fn disconnect_peer(&self, peer: &Arc<RtpPeer>) {
        let ssrc = peer.ssrc();
        let bye = SessionCommand::end_session(self.token, self.ssrc());
        if let Err(e) = self.send_command(&self.control_socket, &bye, control_addr_of(peer.addr())) {
            warn!(ssrc, code = e.code(), "driver: failed to send end-session: {e}");
        }
        let _ = self.rtp.remove_peer(ssrc);
        self.rtpmidi.forget_peer(ssrc);
        self.peer_meta.lock().unwrap().remove(&ssrc);
        info!(ssrc, "driver: ended session");
    }

    /// Send `BY` to every peer and drop them.
    pub fn end_all_sessions(&self) {
        for peer in self.rtp.peers() {
            self.disconnect_peer(&peer);
        }
    }

    /// Queue a message for transmission. The message is stamped with the
    /// global clock and leaves with the next drained batch.
    pub fn send_message(&self, mut message: MidiMessage) {
        message.set_timestamp(MidiClock::global().now());
        self.out_queue.lock().unwrap().push_back(message);
    }

    pub fn queued_messages(&self) -> usize {
        self.out_queue.lock().unwrap().len()
    }

    /// One step of inbound processing: handle at most one datagram per
    /// socket.
    pub fn receive(&self) -> Result<()> {
        let control = Arc::clone(&self.control_socket);
        let rtp = Arc::clone(&self.rtp_socket);
        self.handle_readable(&control)?;
        self.handle_readable(&rtp)
    }

    /// One step of outbound draining: encode and send at most
    /// [`MAX_MESSAGES_PER_PACKET`] queued messages.
    pub fn send(&self) -> Result<()> {
        let batch: Vec<MidiMessage> = {
            let mut queue = self.out_queue.lock().unwrap();
            let take = queue.len().min(MAX_MESSAGES_PER_PACKET);
            queue.drain(..take).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }
        trace!(messages = batch.len(), "driver: draining outbound queue");
        match self.rtpmidi.send(&batch) {
            Err(e @ MidiError::MalformedCommandList(_)) => {
                warn!(code = e.code(), "driver: dropping unencodable batch: {e}");
                Ok(())
            }
            other => other,
        }
    }

    /// Timer tick: reap stale invited peers and keep the sync state machine
    /// moving.
    pub fn idle(&self) -> Result<()> {
        self.reap_stale_peers();

        if self.sync.load(Ordering::Relaxed) != 0 {
            let started = *self.sync_started.lock().unwrap();
            if started.is_none_or(|t| t.elapsed() < SYNC_TIMEOUT) {
                return Ok(());
            }
            debug!("driver: abandoning unanswered sync exchange");
            self.set_sync_state(0);
        }

        let peers = self.rtp.peers();
        if peers.is_empty() {
            return Ok(());
        }
        let index = self.sync_cursor.fetch_add(1, Ordering::Relaxed) % peers.len();
        self.start_sync(&peers[index]);
        Ok(())
    }

    fn set_sync_state(&self, count: u8) {
        self.sync.store(count, Ordering::Relaxed);
        *self.sync_started.lock().unwrap() = if count == 0 { None } else { Some(Instant::now()) };
    }

    fn reap_stale_peers(&self) {
        let stale: Vec<u32> = {
            let meta = self.peer_meta.lock().unwrap();
            meta.iter()
                .filter(|(_, m)| m.invited_by_us && m.last_sync.elapsed() >= STALE_PEER_TIMEOUT)
                .map(|(ssrc, _)| *ssrc)
                .collect()
        };
        for ssrc in stale {
            if let Some(peer) = self.rtp.find_peer_by_ssrc(ssrc) {
                warn!(ssrc, "driver: reaping stale peer");
                self.disconnect_peer(&peer);
                self.emit(DriverEvent::PeerDidEndSession { ssrc });
            } else {
                self.peer_meta.lock().unwrap().remove(&ssrc);
            }
        }
    }

    /// The driver as a runloop source: both sockets for reading, the RTP
    /// socket for writing while output is queued, and the idle timer.
    pub fn source(self: &Arc<Self>) -> Box<dyn Source> {
        Box::new(DriverSource {
            driver: Arc::clone(self),
        })
    }

    fn is_control_socket(&self, socket: &UdpSocket) -> bool {
        std::ptr::eq(socket, Arc::as_ptr(&self.control_socket))
    }

    fn send_command(&self, socket: &UdpSocket, command: &SessionCommand, addr: SocketAddr) -> Result<()> {
        let bytes = command.to_bytes();
        match socket.try_send_to(&bytes, addr) {
            Ok(sent) if sent == bytes.len() => Ok(()),
            Ok(sent) => Err(MidiError::SendTruncated {
                sent,
                expected: bytes.len(),
            }),
            // Treat a full buffer or a bounced destination like a lost
            // datagram; the protocol tolerates loss.
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                debug!(%addr, "driver: command not sent: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn emit(&self, event: DriverEvent) {
        debug!(?event, "driver: event");
        self.delivery.send(&PortPayload::Event(event));
    }

    fn update_meta(&self, ssrc: u32, invited_by_us: Option<bool>, update: impl FnOnce(&mut PeerMeta)) {
        let mut meta = self.peer_meta.lock().unwrap();
        let entry = meta
            .entry(ssrc)
            .or_insert_with(|| PeerMeta::new(invited_by_us.unwrap_or(false)));
        if let Some(invited) = invited_by_us {
            entry.invited_by_us = invited;
        }
        update(entry);
    }

    /// Handle one datagram on `socket`, classifying it as a session command
    /// or RTP-MIDI. Codec failures drop the datagram; only socket errors
    /// propagate.
    fn handle_readable(&self, socket: &UdpSocket) -> Result<()> {
        enum Classified {
            Command(SessionCommand),
            Midi(crate::packets::rtpmidi::ReceivedMidi),
        }

        let is_control = self.is_control_socket(socket);
        // Parse into owned values before dispatching, so the receive buffer
        // is free again when subscriber callbacks run.
        let (classified, source) = {
            let mut buf = self.recv_buf.lock().unwrap();
            let (len, source) = match socket.try_recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                // A bounced earlier send; the socket itself is fine.
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    debug!("driver: ignoring ICMP unreachable");
                    return Ok(());
                }
                Err(e) => {
                    warn!("driver: socket error: {e}");
                    return Err(e.into());
                }
            };
            let datagram = &buf[..len];
            trace!(bytes = len, %source, is_control, "driver: received datagram");

            if SessionCommand::is_session_command(datagram) {
                match SessionCommand::parse(datagram) {
                    Ok(command) => (Classified::Command(command), source),
                    Err(e) => {
                        debug!(code = e.code(), %source, "driver: dropping malformed command: {e}");
                        return Ok(());
                    }
                }
            } else if !is_control {
                match self.rtpmidi.receive_datagram(datagram, source) {
                    Ok(received) => (Classified::Midi(received), source),
                    Err(e) => {
                        debug!(code = e.code(), %source, "driver: dropping packet: {e}");
                        return Ok(());
                    }
                }
            } else {
                debug!(%source, "driver: dropping non-command datagram on control port");
                return Ok(());
            }
        };

        match classified {
            Classified::Command(command) => self.handle_command(command, source, is_control),
            Classified::Midi(received) => {
                self.send_receiver_feedback(&received.peer);
                if !received.messages.is_empty() {
                    self.delivery.send(&PortPayload::Messages(received.messages));
                }
                Ok(())
            }
        }
    }

    fn send_receiver_feedback(&self, peer: &Arc<RtpPeer>) {
        let feedback = SessionCommand::receiver_feedback(self.ssrc(), u32::from(peer.in_seqnum()));
        if let Err(e) = self.send_command(&self.control_socket, &feedback, control_addr_of(peer.addr())) {
            debug!(peer = peer.ssrc(), code = e.code(), "driver: feedback not sent: {e}");
        }
    }

    fn accepts_invitation(&self, source: SocketAddr, is_control: bool) -> bool {
        match *self.accept.lock().unwrap() {
            AcceptPolicy::None => false,
            AcceptPolicy::Any => true,
            AcceptPolicy::Peer(addr) => {
                if is_control {
                    source == addr
                } else {
                    source == rtp_addr_of(addr)
                }
            }
        }
    }

    fn handle_command(&self, command: SessionCommand, source: SocketAddr, is_control: bool) -> Result<()> {
        match command {
            SessionCommand::Invitation(body) => {
                self.emit(DriverEvent::PeerDidSendInvitation {
                    source,
                    name: body.name.clone(),
                });
                let socket = if is_control { &self.control_socket } else { &self.rtp_socket };
                if self.accepts_invitation(source, is_control) {
                    if !is_control {
                        let peer = Arc::new(RtpPeer::new(body.ssrc, source));
                        if let Err(e) = self.rtp.add_peer(Arc::clone(&peer)) {
                            warn!(code = e.code(), "driver: cannot add peer: {e}");
                            let no = SessionCommand::rejected(body.token, self.ssrc(), &self.name);
                            return self.send_command(socket, &no, source);
                        }
                        self.update_meta(body.ssrc, Some(false), |_| {});
                        info!(ssrc = body.ssrc, %source, "driver: session established (inbound)");
                    }
                    let ok = SessionCommand::accepted(body.token, self.ssrc(), &self.name);
                    self.send_command(socket, &ok, source)
                } else {
                    info!(%source, "driver: rejecting invitation");
                    let no = SessionCommand::rejected(body.token, self.ssrc(), &self.name);
                    self.send_command(socket, &no, source)
                }
            }
            SessionCommand::InvitationAccepted(body) => {
                if body.token != self.token {
                    warn!(
                        code = MidiError::TokenMismatch.code(),
                        expected = self.token,
                        got = body.token,
                        "driver: ignoring acceptance with foreign token"
                    );
                    return Ok(());
                }
                if is_control {
                    // Control channel is up; invite on the media channel.
                    let invitation = SessionCommand::invitation(self.token, self.ssrc(), &self.name);
                    self.send_command(&self.rtp_socket, &invitation, rtp_addr_of(source))
                } else {
                    let peer = Arc::new(RtpPeer::new(body.ssrc, source));
                    if let Err(e) = self.rtp.add_peer(Arc::clone(&peer)) {
                        warn!(code = e.code(), "driver: cannot add peer: {e}");
                        return Ok(());
                    }
                    self.update_meta(body.ssrc, Some(true), |_| {});
                    info!(ssrc = body.ssrc, %source, "driver: session established (outbound)");
                    self.emit(DriverEvent::PeerDidAcceptInvitation {
                        ssrc: body.ssrc,
                        addr: source,
                    });
                    self.start_sync(&peer);
                    Ok(())
                }
            }
            SessionCommand::InvitationRejected(body) => {
                info!(%source, ssrc = body.ssrc, "driver: invitation rejected");
                self.emit(DriverEvent::PeerDidRejectInvitation { source });
                Ok(())
            }
            SessionCommand::EndSession(body) => {
                if self.rtp.remove_peer(body.ssrc).is_ok() {
                    self.rtpmidi.forget_peer(body.ssrc);
                    self.peer_meta.lock().unwrap().remove(&body.ssrc);
                    info!(ssrc = body.ssrc, "driver: peer ended session");
                    self.emit(DriverEvent::PeerDidEndSession { ssrc: body.ssrc });
                }
                Ok(())
            }
            SessionCommand::Sync { ssrc, count, timestamps } => self.handle_sync(ssrc, count, timestamps, source),
            SessionCommand::ReceiverFeedback { ssrc, seqnum } => {
                trace!(ssrc, seqnum, "driver: receiver feedback");
                self.rtpmidi.journal_truncate(ssrc, seqnum as u16);
                Ok(())
            }
        }
    }

    fn start_sync(&self, peer: &Arc<RtpPeer>) {
        let now = MidiClock::global().now() as u64;
        let sync = SessionCommand::sync(self.ssrc(), 0, [now, 0, 0]);
        match self.send_command(&self.rtp_socket, &sync, peer.addr()) {
            Ok(()) => {
                self.set_sync_state(1);
                trace!(peer = peer.ssrc(), "driver: started clock sync");
            }
            Err(e) => debug!(peer = peer.ssrc(), code = e.code(), "driver: sync not started: {e}"),
        }
    }

    /// Three-way clock synchronisation.
    ///
    /// A sync from ourselves or with a count past two restarts the exchange
    /// with a fresh `count = 0`.
    fn handle_sync(&self, ssrc: u32, count: u8, timestamps: [u64; 3], source: SocketAddr) -> Result<()> {
        let now = MidiClock::global().now() as u64;

        if ssrc == self.ssrc() || count > 2 {
            let sync = SessionCommand::sync(self.ssrc(), 0, [now, 0, 0]);
            self.set_sync_state(1);
            return self.send_command(&self.rtp_socket, &sync, source);
        }

        match count {
            0 => {
                let reply = SessionCommand::sync(self.ssrc(), 1, [timestamps[0], now, 0]);
                self.set_sync_state(2);
                self.send_command(&self.rtp_socket, &reply, source)
            }
            1 => {
                // We initiated with ts1; the peer answered with ts2. Estimate
                // the one-way delay and the peer's clock offset, then close
                // the exchange with ts3.
                let delay = now.saturating_sub(timestamps[0]) / 2;
                let offset = timestamps[1] as i64 + delay as i64 - now as i64;
                self.update_meta(ssrc, None, |meta| {
                    meta.clock_delay = delay;
                    meta.clock_offset = offset;
                    meta.last_sync = Instant::now();
                });
                debug!(ssrc, delay, offset, "driver: clock sync estimate");
                let reply = SessionCommand::sync(self.ssrc(), 2, [timestamps[0], timestamps[1], now]);
                self.set_sync_state(0);
                self.send_command(&self.rtp_socket, &reply, source)
            }
            _ => {
                // count == 2: the responder's turn to estimate; the exchange
                // is complete.
                let delay = timestamps[2].saturating_sub(timestamps[0]) / 2;
                let offset = timestamps[2] as i64 + delay as i64 - now as i64;
                self.update_meta(ssrc, None, |meta| {
                    meta.clock_delay = delay;
                    meta.clock_offset = offset;
                    meta.last_sync = Instant::now();
                });
                debug!(ssrc, delay, offset, "driver: clock sync complete");
                self.set_sync_state(0);
                Ok(())
            }
        }
    }

    /// The latest clock-offset estimate for a peer, in global-clock ticks.
    pub fn peer_clock_offset(&self, ssrc: u32) -> Option<i64> {
        self.peer_meta.lock().unwrap().get(&ssrc).map(|meta| meta.clock_offset)
    }

    /// The latest one-way-delay estimate for a peer, in global-clock ticks.
    pub fn peer_clock_delay(&self, ssrc: u32) -> Option<u64> {
        self.peer_meta.lock().unwrap().get(&ssrc).map(|meta| meta.clock_delay)
    }
}

impl Drop for AppleMidiDriver {
    fn drop(&mut self) {
        self.end_all_sessions();
    }
}

impl std::fmt::Debug for AppleMidiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppleMidiDriver")
            .field("name", &self.name)
            .field("port", &self.port())
            .field("ssrc", &self.ssrc())
            .field("peers", &self.rtp.peer_count())
            .finish()
    }
}

struct DriverSource {
    driver: Arc<AppleMidiDriver>,
}

impl Source for DriverSource {
    fn name(&self) -> &str {
        &self.driver.name
    }

    fn read_sockets(&self) -> Vec<Arc<UdpSocket>> {
        vec![
            Arc::clone(&self.driver.control_socket),
            Arc::clone(&self.driver.rtp_socket),
        ]
    }

    fn write_sockets(&self) -> Vec<Arc<UdpSocket>> {
        if self.driver.out_queue.lock().unwrap().is_empty() {
            Vec::new()
        } else {
            vec![Arc::clone(&self.driver.rtp_socket)]
        }
    }

    fn timeout(&self) -> Option<Duration> {
        Some(IDLE_PERIOD)
    }

    fn readable(&self, socket: &UdpSocket) -> Result<()> {
        self.driver.handle_readable(socket)
    }

    fn writable(&self, _socket: &UdpSocket) -> Result<()> {
        self.driver.send()
    }

    fn idle(&self, _elapsed: Duration) -> Result<()> {
        self.driver.idle()
    }
}
