//! Cooperative I/O and timer dispatch.
//!
//! A [`Source`] declares the sockets it wants readiness callbacks for and an
//! optional timer period. The [`RunLoop`] multiplexes every registered
//! source behind a single await: per step it samples the wall clock once,
//! charges the elapsed interval against each source's countdown (firing
//! `idle` on underflow), then waits for the earliest of cancellation, the
//! minimum remaining timeout, or readiness of any declared socket.
//!
//! Callbacks run on the loop task and must not block; socket I/O inside
//! them uses the non-blocking `try_*` forms, which is safe because the loop
//! only dispatches after readiness was signalled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, select_all};
use tokio::io::Interest;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{MidiError, Result};

pub const MAX_SOURCES: usize = 16;

/// Step timeout when no source carries a timer.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// A participant in the runloop: readiness sets, a timer, and callbacks.
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Sockets whose readability should wake the loop.
    fn read_sockets(&self) -> Vec<Arc<UdpSocket>> {
        Vec::new()
    }

    /// Sockets whose writability should wake the loop. Return an empty set
    /// while there is nothing to write.
    fn write_sockets(&self) -> Vec<Arc<UdpSocket>> {
        Vec::new()
    }

    /// Period of the idle timer, if any.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn readable(&self, _socket: &UdpSocket) -> Result<()> {
        Ok(())
    }

    fn writable(&self, _socket: &UdpSocket) -> Result<()> {
        Ok(())
    }

    fn idle(&self, _elapsed: Duration) -> Result<()> {
        Ok(())
    }
}

struct Slot {
    source: Box<dyn Source>,
    remain: Duration,
}

/// Drives up to [`MAX_SOURCES`] sources until stopped or a step fails.
pub struct RunLoop {
    slots: Vec<Slot>,
    cancel: CancellationToken,
    last_sample: Option<Instant>,
}

impl RunLoop {
    pub fn new() -> Self {
        RunLoop {
            slots: Vec::new(),
            cancel: CancellationToken::new(),
            last_sample: None,
        }
    }

    pub fn add_source(&mut self, source: Box<dyn Source>) -> Result<()> {
        if self.slots.len() >= MAX_SOURCES {
            return Err(MidiError::TooManySources);
        }
        let remain = source.timeout().unwrap_or(DEFAULT_TIMEOUT);
        debug!(source = source.name(), "runloop: adding source");
        self.slots.push(Slot { source, remain });
        Ok(())
    }

    /// Remove a source by name; returns whether one was removed.
    pub fn remove_source(&mut self, name: &str) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.source.name() != name);
        self.slots.len() != before
    }

    /// Token that stops the loop after the current step.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// One iteration of the loop. Returns `false` once the loop was stopped.
    pub async fn step(&mut self) -> Result<bool> {
        let now = Instant::now();
        let elapsed = self.last_sample.map_or(Duration::ZERO, |t| now - t);
        self.last_sample = Some(now);

        // Charge the elapsed interval against every timer and fire the ones
        // that ran out.
        for slot in &mut self.slots {
            let Some(timeout) = slot.source.timeout() else { continue };
            if elapsed >= slot.remain {
                slot.remain = timeout;
                trace!(source = slot.source.name(), "runloop: idle");
                slot.source.idle(elapsed)?;
            } else {
                slot.remain -= elapsed;
            }
        }

        let timeout = self
            .slots
            .iter()
            .filter(|slot| slot.source.timeout().is_some())
            .map(|slot| slot.remain)
            .min()
            .unwrap_or(DEFAULT_TIMEOUT);

        type Waited = (usize, Arc<UdpSocket>, Interest, std::io::Result<()>);
        async fn wait_ready(index: usize, socket: Arc<UdpSocket>, interest: Interest) -> Waited {
            let result = socket.ready(interest).await.map(|_| ());
            (index, socket, interest, result)
        }

        let mut waiters: Vec<BoxFuture<'static, Waited>> = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            for socket in slot.source.read_sockets() {
                waiters.push(Box::pin(wait_ready(index, socket, Interest::READABLE)));
            }
            for socket in slot.source.write_sockets() {
                waiters.push(Box::pin(wait_ready(index, socket, Interest::WRITABLE)));
            }
        }

        if waiters.is_empty() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(timeout) => {}
            }
            return Ok(true);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => return Ok(false),
            _ = tokio::time::sleep(timeout) => {}
            ((index, socket, interest, ready), _, _) = select_all(waiters) => {
                ready?;
                let slot = &mut self.slots[index];
                if interest.is_readable() {
                    slot.source.readable(&socket)?;
                } else {
                    slot.source.writable(&socket)?;
                }
                if let Some(timeout) = slot.source.timeout() {
                    slot.remain = timeout;
                }
            }
        }
        Ok(true)
    }

    /// Run `step` until [`stop`](RunLoop::stop) is called or a step returns
    /// a fatal error.
    pub async fn run(&mut self) -> Result<()> {
        while self.step().await? {}
        debug!("runloop: stopped");
        Ok(())
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        RunLoop::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TickSource {
        ticks: Arc<AtomicUsize>,
        period: Duration,
    }

    impl Source for TickSource {
        fn name(&self) -> &str {
            "tick"
        }
        fn timeout(&self) -> Option<Duration> {
            Some(self.period)
        }
        fn idle(&self, _elapsed: Duration) -> Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct EchoSource {
        socket: Arc<UdpSocket>,
        received: Arc<AtomicUsize>,
    }

    impl Source for EchoSource {
        fn name(&self) -> &str {
            "echo"
        }
        fn read_sockets(&self) -> Vec<Arc<UdpSocket>> {
            vec![Arc::clone(&self.socket)]
        }
        fn readable(&self, socket: &UdpSocket) -> Result<()> {
            let mut buf = [0u8; 64];
            match socket.try_recv_from(&mut buf) {
                Ok(_) => {
                    self.received.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }

    #[tokio::test]
    async fn test_idle_fires_on_timeout() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut runloop = RunLoop::new();
        runloop
            .add_source(Box::new(TickSource {
                ticks: Arc::clone(&ticks),
                period: Duration::from_millis(10),
            }))
            .unwrap();
        for _ in 0..5 {
            runloop.step().await.unwrap();
        }
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_readable_dispatch() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let received = Arc::new(AtomicUsize::new(0));

        let mut runloop = RunLoop::new();
        runloop
            .add_source(Box::new(EchoSource {
                socket: Arc::clone(&socket),
                received: Arc::clone(&received),
            }))
            .unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"ping", addr).await.unwrap();

        for _ in 0..10 {
            runloop.step().await.unwrap();
            if received.load(Ordering::SeqCst) > 0 {
                break;
            }
        }
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_ends_run() {
        let mut runloop = RunLoop::new();
        let cancel = runloop.canceller();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        runloop.run().await.unwrap();
    }

    #[test]
    fn test_capacity_is_bounded() {
        let mut runloop = RunLoop::new();
        for _ in 0..MAX_SOURCES {
            runloop
                .add_source(Box::new(TickSource {
                    ticks: Arc::new(AtomicUsize::new(0)),
                    period: Duration::from_secs(1),
                }))
                .unwrap();
        }
        let overflow = runloop.add_source(Box::new(TickSource {
            ticks: Arc::new(AtomicUsize::new(0)),
            period: Duration::from_secs(1),
        }));
        assert!(matches!(overflow, Err(MidiError::TooManySources)));
    }
}
