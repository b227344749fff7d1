mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{bind_driver, init_tracing, wait_until};
use netmidi::message::{MessageKind, MidiMessage};
use netmidi::port::{MidiPort, PortMode, PortPayload};
use netmidi::runloop::RunLoop;
use netmidi::sessions::{AppleMidiDriver, DriverEvent};
use tokio_util::sync::CancellationToken;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

fn spawn_runloop(driver: &Arc<AppleMidiDriver>) -> CancellationToken {
    let mut runloop = RunLoop::new();
    runloop.add_source(driver.source()).unwrap();
    let cancel = runloop.canceller();
    tokio::spawn(async move {
        runloop.run().await.unwrap();
    });
    cancel
}

fn collect_events(driver: &Arc<AppleMidiDriver>) -> Arc<Mutex<Vec<DriverEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let sink = MidiPort::new("events", PortMode::IN, move |_, payload| {
        if let PortPayload::Event(event) = payload {
            sink_events.lock().unwrap().push(event.clone());
        }
    });
    driver.delivery_port().connect(&sink);
    // Keep the sink alive through the connection; the driver's port holds it.
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handshake_and_midi_delivery() {
    init_tracing();

    let alice = bind_driver("alice").await;
    let bob = bind_driver("bob").await;
    bob.accept_from_any();

    let alice_events = collect_events(&alice);

    let received = Arc::new(Mutex::new(Vec::<MidiMessage>::new()));
    let sink_received = Arc::clone(&received);
    let sink = MidiPort::new("received", PortMode::IN, move |_, payload| {
        if let PortPayload::Messages(messages) = payload {
            sink_received.lock().unwrap().extend(messages.iter().cloned());
        }
    });
    bob.delivery_port().connect(&sink);

    let cancel_alice = spawn_runloop(&alice);
    let cancel_bob = spawn_runloop(&bob);

    alice.add_peer("127.0.0.1", bob.port()).await.unwrap();

    // Two-port handshake completes on both ends.
    assert!(wait_until(HANDSHAKE_TIMEOUT, || !alice.peers().is_empty()).await, "alice never saw bob");
    assert!(wait_until(HANDSHAKE_TIMEOUT, || !bob.peers().is_empty()).await, "bob never saw alice");
    assert_eq!(alice.peers()[0].ssrc(), bob.ssrc());
    assert_eq!(bob.peers()[0].ssrc(), alice.ssrc());

    assert!(
        wait_until(Duration::from_secs(1), || {
            alice_events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DriverEvent::PeerDidAcceptInvitation { .. }))
        })
        .await
    );

    // The invitation ladder ends in a clock sync started by alice.
    assert!(wait_until(HANDSHAKE_TIMEOUT, || alice.peer_clock_offset(bob.ssrc()).is_some()).await);

    alice.send_message(MidiMessage::new(MessageKind::NoteOn {
        channel: 3,
        key: 60,
        velocity: 101,
    }));
    alice.send_message(MidiMessage::new(MessageKind::NoteOff {
        channel: 3,
        key: 60,
        velocity: 0,
    }));

    assert!(
        wait_until(HANDSHAKE_TIMEOUT, || received.lock().unwrap().len() >= 2).await,
        "messages never arrived"
    );
    {
        let received = received.lock().unwrap();
        assert_eq!(received[0].kind(), &MessageKind::NoteOn { channel: 3, key: 60, velocity: 101 });
        assert_eq!(received[1].kind(), &MessageKind::NoteOff { channel: 3, key: 60, velocity: 0 });
    }

    // Sequence bookkeeping advanced in lockstep on both sides.
    let sent = alice.peers()[0].out_seqnum();
    assert!(sent >= 1);
    assert_eq!(bob.peers()[0].in_seqnum(), sent);

    cancel_alice.cancel();
    cancel_bob.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invitation_rejected_by_default_policy() {
    init_tracing();

    let alice = bind_driver("alice").await;
    let bob = bind_driver("bob").await;
    // bob keeps the default policy: reject everyone.

    let alice_events = collect_events(&alice);
    let cancel_alice = spawn_runloop(&alice);
    let cancel_bob = spawn_runloop(&bob);

    alice.add_peer("127.0.0.1", bob.port()).await.unwrap();

    assert!(
        wait_until(HANDSHAKE_TIMEOUT, || {
            alice_events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DriverEvent::PeerDidRejectInvitation { .. }))
        })
        .await,
        "rejection never reported"
    );
    assert!(alice.peers().is_empty());
    assert!(bob.peers().is_empty());

    cancel_alice.cancel();
    cancel_bob.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_accept_from_peer_matches_exact_address() {
    init_tracing();

    let alice = bind_driver("alice").await;
    let mallory = bind_driver("mallory").await;
    let bob = bind_driver("bob").await;
    bob.accept_from_peer(format!("127.0.0.1:{}", alice.port()).parse().unwrap());

    let mallory_events = collect_events(&mallory);
    let cancel_alice = spawn_runloop(&alice);
    let cancel_mallory = spawn_runloop(&mallory);
    let cancel_bob = spawn_runloop(&bob);

    mallory.add_peer("127.0.0.1", bob.port()).await.unwrap();
    assert!(
        wait_until(HANDSHAKE_TIMEOUT, || {
            mallory_events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DriverEvent::PeerDidRejectInvitation { .. }))
        })
        .await,
        "mallory was not rejected"
    );

    alice.add_peer("127.0.0.1", bob.port()).await.unwrap();
    assert!(wait_until(HANDSHAKE_TIMEOUT, || !alice.peers().is_empty()).await, "alice was not accepted");

    cancel_alice.cancel();
    cancel_mallory.cancel();
    cancel_bob.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_end_session_removes_peer() {
    init_tracing();

    let alice = bind_driver("alice").await;
    let bob = bind_driver("bob").await;
    bob.accept_from_any();

    let bob_events = collect_events(&bob);
    let cancel_alice = spawn_runloop(&alice);
    let cancel_bob = spawn_runloop(&bob);

    alice.add_peer("127.0.0.1", bob.port()).await.unwrap();
    assert!(wait_until(HANDSHAKE_TIMEOUT, || !alice.peers().is_empty()).await);
    assert!(wait_until(HANDSHAKE_TIMEOUT, || !bob.peers().is_empty()).await);

    alice.remove_peer("127.0.0.1", bob.port()).await.unwrap();
    assert!(alice.peers().is_empty());
    assert!(
        wait_until(HANDSHAKE_TIMEOUT, || bob.peers().is_empty()).await,
        "bob never processed the end-session command"
    );
    assert!(
        wait_until(Duration::from_secs(1), || {
            bob_events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, DriverEvent::PeerDidEndSession { .. }))
        })
        .await
    );

    cancel_alice.cancel();
    cancel_bob.cancel();
}
