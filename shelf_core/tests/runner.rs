use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use rstest::rstest;
use shelf_core::mocks::{MemoryKv, RecordingTransport, ScriptedRadio, ScriptedRanger, ScriptedResolver};
use shelf_core::runner::run_until;
use shelf_core::{Credential, DeviceIdentity, Node, SlotSpec};
use shelf_traits::KvStore;
use shelf_traits::Transport;
use shelf_traits::clock::test_clock::TestClock;

fn node(transport: &RecordingTransport, clock: &TestClock) -> Node {
    let mut kv = MemoryKv::new();
    kv.put_bool("shelves", "A1", true).expect("seed");
    let ranger = ScriptedRanger::new();
    ranger.set_fallback(0, Some(500));
    let radio = ScriptedRadio::new();
    radio.reachable("home", 0);
    Node::builder()
        .with_slots(vec![SlotSpec::new("A1", 4), SlotSpec::new("A2", 5)])
        .with_credentials([Credential::new("home", "pw")].into_iter().collect())
        .with_identity(DeviceIdentity::explicit("SHELF_RUN"))
        .with_ranger(ranger)
        .with_radio(radio)
        .with_transport(transport.clone())
        .with_resolver(ScriptedResolver::new(Some(Ipv4Addr::LOCALHOST)))
        .with_store(kv)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build")
}

#[rstest]
fn runs_for_the_requested_duration() {
    let transport = RecordingTransport::new();
    let clock = TestClock::new();
    let mut n = node(&transport, &clock);

    let ticks = run_until(
        &mut n,
        &AtomicBool::new(false),
        Duration::from_millis(10),
        Some(Duration::from_secs(12)),
    );

    // ticks at 0, 10, ..., 12_000 ms
    assert_eq!(ticks, 1_201);
    // scans at 0 s, 5 s and 10 s
    let sensor = transport.published_on("shelf/sensor");
    assert_eq!(sensor.len(), 3);
    assert!(sensor.iter().all(|m| m["shelf_id"] == "A1"));
    assert!(!transport.is_connected(), "session closed on exit");
}

#[rstest]
fn raised_shutdown_flag_stops_before_the_first_tick() {
    let transport = RecordingTransport::new();
    let clock = TestClock::new();
    let mut n = node(&transport, &clock);

    let ticks = run_until(&mut n, &AtomicBool::new(true), Duration::from_millis(10), None);

    assert_eq!(ticks, 0);
    assert!(transport.sessions().is_empty());
}
