//! End-to-end behavior of the control loop against in-memory peripherals.

use std::net::Ipv4Addr;
use std::time::Duration;

use rstest::rstest;
use shelf_core::mocks::{MemoryKv, RecordingTransport, ScriptedRadio, ScriptedRanger, ScriptedResolver};
use shelf_core::{BuildError, Credential, DeviceIdentity, Node, NodeCfg, SlotSpec};
use shelf_traits::clock::test_clock::TestClock;

const ID: &str = "SHELF_0000000000AA";
const COMMAND: &str = "shelf/SHELF_0000000000AA/command";
const SCENARIO: [u32; 10] = [198, 201, 199, 15, 202, 197, 4500, 200, 203, 196];

struct Rig {
    node: Node,
    transport: RecordingTransport,
    ranger: ScriptedRanger,
    radio: ScriptedRadio,
    kv: MemoryKv,
    clock: TestClock,
}

fn rig_with(kv: MemoryKv) -> Rig {
    let transport = RecordingTransport::new();
    let ranger = ScriptedRanger::new();
    let radio = ScriptedRadio::new();
    radio.reachable("home", 0);
    let clock = TestClock::new();
    let node = Node::builder()
        .with_node_cfg(NodeCfg {
            device_name: Some("Pantry".into()),
            ..NodeCfg::default()
        })
        .with_slots(vec![
            SlotSpec::new("A1", 4),
            SlotSpec::new("B2", 5),
            SlotSpec::new("C3", 6),
        ])
        .with_credentials([Credential::new("home", "pw")].into_iter().collect())
        .with_identity(DeviceIdentity::explicit(ID))
        .with_ranger(ranger.clone())
        .with_radio(radio.clone())
        .with_transport(transport.clone())
        .with_resolver(ScriptedResolver::new(Some(Ipv4Addr::new(10, 0, 0, 5))))
        .with_store(kv.clone())
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build");
    Rig {
        node,
        transport,
        ranger,
        radio,
        kv,
        clock,
    }
}

/// A rig that has completed its first tick (associated, connected) with the
/// publish log cleared.
fn online() -> Rig {
    let mut r = rig_with(MemoryKv::new());
    r.node.tick();
    r.transport.clear_published();
    r
}

impl Rig {
    fn command(&mut self, text: &str) {
        self.transport.inject(COMMAND, text);
        self.node.tick();
    }
}

#[rstest]
fn first_tick_associates_connects_and_reports_online() {
    let mut r = rig_with(MemoryKv::new());
    r.node.tick();

    assert!(r.node.is_network_up());
    assert!(r.node.is_broker_connected());
    assert_eq!(r.radio.associated_ssid().as_deref(), Some("home"));
    let status = r.transport.published_on("shelf/status");
    assert_eq!(status.len(), 1);
    assert_eq!(status[0]["device_id"], ID);
    assert_eq!(status[0]["wifi"], "connected");
    assert_eq!(status[0]["mqtt"], "connected");
    assert_eq!(status[0]["shelf_count"], 3);
    assert_eq!(status[0]["enabled_shelf_count"], 0);
}

#[rstest]
fn builder_reports_first_missing_peripheral() {
    let err = Node::builder()
        .with_slots(vec![SlotSpec::new("A1", 4)])
        .build()
        .expect_err("no peripherals");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingRanger) => {}
        other => panic!("expected MissingRanger, got: {other:?}"),
    }
}

#[rstest]
fn status_repeats_on_its_interval() {
    let mut r = online();
    r.clock.advance(Duration::from_secs(29));
    r.node.tick();
    assert!(r.transport.published_on("shelf/status").is_empty());
    r.clock.advance(Duration::from_secs(1));
    r.node.tick();
    assert_eq!(r.transport.published_on("shelf/status").len(), 1);
}

#[rstest]
#[case("enable a1")]
#[case("ENABLE A1")]
#[case("  Enable   a1  ")]
fn enable_uppercases_the_slot_id(#[case] text: &str) {
    let mut r = online();
    r.command(text);

    assert!(r.node.slots().slots()[0].enabled());
    let status = r.transport.published_on("shelf/status");
    assert_eq!(status.len(), 1);
    assert_eq!(status[0]["enabled_shelf_count"], 1);
}

#[rstest]
fn enable_unknown_slot_changes_nothing() {
    let mut r = online();
    let writes = r.kv.writes();
    r.command("enable Z9");

    assert_eq!(r.node.slots().enabled_count(), 0);
    assert_eq!(r.kv.writes(), writes);
    assert!(r.transport.published().is_empty());
}

#[rstest]
#[case("reboot")]
#[case("enable")]
#[case("")]
fn malformed_commands_are_ignored(#[case] text: &str) {
    let mut r = online();
    r.command(text);
    assert!(r.transport.published().is_empty());
}

#[rstest]
fn disable_publishes_status() {
    let mut r = online();
    r.command("enable B2");
    r.command("disable b2");
    let status = r.transport.published_on("shelf/status");
    assert_eq!(status.len(), 2);
    assert_eq!(status[1]["enabled_shelf_count"], 0);
    assert!(!r.node.slots().slots()[1].enabled());
}

#[rstest]
fn scan_publishes_only_enabled_slots() {
    let mut r = online();
    r.command("enable A1");
    r.command("enable C3");
    r.ranger.set_fallback(0, Some(500));
    r.ranger.set_fallback(1, Some(600));
    r.ranger.set_fallback(2, Some(9_999));
    r.transport.clear_published();

    r.clock.advance(Duration::from_secs(5));
    r.node.tick();

    let sensor = r.transport.published_on("shelf/sensor");
    assert_eq!(sensor.len(), 2);
    assert_eq!(sensor[0]["shelf_id"], "A1");
    assert_eq!(sensor[0]["index"], 0);
    assert_eq!(sensor[0]["distance_cm"], 50.0);
    assert_eq!(sensor[0]["enabled"], true);
    assert_eq!(sensor[1]["shelf_id"], "C3");
    assert_eq!(sensor[1]["index"], 2);
    assert_eq!(sensor[1]["distance_cm"], -1.0, "out of range reads as no reading");
    assert_eq!(r.ranger.read_count(1), 0, "disabled slot is never ranged");
    assert_eq!(r.node.slots().slots()[1].sample(), shelf_core::Sample::NoReading);
}

#[rstest]
#[case::single(&["A1"], 0)]
#[case::pair(&["A1", "C3"], 1)]
#[case::all(&["A1", "B2", "C3"], 2)]
fn scan_paces_publishes_by_the_gap(#[case] enabled: &[&str], #[case] gaps: u32) {
    let mut r = online();
    for id in enabled {
        r.command(&format!("enable {id}"));
    }
    for ch in 0..3 {
        r.ranger.set_fallback(ch, Some(500));
    }
    r.transport.clear_published();
    let slept = r.clock.total_slept();

    r.clock.advance(Duration::from_secs(5));
    r.node.tick();

    assert_eq!(r.transport.published_on("shelf/sensor").len(), enabled.len());
    assert_eq!(
        r.clock.total_slept() - slept,
        Duration::from_millis(100) * gaps
    );
}

#[rstest]
fn scan_without_broker_keeps_readings_locally() {
    let mut r = online();
    r.command("enable A1");
    r.ranger.set_fallback(0, Some(500));
    r.transport.refuse_connections(true);
    r.transport.drop_session();
    r.transport.clear_published();

    r.clock.advance(Duration::from_secs(5));
    r.node.tick();

    assert!(!r.node.is_broker_connected());
    assert!(r.transport.published().is_empty());
    assert_eq!(r.node.slots().slots()[0].sample(), shelf_core::Sample::Mm(500));
}

#[rstest]
fn read_command_scans_immediately() {
    let mut r = online();
    r.command("enable B2");
    r.ranger.set_fallback(1, Some(750));
    r.command("read");
    let sensor = r.transport.published_on("shelf/sensor");
    assert_eq!(sensor.len(), 1);
    assert_eq!(sensor[0]["distance_cm"], 75.0);
}

#[rstest]
fn shelf_command_reads_one_enabled_slot() {
    let mut r = online();
    r.command("enable A1");
    r.command("enable B2");
    r.ranger.set_fallback(1, Some(321));
    r.transport.clear_published();

    r.command("shelf b2");
    let sensor = r.transport.published_on("shelf/sensor");
    assert_eq!(sensor.len(), 1);
    assert_eq!(sensor[0]["shelf_id"], "B2");
    assert_eq!(sensor[0]["distance_cm"], 32.1);

    r.command("shelf C3");
    assert_eq!(r.transport.published_on("shelf/sensor").len(), 1, "disabled slot ignored");
}

#[rstest]
fn calibrate_command_reports_scenario_result() {
    let mut r = online();
    r.ranger.push(0, SCENARIO.map(Some));
    r.command("calibrate a1");

    let resp = r
        .transport
        .published_on("shelf/SHELF_0000000000AA/calibrate/response");
    assert_eq!(resp.len(), 1);
    assert_eq!(resp[0]["device_id"], ID);
    assert_eq!(resp[0]["shelf_id"], "A1");
    assert_eq!(resp[0]["success"], true);
    assert_eq!(resp[0]["shelf_length"], 20.0);
}

#[rstest]
#[case::unknown_slot("calibrate Z9", "Z9")]
#[case::no_echo("calibrate B2", "B2")]
fn calibrate_failure_reports_minus_one(#[case] text: &str, #[case] id: &str) {
    let mut r = online();
    r.command(text);
    let resp = r
        .transport
        .published_on("shelf/SHELF_0000000000AA/calibrate/response");
    assert_eq!(resp.len(), 1);
    assert_eq!(resp[0]["shelf_id"], id);
    assert_eq!(resp[0]["success"], false);
    assert_eq!(resp[0]["shelf_length"], -1.0);
}

#[rstest]
fn enable_and_calibration_survive_restart() {
    let kv = MemoryKv::new();
    {
        let mut r = rig_with(kv.clone());
        r.node.tick();
        r.ranger.push(1, SCENARIO.map(Some));
        r.command("calibrate B2");
        r.command("enable B2");
    }

    let mut r = rig_with(kv);
    r.node.tick();
    r.transport.clear_published();
    r.transport
        .inject("shelf/SHELF_0000000000AA/config/request", "{}");
    r.node.tick();

    let resp = r
        .transport
        .published_on("shelf/SHELF_0000000000AA/config/response");
    assert_eq!(resp.len(), 1);
    let b2 = &resp[0]["shelves"][1];
    assert_eq!(b2["shelf_id"], "B2");
    assert_eq!(b2["index"], 1);
    assert_eq!(b2["gpio"], 5);
    assert_eq!(b2["enabled"], true);
    assert_eq!(b2["shelf_length"], 20.0);
    assert_eq!(resp[0]["total_count"], 3);
    assert_eq!(resp[0]["enabled_count"], 1);
    assert_eq!(resp[0]["shelves"][0]["enabled"], false);
    assert_eq!(resp[0]["shelves"][0]["shelf_length"], 0.0);
}

#[rstest]
#[case::broadcast_json("{}", true)]
#[case::plain_text("please", true)]
#[case::addressed_to_me(r#"{"device_id":"SHELF_0000000000AA"}"#, true)]
#[case::addressed_elsewhere(r#"{"device_id":"SHELF_0000000000BB"}"#, false)]
#[case::prefix_is_not_a_match(r#"{"device_id":"SHELF_0000000000A"}"#, false)]
fn config_request_addressing(#[case] payload: &str, #[case] answered: bool) {
    let mut r = online();
    r.transport
        .inject("shelf/SHELF_0000000000AA/config/request", payload);
    r.node.tick();
    let resp = r
        .transport
        .published_on("shelf/SHELF_0000000000AA/config/response");
    assert_eq!(resp.len(), usize::from(answered));
}

#[rstest]
#[case::broadcast("{}", true)]
#[case::for_me(r#"{"target_device":"SHELF_0000000000AA","timestamp":1}"#, true)]
#[case::for_another(r#"{"target_device":"SHELF_0000000000BB","timestamp":1}"#, false)]
fn heartbeat_reply(#[case] payload: &str, #[case] answered: bool) {
    let mut r = online();
    r.clock.advance(Duration::from_millis(1_500));
    r.transport.inject("shelf/heartbeat", payload);
    r.node.tick();
    let resp = r.transport.published_on("shelf/heartbeat/response");
    assert_eq!(resp.len(), usize::from(answered));
    if answered {
        assert_eq!(resp[0]["device_id"], ID);
        assert_eq!(resp[0]["status"], "online");
        assert_eq!(resp[0]["timestamp"], 1_500);
    }
}

#[rstest]
fn discovery_describes_the_node() {
    let mut r = online();
    r.command("enable C3");
    r.command("enable A1");
    r.transport.inject("shelf/discovery", "");
    r.node.tick();

    let resp = r.transport.published_on("shelf/discovery/response");
    assert_eq!(resp.len(), 1);
    assert_eq!(resp[0]["device_id"], ID);
    assert_eq!(resp[0]["device_name"], "Pantry");
    assert_eq!(resp[0]["shelves"], serde_json::json!(["A1", "C3"]));
    assert_eq!(resp[0]["total_shelves"], 3);
    assert_eq!(resp[0]["enabled_shelves"], 2);
    assert_eq!(resp[0]["wifi_signal"], -61);
}

#[rstest]
fn broker_restart_reconnects_and_announces() {
    let mut r = online();
    r.transport.drop_session();
    r.node.tick();
    assert!(!r.node.is_broker_connected());

    r.clock.advance(Duration::from_secs(5));
    r.node.tick();
    assert!(r.node.is_broker_connected());
    assert_eq!(r.transport.sessions().len(), 2);
    assert_eq!(r.transport.published_on("shelf/status").len(), 1);
}

#[rstest]
fn reset_clears_persisted_state() {
    let mut r = online();
    r.command("enable A1");
    r.node.reset().expect("reset");
    assert_eq!(r.node.slots().enabled_count(), 0);
    assert!(r.kv.is_empty());
}
