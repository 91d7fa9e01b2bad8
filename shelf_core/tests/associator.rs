use std::time::Duration;

use proptest::prelude::*;
use rstest::rstest;
use shelf_core::mocks::ScriptedRadio;
use shelf_core::{Credential, CredentialList, NetworkAssociator, NodeError};
use shelf_traits::clock::test_clock::TestClock;

const ATTEMPT: Duration = Duration::from_secs(10);

fn creds(ssids: &[&str]) -> CredentialList {
    ssids.iter().map(|s| Credential::new(*s, "pw")).collect()
}

fn associator(radio: &ScriptedRadio, ssids: &[&str]) -> NetworkAssociator {
    NetworkAssociator::new(
        Box::new(radio.clone()),
        creds(ssids),
        ATTEMPT,
        Duration::from_secs(60),
    )
}

#[rstest]
fn first_reachable_network_wins_within_bounded_waits() {
    let radio = ScriptedRadio::new();
    radio.reachable("office", 2);
    let clock = TestClock::new();
    let mut a = associator(&radio, &["home", "office", "lab"]);

    let idx = a.associate(&clock, ATTEMPT).expect("associate");

    assert_eq!(idx, 1);
    assert_eq!(radio.attempts(), ["home", "office"]);
    assert_eq!(a.cursor(), 1);
    assert_eq!(a.current_ssid(), Some("office"));
    assert!(a.is_up());
    // "home" used its whole attempt window, "office" needed two 100 ms checks
    assert_eq!(clock.total_slept(), Duration::from_millis(10_200));
}

#[rstest]
fn next_pass_starts_at_last_success() {
    let radio = ScriptedRadio::new();
    radio.reachable("lab", 0);
    let clock = TestClock::new();
    let mut a = associator(&radio, &["home", "office", "lab"]);
    assert_eq!(a.associate(&clock, ATTEMPT).expect("first"), 2);

    radio.unreachable("lab");
    radio.reachable("home", 0);
    radio.clear_attempts();

    assert_eq!(a.associate(&clock, ATTEMPT).expect("second"), 0);
    assert_eq!(radio.attempts(), ["lab", "home"]);
    assert_eq!(a.cursor(), 0);
}

#[rstest]
fn failed_pass_tries_each_once_and_keeps_cursor() {
    let radio = ScriptedRadio::new();
    radio.reachable("office", 0);
    let clock = TestClock::new();
    let mut a = associator(&radio, &["home", "office", "lab"]);
    a.associate(&clock, ATTEMPT).expect("first");

    radio.unreachable("office");
    radio.clear_attempts();
    let err = a
        .associate(&clock, ATTEMPT)
        .expect_err("nothing reachable");

    match err.downcast_ref::<NodeError>() {
        Some(NodeError::AssociationFailed { tried: 3 }) => {}
        other => panic!("expected AssociationFailed, got: {other:?}"),
    }
    assert_eq!(radio.attempts(), ["office", "lab", "home"]);
    assert_eq!(a.cursor(), 1);
    assert!(!a.is_up());
    assert_eq!(a.rssi(), 0);
    assert!(radio.associated_ssid().is_none());
}

#[rstest]
fn poll_detects_silent_drop_on_its_cadence() {
    let radio = ScriptedRadio::new();
    radio.reachable("home", 0);
    let clock = TestClock::new();
    let mut a = associator(&radio, &["home"]);

    assert!(a.poll(&clock), "first poll associates immediately");
    assert_eq!(a.rssi(), -61);

    radio.drop_link();
    clock.advance(Duration::from_secs(30));
    assert!(a.poll(&clock), "between checks the cached state stands");
    assert_eq!(radio.attempts().len(), 1);

    clock.advance(Duration::from_secs(30));
    assert!(a.poll(&clock), "link re-established on the next check");
    assert_eq!(radio.attempts(), ["home", "home"]);
}

#[rstest]
fn poll_retries_after_boot_failure() {
    let radio = ScriptedRadio::new();
    let clock = TestClock::new();
    let mut a = associator(&radio, &["home"]);

    // The failed attempt itself consumed the 10 s attempt window.
    assert!(!a.poll(&clock));
    assert_eq!(clock.total_slept(), ATTEMPT);
    radio.reachable("home", 0);
    clock.advance(Duration::from_secs(40));
    assert!(!a.poll(&clock));
    assert_eq!(radio.attempts().len(), 1);
    clock.advance(Duration::from_secs(10));
    assert!(a.poll(&clock));
    assert_eq!(radio.attempts().len(), 2);
}

proptest! {
    #[test]
    fn one_pass_rotates_from_cursor_without_repeats(
        n in 1usize..6,
        start in 0usize..6,
        up in proptest::collection::vec(any::<bool>(), 6),
    ) {
        let start = start % n;
        let ssids: Vec<String> = (0..n).map(|i| format!("net{i}")).collect();
        let refs: Vec<&str> = ssids.iter().map(String::as_str).collect();
        let radio = ScriptedRadio::new();
        let clock = TestClock::new();
        let mut a = associator(&radio, &refs);

        // Park the cursor on `start`.
        radio.reachable(&ssids[start], 0);
        prop_assert_eq!(a.associate(&clock, Duration::from_millis(500)).ok(), Some(start));
        radio.unreachable(&ssids[start]);
        radio.clear_attempts();

        for (i, reachable) in up.iter().take(n).enumerate() {
            if *reachable {
                radio.reachable(&ssids[i], 1);
            }
        }
        let result = a.associate(&clock, Duration::from_millis(500));
        let attempts = radio.attempts();

        prop_assert!(attempts.len() <= n);
        for (step, ssid) in attempts.iter().enumerate() {
            prop_assert_eq!(ssid, &ssids[(start + step) % n]);
        }
        let mut distinct = attempts.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(distinct.len(), attempts.len());

        match result {
            Ok(k) => {
                prop_assert!(up[k]);
                prop_assert_eq!(a.cursor(), k);
                prop_assert_eq!(attempts.last(), Some(&ssids[k]));
            }
            Err(_) => {
                prop_assert_eq!(attempts.len(), n);
                prop_assert_eq!(a.cursor(), start);
                prop_assert!(up.iter().take(n).all(|r| !r));
            }
        }
    }
}
