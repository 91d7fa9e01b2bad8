use std::time::Duration;

use rstest::rstest;
use shelf_core::config::{CalibrationCfg, RangeCfg};
use shelf_core::mocks::{MemoryKv, ScriptedRanger};
use shelf_core::{CalibrationEngine, CalibrationError, SlotSpec, SlotStore};
use shelf_traits::clock::test_clock::TestClock;

const SCENARIO: [u32; 10] = [198, 201, 199, 15, 202, 197, 4500, 200, 203, 196];

struct Bench {
    engine: CalibrationEngine,
    store: SlotStore,
    ranger: ScriptedRanger,
    kv: MemoryKv,
    clock: TestClock,
}

fn bench() -> Bench {
    let kv = MemoryKv::new();
    let mut store = SlotStore::new(
        &[SlotSpec::new("A1", 4), SlotSpec::new("A2", 5)],
        "shelves",
        Box::new(kv.clone()),
    );
    store.load();
    Bench {
        engine: CalibrationEngine::new(CalibrationCfg::default(), RangeCfg::default()),
        store,
        ranger: ScriptedRanger::new(),
        kv,
        clock: TestClock::new(),
    }
}

impl Bench {
    fn run(&mut self, id: &str) -> Result<f32, CalibrationError> {
        let mut ranger = self.ranger.clone();
        self.engine
            .calibrate(id, &mut self.store, &mut ranger, &self.clock)
    }
}

#[rstest]
fn scenario_discards_outliers_and_averages_the_rest() {
    let mut b = bench();
    b.ranger.push(1, SCENARIO.map(Some));

    let cm = b.run("A2").expect("calibrate");

    // 8 valid samples, mean 199.5 mm
    assert!((cm - 20.0).abs() < f32::EPSILON);
    assert!((b.store.slots()[1].reference_cm() - 20.0).abs() < f32::EPSILON);
    assert_eq!(b.ranger.read_count(1), 10);
    assert_eq!(b.ranger.read_count(0), 0);
}

#[rstest]
fn samples_are_paced_without_trailing_delay() {
    let mut b = bench();
    b.ranger.set_fallback(0, Some(300));
    b.run("A1").expect("calibrate");
    assert_eq!(b.clock.total_slept(), Duration::from_millis(900));
}

#[rstest]
fn result_is_persisted() {
    let mut b = bench();
    b.ranger.set_fallback(0, Some(1234));
    b.run("A1").expect("calibrate");

    let mut reloaded = SlotStore::new(&[SlotSpec::new("A1", 4)], "shelves", Box::new(b.kv.clone()));
    reloaded.load();
    assert!((reloaded.slots()[0].reference_cm() - 123.4).abs() < 1e-4);
}

#[rstest]
#[case::four_valid(vec![Some(300), Some(301), Some(302), Some(303), None, None, Some(5), Some(9000), None, None], 4)]
#[case::all_missing(vec![None; 10], 0)]
fn too_few_valid_samples_fail_without_mutation(
    #[case] readings: Vec<Option<u32>>,
    #[case] valid: u32,
) {
    let mut b = bench();
    b.store.set_reference_length("A1", 55.5).expect("seed");
    let writes = b.kv.writes();
    b.ranger.push(0, readings);

    let err = b.run("A1").expect_err("insufficient");

    assert_eq!(
        err,
        CalibrationError::InsufficientSamples { valid, required: 5 }
    );
    assert!((b.store.slots()[0].reference_cm() - 55.5).abs() < f32::EPSILON);
    assert_eq!(b.kv.writes(), writes);
}

#[rstest]
fn exactly_min_valid_succeeds() {
    let mut b = bench();
    b.ranger.push(
        0,
        [Some(400), Some(400), Some(400), Some(401), Some(401), None, None, None, None, None],
    );
    let cm = b.run("A1").expect("calibrate");
    assert!((cm - 40.0).abs() < f32::EPSILON);
}

#[rstest]
fn ranger_faults_count_as_invalid_samples() {
    let mut b = bench();
    b.ranger.fail_channel(0);
    assert_eq!(
        b.run("A1"),
        Err(CalibrationError::InsufficientSamples {
            valid: 0,
            required: 5
        })
    );
}

#[rstest]
fn unknown_slot_takes_no_samples() {
    let mut b = bench();
    assert_eq!(
        b.run("Z9"),
        Err(CalibrationError::UnknownSlot("Z9".to_string()))
    );
    assert!(b.ranger.reads().is_empty());
}

#[rstest]
fn persistence_failure_is_reported() {
    let mut b = bench();
    b.ranger.set_fallback(0, Some(300));
    b.kv.fail_writes(true);
    assert!(matches!(b.run("A1"), Err(CalibrationError::Persist(_))));
    assert!(b.store.slots()[0].reference_cm().abs() < f32::EPSILON);
}
