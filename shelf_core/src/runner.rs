use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::info;

use crate::node::Node;

/// Drive `node.tick()` until `shutdown` is raised or `max_run` (measured on
/// the node's clock) elapses, sleeping `idle` between ticks. The broker
/// session is closed on exit. Returns the number of ticks executed.
pub fn run_until(
    node: &mut Node,
    shutdown: &AtomicBool,
    idle: Duration,
    max_run: Option<Duration>,
) -> u64 {
    let clock = std::sync::Arc::clone(node.clock());
    let start = clock.now();
    let mut ticks = 0_u64;
    info!(
        device_id = %node.identity(),
        idle_ms = u64::try_from(idle.as_millis()).unwrap_or(u64::MAX),
        "control loop started"
    );
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested");
            break;
        }
        node.tick();
        ticks += 1;
        if let Some(limit) = max_run
            && clock.now().saturating_duration_since(start) >= limit
        {
            info!(ticks, "run duration reached");
            break;
        }
        clock.sleep(idle);
    }
    node.shutdown();
    ticks
}
