//! Identity derivation and peripheral assembly: the Pi rig, or `--sim`.

use shelf_config::Config;
use shelf_core::error::{BuildError, NodeError};
use shelf_core::{DeviceIdentity, Node, NodeBuilder};
use shelf_hardware::{
    FileKvStore, HostRadio, LoopbackTransport, MqttTransport, SimulatedRadio, SimulatedRanger,
    StaticResolver, SystemResolver,
};
use std::net::Ipv4Addr;

const MACHINE_ID_PATH: &str = "/etc/machine-id";

/// Base distance of every simulated ranger, in mm. `none` simulates missing echoes.
pub const SIM_MM_ENV: &str = "SHELF_SIM_MM";
const SIM_DEFAULT_MM: u32 = 300;

/// `device.id` when configured, otherwise derived from the host's machine id.
pub fn derive_identity(cfg: &Config) -> Option<DeviceIdentity> {
    if let Some(id) = &cfg.device.id {
        return Some(DeviceIdentity::explicit(id.clone()));
    }
    match std::fs::read_to_string(MACHINE_ID_PATH) {
        Ok(text) => DeviceIdentity::from_machine_id(&cfg.device.id_prefix, &text),
        Err(e) => {
            tracing::warn!(path = MACHINE_ID_PATH, error = %e, "no hardware id available");
            None
        }
    }
}

/// Open the state file and assemble a node for the rig or the simulator.
pub fn build_node(cfg: &Config, sim: bool) -> eyre::Result<Node> {
    let identity =
        derive_identity(cfg).ok_or_else(|| eyre::Report::new(BuildError::MissingIdentity))?;
    let store = FileKvStore::open(&cfg.storage.path)
        .map_err(|e| eyre::Report::new(NodeError::Storage(e.to_string())))?;
    tracing::debug!(path = %store.path().display(), "state file opened");

    let builder = Node::builder()
        .with_config(cfg)
        .with_identity(identity)
        .with_store(store);
    let builder = if sim {
        with_simulator(builder, cfg)
    } else {
        with_rig(builder, cfg)?
    };
    builder.build()
}

fn sim_base_mm() -> Option<u32> {
    match std::env::var(SIM_MM_ENV) {
        Ok(v) if v.trim().eq_ignore_ascii_case("none") => None,
        Ok(v) => Some(v.trim().parse().unwrap_or(SIM_DEFAULT_MM)),
        Err(_) => Some(SIM_DEFAULT_MM),
    }
}

fn with_simulator(builder: NodeBuilder, cfg: &Config) -> NodeBuilder {
    let channels = cfg.slots.len();
    let base = sim_base_mm();
    let mut ranger = SimulatedRanger::new(channels, base.unwrap_or(SIM_DEFAULT_MM));
    if base.is_none() {
        for ch in 0..channels {
            ranger.set_channel(ch, None);
        }
    }
    let radio = SimulatedRadio::new(cfg.wifi.networks.iter().map(|n| n.ssid.clone()));
    let resolver = StaticResolver::new().with_entry(cfg.broker.host.clone(), Ipv4Addr::LOCALHOST);
    tracing::info!(channels, "using simulated peripherals");
    builder
        .with_ranger(ranger)
        .with_radio(radio)
        .with_resolver(resolver)
        .with_transport(LoopbackTransport::new())
}

fn with_rig(builder: NodeBuilder, cfg: &Config) -> eyre::Result<NodeBuilder> {
    let builder = builder
        .with_radio(HostRadio::default())
        .with_resolver(SystemResolver)
        .with_transport(MqttTransport::new());

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let pins: Vec<u8> = cfg.slots.iter().map(|s| s.gpio).collect();
        let ranger = shelf_hardware::ultrasonic::GpioRanger::new(&pins)
            .map_err(|e| eyre::eyre!("open gpio rangers: {e}"))?;
        Ok(builder.with_ranger(ranger))
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        let _ = (builder, cfg);
        eyre::bail!("hardware support not compiled in; rerun with --sim")
    }
}
