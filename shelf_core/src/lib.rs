#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Connectivity and command-protocol core of the shelf sensor node
//! (hardware-agnostic).
//!
//! Every peripheral is reached through the `shelf_traits` seams, so the whole
//! node runs against mocks in tests and against simulated or real hardware
//! from the CLI.
//!
//! ## Architecture
//!
//! - **Association**: ordered multi-credential failover (`associator`)
//! - **Broker link**: name-service-first resolution with static fallback,
//!   cached address, fixed-cadence reconnect (`broker`)
//! - **Slots**: write-through persisted enabled flags and reference lengths (`slots`)
//! - **Protocol**: topics, JSON payloads, text commands (`protocol`, `router`)
//! - **Measurement**: periodic scan and empty-slot calibration (`scan`, `calibration`)
//! - **Node**: one cooperative control loop owning all of the above (`node`, `runner`)
//!
//! Distances are handled in whole millimeters; reference lengths are stored
//! in centimeters with one decimal.

pub mod associator;
pub mod broker;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod identity;
pub mod mocks;
pub mod node;
pub mod protocol;
pub mod router;
pub mod runner;
pub mod scan;
pub mod slots;
pub mod util;

pub use associator::{Credential, CredentialList, NetworkAssociator};
pub use broker::BrokerLink;
pub use builder::NodeBuilder;
pub use calibration::CalibrationEngine;
pub use config::NodeCfg;
pub use error::{BuildError, CalibrationError, NodeError, Report, Result};
pub use identity::DeviceIdentity;
pub use node::Node;
pub use protocol::Command;
pub use slots::{Sample, Slot, SlotSpec, SlotStore};
