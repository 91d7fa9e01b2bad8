mod assemble;
mod cli;
mod error_fmt;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use eyre::WrapErr;
use serde_json::json;
use shelf_core::error::BuildError;
use shelf_core::{Node, Sample};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let cfg = shelf_config::load_file(&cli.config)?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), sim = cli.sim, "config loaded");

    match cli.cmd {
        Commands::Run { duration_ms } => {
            let mut node = assemble::build_node(&cfg, cli.sim)?;
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let ticks = shelf_core::runner::run_until(
                &mut node,
                &shutdown,
                Duration::from_millis(cfg.timing.idle_ms),
                duration_ms.map(Duration::from_millis),
            );
            emit(
                cli.json,
                &json!({
                    "device_id": node.identity().as_str(),
                    "ticks": ticks,
                    "uptime_ms": node.uptime_ms(),
                }),
                &format!(
                    "{} stopped after {ticks} ticks ({} ms)",
                    node.identity(),
                    node.uptime_ms()
                ),
            );
        }
        Commands::SelfCheck => {
            let mut node = assemble::build_node(&cfg, cli.sim)?;
            let readings = node.read_all();
            print_self_check(cli.json, &node, &readings);
        }
        Commands::Slots => {
            let mut node = assemble::build_node(&cfg, cli.sim)?;
            node.boot();
            if cli.json {
                let table = node
                    .config_json()
                    .ok_or_else(|| eyre::eyre!("encode slot table"))?;
                println!("{table}");
            } else {
                for (index, slot) in node.slots().slots().iter().enumerate() {
                    println!(
                        "{index:>2}  {:<11}  gpio {:>2}  {:<8}  {:.1} cm",
                        slot.id(),
                        slot.gpio(),
                        if slot.enabled() { "enabled" } else { "disabled" },
                        slot.reference_cm()
                    );
                }
            }
        }
        Commands::Calibrate { slot } => {
            // Same normalization as the remote `calibrate <id>` command.
            let slot = slot.trim().to_ascii_uppercase();
            let mut node = assemble::build_node(&cfg, cli.sim)?;
            let cm = node.calibrate(&slot).map_err(eyre::Report::new)?;
            emit(
                cli.json,
                &json!({
                    "device_id": node.identity().as_str(),
                    "shelf_id": slot,
                    "success": true,
                    "shelf_length": shelf_core::protocol::cm_one_decimal(cm),
                }),
                &format!("{slot}: reference length {cm:.1} cm saved"),
            );
        }
        Commands::Reset => {
            let mut node = assemble::build_node(&cfg, cli.sim)?;
            node.reset()?;
            emit(
                cli.json,
                &json!({ "device_id": node.identity().as_str(), "reset": true }),
                "persisted slot state cleared",
            );
        }
        Commands::Identity => {
            let id = assemble::derive_identity(&cfg)
                .ok_or_else(|| eyre::Report::new(BuildError::MissingIdentity))?;
            emit(cli.json, &json!({ "device_id": id.as_str() }), id.as_str());
        }
    }
    Ok(())
}

fn emit(json_mode: bool, value: &serde_json::Value, text: &str) {
    if json_mode {
        println!("{value}");
    } else {
        println!("{text}");
    }
}

fn print_self_check(json_mode: bool, node: &Node, readings: &[(String, Sample)]) {
    let enabled = node.slots().enabled_count();
    if json_mode {
        let slots: Vec<_> = readings
            .iter()
            .zip(node.slots().slots())
            .map(|((id, sample), slot)| {
                json!({
                    "shelf_id": id,
                    "enabled": slot.enabled(),
                    "distance_cm": sample.distance_cm(),
                })
            })
            .collect();
        println!(
            "{}",
            json!({
                "device_id": node.identity().as_str(),
                "ok": true,
                "shelf_count": readings.len(),
                "enabled_shelf_count": enabled,
                "shelves": slots,
            })
        );
        return;
    }
    for ((id, sample), slot) in readings.iter().zip(node.slots().slots()) {
        let state = match (slot.enabled(), sample.mm()) {
            (false, _) => "disabled".to_string(),
            (true, Some(mm)) => format!("{:.1} cm", f64::from(mm) / 10.0),
            (true, None) => "no reading".to_string(),
        };
        println!("{id:<11}  {state}");
    }
    println!(
        "self-check ok: {} ({} slots, {enabled} enabled)",
        node.identity(),
        readings.len()
    );
}

/// Console layer honours `RUST_LOG` first, then `--log-level`. The optional
/// file layer always writes JSON lines at `logging.level`.
fn init_tracing(cli: &Cli, logging: &shelf_config::Logging) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .wrap_err_with(|| format!("invalid log level {:?}", cli.log_level))?;
    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
            let rotation = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::Rotation::DAILY,
                Some("hourly") => tracing_appender::rolling::Rotation::HOURLY,
                _ => tracing_appender::rolling::Rotation::NEVER,
            };
            let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
                .wrap_err("invalid logging.level")?;
            Some(fmt::layer().json().with_writer(writer).with_filter(filter))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("init logging: {e}"))
}
