//! kbd-manager
//!
//! Keyboard accessory manager for Linux tablets. Watches the docking
//! keyboard over USB, derives its physical connection state and enables or
//! disables the matching input devices accordingly.

mod config;
mod engine;
mod input;
mod service;
mod state;
mod status;
mod usb;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use engine::KeyboardEngine;
use input::{InputInhibitor, list_input_devices};
use protocol::KEYBOARD_IDENTITY;
use status::{InotifyWatcher, StatusCommand, StatusFile};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{error, info};
use usb::endpoints::{resolve_command_endpoints, resolve_report_endpoint};
use usb::{RusbHost, UsbHost, UsbPeripheral};

#[derive(Parser, Debug)]
#[command(name = "kbd-manager")]
#[command(author, version, about = "Keyboard accessory manager")]
#[command(long_about = "
Tracks the docking keyboard (USB 3206:3ffc) and keeps its input devices
enabled only while it is physically connected.

EXAMPLES:
    # Run the manager in the foreground
    kbd-manager

    # Run as systemd service
    kbd-manager --service

    # Query the keyboard once and print its state as JSON
    kbd-manager --probe

    # Ask the driver to reset the host side of the link
    kbd-manager --command host-reset

CONFIGURATION:
    The manager looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/kbd-manager/manager.toml
    3. /etc/kbd-manager/manager.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run as systemd service (sd-notify readiness and watchdog)
    #[arg(long)]
    service: bool,

    /// List attached keyboards with their interfaces and exit
    #[arg(long)]
    list_devices: bool,

    /// List input devices and exit
    #[arg(long)]
    list_inputs: bool,

    /// Run one connect-state check, print the result as JSON and exit
    #[arg(long)]
    probe: bool,

    /// Write a command to the keyboard status file and exit
    #[arg(long, value_enum, value_name = "CMD")]
    command: Option<StatusCommand>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = config::ManagerConfig::default();
        let path = config::ManagerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::ManagerConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::ManagerConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.manager.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("kbd-manager v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if let Some(command) = args.command {
        let status = StatusFile::new(config.paths.status_file());
        if !status.write_command(command) {
            anyhow::bail!(
                "Failed to write '{}' to {}",
                command,
                status.path().display()
            );
        }
        return Ok(());
    }

    if args.list_inputs {
        return list_inputs_mode(&config);
    }

    let host = RusbHost::new().context("Failed to initialize USB context")?;

    if args.list_devices {
        return list_devices_mode(&host);
    }

    let mut engine = KeyboardEngine::new(
        host,
        config.usb.engine_settings(),
        StatusFile::new(config.paths.status_file()),
        Box::new(InotifyWatcher::new(config.paths.status_file())),
        Handle::current(),
    );

    if args.probe {
        return probe_mode(&engine);
    }

    let service_mode = args.service || config.manager.service_mode;
    let result = run_daemon(&mut engine, &config, service_mode).await;

    info!("Stopping keyboard engine...");
    tokio::task::block_in_place(|| engine.stop());

    result
}

/// List input devices and exit
fn list_inputs_mode(config: &config::ManagerConfig) -> Result<()> {
    let class_dir = config.paths.input_class_dir();
    let devices = list_input_devices(&class_dir)
        .with_context(|| format!("Failed to list input devices in {}", class_dir.display()))?;

    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }

    println!("Found {} input device(s):\n", devices.len());
    for device in devices {
        println!(
            "  [{}] {} - {}{}",
            device.id,
            device.identity,
            device.name,
            if KEYBOARD_IDENTITY == device.identity {
                " (keyboard)"
            } else {
                ""
            }
        );
        println!(
            "      Enabled: {}",
            if device.is_enabled() { "yes" } else { "no" }
        );
    }

    Ok(())
}

/// List attached keyboards and exit
fn list_devices_mode(host: &RusbHost) -> Result<()> {
    let devices: Vec<_> = host
        .attached_devices()
        .context("Failed to enumerate USB devices")?
        .into_iter()
        .filter(|d| {
            KEYBOARD_IDENTITY.matches(d.identity().vendor_id, d.identity().product_id)
        })
        .collect();

    if devices.is_empty() {
        println!("No keyboard ({}) attached.", KEYBOARD_IDENTITY);
        return Ok(());
    }

    for device in devices {
        let (manufacturer, product) = device.strings();
        println!(
            "{} {} - {} {}",
            device.name(),
            device.identity(),
            manufacturer.as_deref().unwrap_or("Unknown Manufacturer"),
            product.as_deref().unwrap_or("Unknown Product")
        );
        println!(
            "  Access: {}",
            if device.has_permission() {
                "read/write"
            } else {
                "denied"
            }
        );

        let config = match device.configuration() {
            Ok(config) => config,
            Err(e) => {
                println!("  Configuration unavailable: {}", e);
                continue;
            }
        };

        for interface in &config.interfaces {
            println!(
                "  Interface {} (alt {}, class {:#04x})",
                interface.number, interface.alternate_setting, interface.class_code
            );
            for ep in &interface.endpoints {
                println!(
                    "      Endpoint {:#04x} {:?} {:?} ({} bytes)",
                    ep.address, ep.direction, ep.kind, ep.max_packet_size
                );
            }
        }

        match resolve_command_endpoints(&config) {
            Some(cmd) => println!("  Command interface: {}", cmd.interface),
            None => println!("  Command interface: none"),
        }
        match resolve_report_endpoint(&config) {
            Some(report) => println!("  Report interface: {}", report.interface),
            None => println!("  Report interface: none"),
        }
        println!();
    }

    Ok(())
}

/// Query the keyboard once and print the verdict
fn probe_mode(engine: &KeyboardEngine<RusbHost>) -> Result<()> {
    let state = tokio::task::block_in_place(|| engine.probe())
        .context("Failed to probe keyboard")?;
    if let Some(name) = engine.session().device_name() {
        info!("Probed keyboard at {}", name);
    }

    let output = serde_json::json!({ "state": state });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Run until Ctrl+C
async fn run_daemon(
    engine: &mut KeyboardEngine<RusbHost>,
    config: &config::ManagerConfig,
    service_mode: bool,
) -> Result<()> {
    let inhibitor = InputInhibitor::new(config.paths.input_class_dir(), KEYBOARD_IDENTITY);
    // Keyboard stays disabled until it reports connected
    inhibitor.disable_keyboard();
    engine.add_listener(Arc::new(inhibitor));

    let watchdog_handle = if service_mode {
        info!("Running in service mode");
        if service::is_systemd() {
            info!("Running under systemd");
        }
        engine.add_listener(Arc::new(service::StatusReporter));
        service::spawn_watchdog_task()
    } else {
        None
    };

    engine.start().context("Failed to start keyboard engine")?;

    if service_mode {
        service::notify(service::Notification::Ready)
            .context("Failed to notify systemd ready")?;
        service::notify(service::Notification::Status(
            "Running - waiting for keyboard".to_string(),
        ))
        .context("Failed to send status to systemd")?;
    }

    info!("Press Ctrl+C to shutdown");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    if service_mode {
        service::notify(service::Notification::Stopping)
            .context("Failed to notify systemd stopping")?;
    }

    if let Some(handle) = watchdog_handle {
        handle.abort();
    }

    Ok(())
}
