//! Kiosk display client binary.
//!
//! Connects to the control server, keeps the connection alive across
//! failures and acknowledges every command. Rendering, speech and pairing
//! belong to the presentation layer; this binary stands in for it by
//! logging what would be shown.

use anyhow::Context;
use clap::Parser;
use kiosk_session::{
    ClientObserver, CloseInfo, ErrorEvent, HandlerError, KioskClient, ReconnectInfo,
    StateTransition,
};
use kiosk_wire::{Command, CommandType, Welcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::KioskConfig;
use logging::KioskLogFormatter;

/// Kiosk display client
#[derive(Parser, Debug)]
#[command(name = "kiosk", version, about = "Kiosk display client for a remote control server")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "kiosk.yaml")]
    config: PathBuf,

    /// Control server endpoint, e.g. wss://control.example/ws/display
    #[arg(long)]
    endpoint: Option<String>,

    /// Device identity sent to the server
    #[arg(long)]
    device_id: Option<String>,

    /// Heartbeat interval, e.g. 30s
    #[arg(long)]
    heartbeat_interval: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Logs client events in place of the presentation layer
struct PresentationLog;

impl ClientObserver for PresentationLog {
    fn on_state_change(&self, transition: &StateTransition) {
        component_debug!("client", "State {} -> {}", transition.from, transition.to);
    }

    fn on_connected(&self, welcome: &Welcome) {
        component_info!(
            "client",
            "Online as {}",
            welcome.device_id.as_deref().unwrap_or("<unassigned>")
        );
    }

    fn on_disconnected(&self, info: &CloseInfo) {
        component_warn!(
            "client",
            "Offline: {} {} ({})",
            info.code,
            info.reason,
            kiosk_wire::close::describe(info.code)
        );
    }

    fn on_reconnecting(&self, info: &ReconnectInfo) {
        component_info!(
            "client",
            "Retry {} in {}",
            info.attempt,
            humantime::format_duration(Duration::from_millis(info.delay.as_millis() as u64))
        );
    }

    fn on_error(&self, error: &ErrorEvent) {
        component_error!("client", "{:?} error: {}", error.kind, error.message);
    }
}

fn display_scene(command: &Command) -> Result<(), HandlerError> {
    if !command.parameters.is_object() {
        return Err(HandlerError::new("scene parameters must be an object"));
    }
    component_info!("display", "Scene {}: {}", command.command_id, command.parameters);
    Ok(())
}

fn clear_content(command: &Command) -> Result<(), HandlerError> {
    component_info!("display", "Cleared ({})", command.command_id);
    Ok(())
}

fn reload(command: &Command) -> Result<(), HandlerError> {
    component_info!("display", "Reload requested ({})", command.command_id);
    Ok(())
}

fn speak(command: &Command) -> Result<(), HandlerError> {
    let text = command
        .parameters
        .get("text")
        .and_then(|t| t.as_str())
        .ok_or_else(|| HandlerError::new("speak requires a text parameter"))?;
    component_info!("speech", "Say {:?}", text);
    Ok(())
}

fn unknown(command: &Command) -> Result<(), HandlerError> {
    component_warn!(
        "display",
        "No presenter for {} ({})",
        command.command_type,
        command.command_id
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("kiosk={}", args.log_level).parse()?)
        .add_directive(format!("kiosk_session={}", args.log_level).parse()?)
        .add_directive(format!("kiosk_wire={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .event_format(KioskLogFormatter::new("kiosk"))
        .init();

    info!("Starting kiosk client v{}", env!("CARGO_PKG_VERSION"));

    let mut kiosk_config = KioskConfig::load_from_file(&args.config)?;
    kiosk_config.apply_cli_overrides(
        args.endpoint,
        args.device_id,
        args.heartbeat_interval.map(Duration::from),
    );

    let client_config = kiosk_config.to_client_config();
    if let Err(e) = client_config.validate() {
        anyhow::bail!("invalid kiosk configuration: {}", e);
    }
    if kiosk_config.backoff.jitter == 0.0 {
        component_warn!("client", "Backoff jitter is disabled; displays may reconnect in lockstep");
    }

    let client = KioskClient::builder(client_config)
        .handler(CommandType::DisplayScene, display_scene)
        .handler(CommandType::ClearContent, clear_content)
        .handler(CommandType::Reload, reload)
        .handler(CommandType::Speak, speak)
        .fallback(unknown)
        .observer(Arc::new(PresentationLog))
        .spawn();

    client.connect()?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Received interrupt, shutting down");

    client.shutdown().await?;
    let status = client.status();
    info!("Kiosk client stopped after {} session(s)", status.epoch);

    Ok(())
}
