//! EventSub Overlay - stream alert overlay
//!
//! This is the main entry point for the overlay binary.
//! The overlay holds an EventSub WebSocket session, requests subscriptions
//! for it, and draws a fading alert with an audio cue for each follow or
//! subscribe notification.

mod alert;
mod cli;
mod config;
mod demo;
mod error;
mod eventsub;
mod logging;
mod protocol;
mod subscription;
mod version;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertRenderer, AlertRequest};
use crate::cli::{Cli, Commands};
use crate::config::{Environment, OverlayConfig};
use crate::error::{Error, Result};
use crate::eventsub::{ClientEvent, Dispatcher, EventSubClient, EventSubClientConfig};
use crate::logging::LogGuards;
use crate::subscription::SubscriptionRequester;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    // For commands that don't need full logging, use simple setup
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            if let Err(e) = handle_config_command(cli.config.as_deref(), subcommand.clone()) {
                exit_with(&e);
            }
            return Ok(());
        }
        _ => {}
    }

    let mut config = match OverlayConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(&e),
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = init_logging_from_config(&config, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting EventSub overlay"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    let result = match cli.command {
        Commands::Run { env } => {
            if let Some(environment) = env.as_deref().and_then(Environment::parse) {
                config.eventsub.environment = environment;
            }
            runtime.block_on(run_overlay(config))
        }
        Commands::Alert {
            username,
            image,
            color,
            duration_ms,
        } => {
            let request = AlertRequest {
                username,
                image_id: image,
                text_color: color,
                duration: Duration::from_millis(duration_ms.unwrap_or(config.alerts.duration_ms)),
            };
            runtime.block_on(run_single_alert(&config, request))
        }
        Commands::Demo { repeat } => runtime.block_on(run_demo(&config, repeat)),
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    };

    if let Err(e) = result {
        error!(error = %e.format_for_log(), fatal = e.is_fatal(), "Command failed");
        exit_with(&e);
    }

    Ok(())
}

/// Print a formatted error and exit with its mapped code
fn exit_with(e: &Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

/// Initialize logging from configuration
fn init_logging_from_config(config: &OverlayConfig, verbose: u8, quiet: bool) -> Result<LogGuards> {
    logging::init_logging(&config.logging, verbose, quiet)
}

/// Hold the EventSub session and draw alerts until interrupted
async fn run_overlay(config: OverlayConfig) -> Result<()> {
    let renderer = AlertRenderer::from_config(&config)?;
    let requester = SubscriptionRequester::new(&config.subscription)?;
    let client_config = EventSubClientConfig::from_settings(&config.eventsub);

    info!(
        environment = ?config.eventsub.environment,
        url = %client_config.url,
        subscribe_endpoint = %requester.endpoint(),
        username = %config.subscription.username,
        "Configuration loaded"
    );

    let mut client = EventSubClient::new(client_config, Dispatcher::from_config(&config), Arc::new(requester));
    let mut event_rx = client.start()?;

    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    let mut alerts_shown = 0u64;
    let mut alerts: Vec<JoinHandle<()>> = Vec::new();
    let mut interrupted = false;

    info!("Overlay event loop started");

    loop {
        tokio::select! {
            // Ctrl+C shutdown
            _ = &mut shutdown_signal => {
                let session = client.session();
                info!(
                    state = ?client.connection_state(),
                    established = session.is_established(),
                    session_id = session.session_id.as_deref().unwrap_or("-"),
                    "Shutdown signal received"
                );
                interrupted = true;
                if let Err(e) = client.shutdown().await {
                    warn!(error = %e, "Error requesting client shutdown");
                }
                // Let the session loop close its sockets
                while event_rx.recv().await.is_some() {}
                break;
            }

            event = event_rx.recv() => {
                match event {
                    Some(ClientEvent::Connected { connection_id, url, reconnect }) => {
                        info!(connection_id, url = %url, reconnect, "Connected to EventSub");
                    }
                    Some(ClientEvent::Welcome { session_id, reconnect }) => {
                        info!(session_id = %session_id, reconnect, "EventSub session ready");
                    }
                    Some(ClientEvent::Subscribed { session_id, status }) => {
                        info!(session_id = %session_id, status, "Subscriptions requested");
                    }
                    Some(ClientEvent::Reconnecting { url, delay }) => {
                        info!(url = %url, delay_ms = delay.as_millis() as u64, "Moving to new EventSub connection");
                    }
                    Some(ClientEvent::SupersededClosed { connection_id }) => {
                        debug!(connection_id, "Superseded connection closed");
                    }
                    Some(ClientEvent::Alert(request)) => {
                        alerts.retain(|handle| !handle.is_finished());
                        match renderer.show(request) {
                            Ok(handle) => {
                                alerts.push(handle);
                                alerts_shown += 1;
                            }
                            Err(e) => error!(error = %e.format_for_log(), "Skipping alert"),
                        }
                    }
                    Some(ClientEvent::Disconnected { connection_id, reason }) => {
                        warn!(connection_id, reason = %reason, "Disconnected from EventSub");
                    }
                    Some(ClientEvent::KeepaliveOverdue { silent_for }) => {
                        warn!(silent_secs = silent_for.as_secs(), "EventSub session may be dead");
                    }
                    Some(ClientEvent::Error { message, fatal }) => {
                        if fatal {
                            error!(message = %message, "Fatal EventSub error");
                            break;
                        } else {
                            warn!(message = %message, "EventSub error");
                        }
                    }
                    None => {
                        info!("EventSub event channel closed");
                        break;
                    }
                }
            }
        }
    }

    finish_alerts(&renderer, alerts, interrupted).await;

    info!(alerts_shown, "Overlay shutting down");

    Ok(())
}

/// Let running alerts play out, or cut them and blank the surface when interrupted
async fn finish_alerts(renderer: &AlertRenderer, alerts: Vec<JoinHandle<()>>, interrupted: bool) {
    let running = alerts.iter().filter(|handle| !handle.is_finished()).count();
    if running == 0 {
        return;
    }

    if interrupted {
        info!(running, "Stopping running alerts");
        for handle in &alerts {
            handle.abort();
        }
        for handle in alerts {
            let _ = handle.await;
        }
        renderer.clear();
        return;
    }

    info!(running, "Waiting for running alerts to finish");
    for handle in alerts {
        if let Err(e) = handle.await {
            error!(error = %e, "Alert task failed");
        }
    }
}

/// Draw one alert and exit
async fn run_single_alert(config: &OverlayConfig, request: AlertRequest) -> Result<()> {
    let renderer = AlertRenderer::from_config(config)?;
    demo::show_one(&renderer, request).await
}

/// Cycle the sample alerts
async fn run_demo(config: &OverlayConfig, repeat: bool) -> Result<()> {
    let renderer = AlertRenderer::from_config(config)?;
    let duration = Duration::from_millis(config.alerts.duration_ms);

    tokio::select! {
        result = demo::run_demo(&renderer, duration, repeat) => {
            let shown = result?;
            info!(shown, "Demo finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Demo interrupted");
        }
    }

    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(config_path: Option<&str>, subcommand: cli::ConfigSubcommand) -> Result<()> {
    use cli::ConfigSubcommand;

    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = OverlayConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate => match OverlayConfig::load(config_path) {
            Ok(_) => {
                println!("Configuration is valid.");
            }
            Err(e) => exit_with(&e),
        },
    }

    Ok(())
}
