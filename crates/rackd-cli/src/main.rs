//! `rackd` – Rack Power Control Daemon
//!
//! This binary wires the whole stack together:
//!
//! 1. Loads daemon settings from `/etc/rackd/rackd.toml` (optional; defaults
//!    apply when absent, `RACKD_*` variables override).
//! 2. Loads the rack topology document and configures every reachable
//!    switch controller.
//! 3. Starts the hot-plug binder so controllers attached later are
//!    configured on arrival (real kernel events need the `hotplug-udev`
//!    feature).
//! 4. Serves the TCP command protocol until Ctrl-C.

mod settings;

#[cfg(feature = "hotplug-udev")]
mod hotplug_feed;

use std::sync::Arc;

use rackd_engine::{HotplugBinder, Rack};
use rackd_server::CommandServer;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // Initialise tracing-subscriber using RUST_LOG (defaults to "info").
    // Set RACKD_LOG_FORMAT=json to emit newline-delimited JSON logs suitable
    // for log aggregators.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("RACKD_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    // ── Settings ──────────────────────────────────────────────────────────
    let settings = match settings::load() {
        Ok(Some(s)) => {
            info!(path = %settings::settings_path().display(), "settings loaded");
            s
        }
        Ok(None) => {
            info!("no settings file found; using defaults");
            settings::Settings::default()
        }
        Err(e) => {
            warn!(error = %e, "settings unreadable; using defaults");
            settings::Settings::default()
        }
    };

    // ── Rack topology ─────────────────────────────────────────────────────
    let rack = Arc::new(Rack::new(settings.rack_config.clone()));
    match rack.reload().await {
        Ok(()) => info!(config = %settings.rack_config.display(), "topology loaded"),
        Err(e) => warn!(
            config = %settings.rack_config.display(),
            error = %e,
            "topology load failed; starting with an empty model until RELOAD"
        ),
    }

    // ── Hot-plug binder ───────────────────────────────────────────────────
    let (attach_tx, attach_rx) = mpsc::channel::<String>(16);
    tokio::spawn(HotplugBinder::new(Arc::clone(&rack)).run(attach_rx));

    #[cfg(feature = "hotplug-udev")]
    hotplug_feed::spawn(attach_tx);
    #[cfg(not(feature = "hotplug-udev"))]
    {
        info!("built without hotplug-udev; controllers attach only via RELOAD");
        drop(attach_tx);
    }

    // ── Command server ────────────────────────────────────────────────────
    let server = CommandServer::new(Arc::clone(&rack)).with_listen_addr(settings.listen_addr);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "command server failed");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received; shutting down");
        }
    }
}
