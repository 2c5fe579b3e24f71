//! Kernel hot-plug feed – forwards tty attach events to the binder.
//!
//! Compiled only with the `hotplug-udev` feature. A dedicated OS thread
//! polls a udev netlink monitor filtered to the `tty` subsystem; every
//! `add` event is reduced to the device-link names under `/dev/` and pushed
//! into the binder's channel. Removal events are ignored, a vanished device
//! surfaces as an I/O failure on its next use instead.

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Extract attach candidate names from a raw `DEVLINKS` property value.
///
/// `DEVLINKS` is a space-separated list of symlink paths such as
/// `/dev/ttySwitchLvl1 /dev/serial/by-id/usb-...`. The name a controller is
/// keyed by in the topology is the first path component under `/dev/`, so
/// that is what gets forwarded; names that do not resolve to a known
/// controller are dropped downstream.
fn attach_names(devlinks: &str) -> Vec<String> {
    devlinks
        .split_whitespace()
        .filter_map(|link| link.strip_prefix("/dev/"))
        .filter_map(|rest| rest.split('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Start the monitor thread. Events flow into `events` until the receiver
/// is dropped, at which point the thread exits.
pub fn spawn(events: mpsc::Sender<String>) {
    std::thread::Builder::new()
        .name("rackd-hotplug".to_string())
        .spawn(move || {
            if let Err(e) = monitor_loop(events) {
                warn!(error = %e, "hot-plug monitor stopped");
            }
        })
        .map(drop)
        .unwrap_or_else(|e| warn!(error = %e, "failed to start hot-plug monitor thread"));
}

fn monitor_loop(events: mpsc::Sender<String>) -> std::io::Result<()> {
    let mut socket = udev::MonitorBuilder::new()?
        .match_subsystem("tty")?
        .listen()?;

    loop {
        let Some(event) = socket.iter().next() else {
            std::thread::sleep(std::time::Duration::from_millis(250));
            continue;
        };
        if event.event_type() != udev::EventType::Add {
            continue;
        }
        let device = event.device();
        let Some(devlinks) = device.property_value("DEVLINKS") else {
            continue;
        };
        for name in attach_names(&devlinks.to_string_lossy()) {
            debug!(device = %name, "tty attach observed");
            if events.blocking_send(name).is_err() {
                // Binder gone; nothing left to notify.
                return Ok(());
            }
        }
    }
}
