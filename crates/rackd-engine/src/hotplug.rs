//! [`HotplugBinder`] – device-attach notifications to link (re)configuration.
//!
//! Attach events arrive as resolved device names (e.g. `"ttySwitchLvl1"`)
//! on an mpsc channel and are consumed strictly one at a time, so no two
//! bindings run concurrently. Binding re-runs the exact configuration
//! sequence used at startup and RELOAD, which makes it idempotent and safe
//! to invoke any number of times for the same device.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::rack::Rack;

/// Consumes attach events and (re)configures matching controllers.
pub struct HotplugBinder {
    rack: Arc<Rack>,
}

impl HotplugBinder {
    pub fn new(rack: Arc<Rack>) -> Self {
        Self { rack }
    }

    /// Drain `events` sequentially until the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<String>) {
        while let Some(device) = events.recv().await {
            self.on_attach(&device).await;
        }
        debug!("hot-plug event channel closed");
    }

    /// Handle one device-attach notification.
    ///
    /// Devices the topology does not know are logged and ignored; they are
    /// simply unrelated to this system. Known devices get their link opened
    /// and configured under the link's lock, so an in-flight sequence on the
    /// same controller cannot interleave with the configure batch.
    pub async fn on_attach(&self, device: &str) {
        let topo = self.rack.topology().await;
        if !topo.controllers.contains_key(device) {
            debug!(device, "attached device is not a known controller; ignoring");
            return;
        }
        info!(device, "controller attached; configuring");
        if let Err(e) = self.rack.configure_controller(device).await {
            warn!(device, error = %e, "hot-plug configuration failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Topology;
    use rackd_hal::LinkState;

    const SAMPLE: &str = r#"{
        "switches": [
            { "ttyHot": [
                { "pin_name": "D2", "active": "A_LO", "alias": "1A" }
            ] }
        ],
        "boards": []
    }"#;

    async fn rack() -> Arc<Rack> {
        let rack = Arc::new(Rack::new("/unused.json"));
        rack.install(Topology::from_json(SAMPLE).unwrap()).await;
        rack
    }

    #[tokio::test]
    async fn unknown_device_is_ignored_without_mutating_links() {
        let rack = rack().await;
        let binder = HotplugBinder::new(Arc::clone(&rack));

        binder.on_attach("ttyUnrelated").await;

        assert!(rack.link("ttyUnrelated").await.is_none());
        let link = rack.link("ttyHot").await.unwrap();
        assert_eq!(link.lock().await.state(), LinkState::Unopened);
    }

    #[tokio::test]
    async fn known_device_runs_the_open_configure_sequence() {
        let rack = rack().await;
        let binder = HotplugBinder::new(Arc::clone(&rack));

        // No real serial device on a test host: the open attempt fails and
        // the link degrades, proving the bind path ran.
        binder.on_attach("ttyHot").await;

        let link = rack.link("ttyHot").await.unwrap();
        assert_eq!(link.lock().await.state(), LinkState::Unavailable);
    }

    #[tokio::test]
    async fn repeated_attach_reaches_the_same_link_state() {
        let rack = rack().await;
        let binder = HotplugBinder::new(Arc::clone(&rack));

        binder.on_attach("ttyHot").await;
        binder.on_attach("ttyHot").await;

        let link = rack.link("ttyHot").await.unwrap();
        assert_eq!(link.lock().await.state(), LinkState::Unavailable);
    }

    #[tokio::test]
    async fn run_drains_the_channel_and_exits_on_close() {
        let rack = rack().await;
        let binder = HotplugBinder::new(Arc::clone(&rack));
        let (tx, rx) = mpsc::channel(4);

        tx.send("ttyUnrelated".to_string()).await.unwrap();
        tx.send("ttyHot".to_string()).await.unwrap();
        drop(tx);

        binder.run(rx).await;

        let link = rack.link("ttyHot").await.unwrap();
        assert_eq!(link.lock().await.state(), LinkState::Unavailable);
    }
}
