//! [`Rack`] – shared mutable state of the daemon.
//!
//! Holds the published [`Topology`] snapshot and one mutex-guarded
//! [`ControllerLink`] per controller. The snapshot is swapped atomically on
//! RELOAD so readers never observe a half-updated model; each link's mutex
//! serialises hot-plug (re)configuration with in-flight pin commands on the
//! same controller, so configure directives can never interleave with
//! command directives on the wire.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use rackd_hal::ControllerLink;
use rackd_types::RackError;

use crate::topology::Topology;

/// Shared rack state: configuration path, topology snapshot, controller links.
pub struct Rack {
    config_path: PathBuf,
    topology: RwLock<Arc<Topology>>,
    links: Mutex<HashMap<String, Arc<Mutex<ControllerLink>>>>,
}

impl Rack {
    /// Create a rack with an empty topology, loading from `config_path` on
    /// [`reload`][Self::reload].
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            topology: RwLock::new(Arc::new(Topology::default())),
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Current topology snapshot. Cheap to clone; never blocks writers for
    /// longer than the pointer copy.
    pub async fn topology(&self) -> Arc<Topology> {
        Arc::clone(&*self.topology.read().await)
    }

    /// The link for `controller_id`, if the current topology knows it.
    pub async fn link(&self, controller_id: &str) -> Option<Arc<Mutex<ControllerLink>>> {
        self.links.lock().await.get(controller_id).cloned()
    }

    /// Publish `topology`, discarding the previous snapshot and all previous
    /// links and creating a fresh unopened link per controller.
    ///
    /// Sequences already resolved against the old snapshot complete with the
    /// link handles they were given.
    pub async fn install(&self, topology: Topology) {
        let topo = Arc::new(topology);
        let mut links = HashMap::with_capacity(topo.controllers.len());
        for id in topo.controllers.keys() {
            links.insert(id.clone(), Arc::new(Mutex::new(ControllerLink::new(id))));
        }
        *self.topology.write().await = Arc::clone(&topo);
        *self.links.lock().await = links;
        info!(
            boards = topo.boards.len(),
            controllers = topo.controllers.len(),
            "topology published"
        );
    }

    /// Rebuild the whole model from the configuration document and reopen
    /// every controller.
    ///
    /// # Errors
    ///
    /// [`RackError::Config`] when the document cannot be read or fails
    /// validation; the previous topology and links stay active in that case.
    /// Serial devices that cannot be opened are logged and left inert, not
    /// treated as reload failures.
    pub async fn reload(&self) -> Result<(), RackError> {
        let raw = tokio::fs::read_to_string(&self.config_path).await.map_err(|e| {
            RackError::Config(format!(
                "cannot read configuration '{}': {e}",
                self.config_path.display()
            ))
        })?;
        let topology = Topology::from_json(&raw)?;
        self.install(topology).await;

        let topo = self.topology().await;
        for id in topo.controllers.keys() {
            if let Err(e) = self.configure_controller(id).await {
                warn!(controller = %id, error = %e, "controller left inert");
            }
        }
        Ok(())
    }

    /// Open the serial device for `controller_id` and drive the link through
    /// its pin configuration batch.
    ///
    /// The link's lock is held for the whole open+configure sequence; this is
    /// the single (re)configuration path shared by startup, RELOAD, and the
    /// hot-plug binder, which makes it safe to invoke any number of times.
    ///
    /// # Errors
    ///
    /// [`RackError::Config`] for a controller the topology does not know,
    /// [`RackError::DeviceUnavailable`] when the device cannot be opened,
    /// [`RackError::Io`] when configuration fails mid-protocol.
    pub async fn configure_controller(&self, controller_id: &str) -> Result<(), RackError> {
        let topo = self.topology().await;
        let controller = topo.controllers.get(controller_id).ok_or_else(|| {
            RackError::Config(format!("controller '{controller_id}' not in topology"))
        })?;
        let Some(link) = self.link(controller_id).await else {
            return Err(RackError::Config(format!(
                "no link for controller '{controller_id}'"
            )));
        };
        let mut link = link.lock().await;
        link.open(&format!("/dev/{controller_id}"))?;
        link.configure(&controller.pins).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackd_hal::LinkState;
    use std::io::Write;

    fn write_config(raw: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tmp file");
        file.write_all(raw.as_bytes()).expect("write config");
        file
    }

    const SAMPLE: &str = r#"{
        "switches": [
            { "ttyRackdTestA": [
                { "pin_name": "D2", "active": "A_LO", "alias": "1A" }
            ] }
        ],
        "boards": [
            { "name": "board_a", "switch": "1A", "dependencies": [] }
        ]
    }"#;

    #[tokio::test]
    async fn reload_publishes_topology_and_links() {
        let file = write_config(SAMPLE);
        let rack = Rack::new(file.path());

        // Serial devices are absent on a test host; the reload must still
        // succeed with the controller degraded to inert.
        rack.reload().await.unwrap();

        let topo = rack.topology().await;
        assert_eq!(topo.boards.len(), 1);
        let link = rack.link("ttyRackdTestA").await.expect("link exists");
        assert_eq!(link.lock().await.state(), LinkState::Unavailable);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_model() {
        let file = write_config(SAMPLE);
        let rack = Rack::new(file.path().to_path_buf());
        rack.reload().await.unwrap();

        // Corrupt the document, then reload again.
        std::fs::write(file.path(), "{ not json").unwrap();
        let err = rack.reload().await.unwrap_err();
        assert!(matches!(err, RackError::Config(_)));

        let topo = rack.topology().await;
        assert!(topo.boards.contains_key("board_a"), "old model must survive");
        assert!(rack.link("ttyRackdTestA").await.is_some());
    }

    #[tokio::test]
    async fn missing_config_file_is_a_config_error() {
        let rack = Rack::new("/nonexistent/rackd-test/rack.json");
        let err = rack.reload().await.unwrap_err();
        assert!(matches!(err, RackError::Config(_)));
        assert!(rack.topology().await.boards.is_empty());
    }

    #[tokio::test]
    async fn install_replaces_links_wholesale() {
        let rack = Rack::new("/unused.json");
        rack.install(Topology::from_json(SAMPLE).unwrap()).await;
        let first = rack.link("ttyRackdTestA").await.unwrap();

        rack.install(Topology::from_json(SAMPLE).unwrap()).await;
        let second = rack.link("ttyRackdTestA").await.unwrap();
        assert!(
            !Arc::ptr_eq(&first, &second),
            "links are not reused across a reload"
        );
    }

    #[tokio::test]
    async fn configure_controller_unknown_id_is_an_error() {
        let rack = Rack::new("/unused.json");
        let err = rack.configure_controller("ttyGhost").await.unwrap_err();
        assert!(matches!(err, RackError::Config(_)));
    }
}
