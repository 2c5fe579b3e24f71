//! [`Sequencer`] – board actions as ordered pin command series.
//!
//! ON powers dependencies first (declared order), waits the soft-start
//! delay, then the board itself; OFF is the exact inverse. RESET and TOGGLE
//! pulse the target switch only. Hardware failures never abort a sequence:
//! the remaining steps still run, because a half-completed teardown can
//! leave dependencies in a worse state than finishing the list.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use rackd_types::{RackError, SwitchAction};

use crate::rack::Rack;
use crate::topology::Topology;

/// Fixed pause between enabling a dependency and its dependent (and between
/// the two halves of RESET/TOGGLE). Lets upstream rails settle before the
/// downstream board draws inrush current. Not configurable per board.
pub const SOFT_START_DELAY: Duration = Duration::from_secs(1);

/// Translates board-level actions into ordered [`ControllerLink`] commands.
///
/// [`ControllerLink`]: rackd_hal::ControllerLink
#[derive(Clone)]
pub struct Sequencer {
    rack: Arc<Rack>,
}

impl Sequencer {
    pub fn new(rack: Arc<Rack>) -> Self {
        Self { rack }
    }

    /// Execute one board-level action.
    ///
    /// The whole sequence runs against the topology snapshot resolved here;
    /// a concurrent RELOAD does not redirect an in-flight sequence.
    ///
    /// # Errors
    ///
    /// [`RackError::UnknownBoard`] when `board_name` is not in the topology.
    /// Individual pin command failures are logged, not returned: completing
    /// the ordered list is the contract, per-pin hardware success is not.
    pub async fn execute(&self, board_name: &str, action: SwitchAction) -> Result<(), RackError> {
        let topo = self.rack.topology().await;
        let board = topo
            .boards
            .get(board_name)
            .ok_or_else(|| RackError::UnknownBoard(board_name.to_string()))?;
        info!(board = %board.name, action = action.keyword(), "executing switch action");

        match action {
            SwitchAction::On => {
                for dep in &board.dependencies {
                    // Tolerant lookup: a dependency naming no known board is
                    // treated as "no dependency".
                    if let Some(dep_board) = topo.boards.get(dep) {
                        self.set_switch(&topo, &dep_board.switch_alias, true).await;
                    }
                }
                sleep(SOFT_START_DELAY).await;
                self.set_switch(&topo, &board.switch_alias, true).await;
            }
            SwitchAction::Off => {
                // De-power the board before removing its supplies.
                self.set_switch(&topo, &board.switch_alias, false).await;
                for dep in &board.dependencies {
                    if let Some(dep_board) = topo.boards.get(dep) {
                        self.set_switch(&topo, &dep_board.switch_alias, false).await;
                    }
                }
            }
            SwitchAction::Reset => {
                self.set_switch(&topo, &board.switch_alias, false).await;
                sleep(SOFT_START_DELAY).await;
                self.set_switch(&topo, &board.switch_alias, true).await;
            }
            SwitchAction::Toggle => {
                self.set_switch(&topo, &board.switch_alias, true).await;
                sleep(SOFT_START_DELAY).await;
                self.set_switch(&topo, &board.switch_alias, false).await;
            }
        }
        Ok(())
    }

    /// Drive one switch alias to `level`, best-effort. An empty alias is the
    /// "no controllable switch" sentinel and generates nothing.
    async fn set_switch(&self, topo: &Topology, alias: &str, level: bool) {
        if alias.is_empty() {
            return;
        }
        let Some(pin) = topo.pins.get(alias) else {
            warn!(alias, "switch alias resolves to no pin; skipping");
            return;
        };
        let Some(link) = self.rack.link(&pin.controller_id).await else {
            warn!(alias, controller = %pin.controller_id, "no link for controller; skipping");
            return;
        };
        let mut link = link.lock().await;
        debug!(alias, controller = %pin.controller_id, pin = %pin.name, level, "setting switch");
        if let Err(e) = link.command(&pin.name, level).await {
            warn!(alias, error = %e, "pin command failed; continuing sequence");
        }
    }
}
