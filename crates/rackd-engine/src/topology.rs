//! [`Topology`] – immutable snapshot of controllers, pins, and boards.
//!
//! Built atomically from one configuration document; read-only after
//! construction, so concurrent readers share it as an `Arc` without locking.
//! A RELOAD builds a fresh snapshot and swaps it wholesale — see
//! [`Rack`][crate::rack::Rack].

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;

use rackd_types::{ActiveLevel, Board, Pin, RackError};

// ---------------------------------------------------------------------------
// Configuration document
// ---------------------------------------------------------------------------

/// The JSON configuration document as it appears on disk:
///
/// ```json
/// {
///   "switches": [
///     { "ttySwitchLvl1": [
///         { "pin_name": "D2", "active": "A_LO", "alias": "1A" }
///     ] }
///   ],
///   "boards": [
///     { "name": "samsung_hcp3", "switch": "2D", "dependencies": ["12V_0"] }
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct RackDocument {
    pub switches: Vec<HashMap<String, Vec<PinDef>>>,
    pub boards: Vec<BoardDef>,
}

/// One pin definition under a controller entry.
#[derive(Debug, Deserialize)]
pub struct PinDef {
    pub pin_name: String,
    pub active: ActiveLevel,
    pub alias: String,
}

/// One board definition. An empty `switch` means the board has no
/// controllable switch of its own.
#[derive(Debug, Deserialize)]
pub struct BoardDef {
    pub name: String,
    pub switch: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// One serial-attached controller and its pins in declaration order.
///
/// Pins of a controller are configured together, in this order, as one batch
/// whenever the controller is (re)opened.
#[derive(Debug, Clone)]
pub struct Controller {
    pub id: String,
    pub pins: Vec<Pin>,
}

/// Immutable topology snapshot: pins by alias, controllers by device name,
/// boards by name.
///
/// Boards live in a `BTreeMap` so listings come out in a stable order.
#[derive(Debug, Default)]
pub struct Topology {
    pub pins: HashMap<String, Pin>,
    pub controllers: HashMap<String, Controller>,
    pub boards: BTreeMap<String, Board>,
}

impl Topology {
    /// Parse and validate a raw JSON configuration document.
    ///
    /// # Errors
    ///
    /// [`RackError::Config`] when the document is not valid JSON or violates
    /// a topology invariant (see [`Topology::build`]).
    pub fn from_json(raw: &str) -> Result<Self, RackError> {
        let doc: RackDocument = serde_json::from_str(raw)
            .map_err(|e| RackError::Config(format!("malformed configuration document: {e}")))?;
        Self::build(&doc)
    }

    /// Build a topology from a parsed document.
    ///
    /// # Errors
    ///
    /// [`RackError::Config`] on a duplicate switch alias, duplicate
    /// controller or board name, a non-empty board switch alias that
    /// resolves to no pin, or a self-referential/cyclic dependency chain.
    pub fn build(doc: &RackDocument) -> Result<Self, RackError> {
        let mut topo = Topology::default();

        for entry in &doc.switches {
            for (controller_id, pin_defs) in entry {
                if topo.controllers.contains_key(controller_id) {
                    return Err(RackError::Config(format!(
                        "controller '{controller_id}' defined more than once"
                    )));
                }
                let mut pins = Vec::with_capacity(pin_defs.len());
                for def in pin_defs {
                    let pin = Pin {
                        name: def.pin_name.clone(),
                        controller_id: controller_id.clone(),
                        alias: def.alias.clone(),
                        active_level: def.active,
                    };
                    if topo.pins.insert(def.alias.clone(), pin.clone()).is_some() {
                        return Err(RackError::Config(format!(
                            "duplicate switch alias '{}'",
                            def.alias
                        )));
                    }
                    pins.push(pin);
                }
                topo.controllers.insert(
                    controller_id.clone(),
                    Controller {
                        id: controller_id.clone(),
                        pins,
                    },
                );
            }
        }

        for def in &doc.boards {
            if topo.boards.contains_key(&def.name) {
                return Err(RackError::Config(format!(
                    "board '{}' defined more than once",
                    def.name
                )));
            }
            if !def.switch.is_empty() && !topo.pins.contains_key(&def.switch) {
                return Err(RackError::Config(format!(
                    "board '{}' references undefined switch alias '{}'",
                    def.name, def.switch
                )));
            }
            topo.boards.insert(
                def.name.clone(),
                Board {
                    name: def.name.clone(),
                    switch_alias: def.switch.clone(),
                    dependencies: def.dependencies.clone(),
                },
            );
        }

        topo.check_dependency_cycles()?;
        Ok(topo)
    }

    /// Reject self-referential or cyclic dependency chains at build time so
    /// the sequencer can never chase a loop. Dependencies naming no known
    /// board are not edges; they are tolerated and skipped at execution.
    fn check_dependency_cycles(&self) -> Result<(), RackError> {
        let mut done: HashSet<&str> = HashSet::new();
        for start in self.boards.values() {
            if done.contains(start.name.as_str()) {
                continue;
            }
            let mut stack: Vec<(&Board, usize)> = vec![(start, 0)];
            let mut in_stack: HashSet<&str> = HashSet::new();
            in_stack.insert(start.name.as_str());
            loop {
                let Some(frame) = stack.last_mut() else { break };
                let board = frame.0;
                let idx = frame.1;
                frame.1 += 1;
                match board.dependencies.get(idx) {
                    Some(dep) => {
                        if let Some(next) = self.boards.get(dep) {
                            if in_stack.contains(dep.as_str()) {
                                return Err(RackError::Config(format!(
                                    "cyclic dependency chain through board '{dep}'"
                                )));
                            }
                            if !done.contains(dep.as_str()) {
                                in_stack.insert(next.name.as_str());
                                stack.push((next, 0));
                            }
                        }
                    }
                    None => {
                        in_stack.remove(board.name.as_str());
                        done.insert(board.name.as_str());
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }
}
