//! `rackd-engine` – Switch Control & Sequencing
//!
//! The core of the rack power daemon. It resolves board-level power actions
//! into ordered pin commands on serial switch controllers, honouring
//! power-supply dependency order and soft-start timing.
//!
//! # Modules
//!
//! - [`topology`] – [`Topology`][topology::Topology]: immutable snapshot of
//!   controllers, pins, boards, and dependency edges, built atomically from
//!   one JSON configuration document and validated (alias collisions,
//!   unresolved switch aliases, cyclic dependency chains).
//! - [`rack`] – [`Rack`][rack::Rack]: the shared mutable state — the
//!   published topology snapshot plus one lock-guarded
//!   [`ControllerLink`][rackd_hal::ControllerLink] per controller — and the
//!   RELOAD operation that rebuilds both wholesale.
//! - [`sequencer`] – [`Sequencer`][sequencer::Sequencer]: translates one
//!   board-level ON/OFF/RESET/TOGGLE into the ordered series of pin commands,
//!   best-effort across hardware failures.
//! - [`hotplug`] – [`HotplugBinder`][hotplug::HotplugBinder]: consumes
//!   device-attach notifications and (re)configures the matching controller,
//!   re-running the exact startup configuration sequence.

pub mod hotplug;
pub mod rack;
pub mod sequencer;
pub mod topology;

pub use hotplug::HotplugBinder;
pub use rack::Rack;
pub use sequencer::{SOFT_START_DELAY, Sequencer};
pub use topology::{Controller, RackDocument, Topology};
