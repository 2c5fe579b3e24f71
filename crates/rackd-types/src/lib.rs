use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Polarity of a controller output pin.
///
/// Configured on the controller with the `s` directive; after that the
/// controller maps logic level `1` to "asserted" according to this polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveLevel {
    /// Pin is asserted when driven high.
    #[serde(rename = "A_HI")]
    ActiveHigh,
    /// Pin is asserted when driven low.
    #[serde(rename = "A_LO")]
    ActiveLow,
}

impl std::fmt::Display for ActiveLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveLevel::ActiveHigh => write!(f, "A_HI"),
            ActiveLevel::ActiveLow => write!(f, "A_LO"),
        }
    }
}

/// One addressable output on one serial switch controller.
///
/// `alias` is the externally visible switch name used in commands and board
/// dependency lists; it must be unique across the whole topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// Controller-local pin name, e.g. `"D2"`. Used on the wire.
    pub name: String,
    /// Device name of the controller hosting this pin, e.g. `"ttySwitchLvl1"`.
    pub controller_id: String,
    /// Externally visible switch alias, e.g. `"3A"`.
    pub alias: String,
    /// Asserted polarity configured on the controller.
    pub active_level: ActiveLevel,
}

/// A controllable unit (compute module, device-under-test) with an optional
/// power switch and a set of named power-supply dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    /// Switch alias driving this board's own power, or `""` when the board
    /// has no controllable switch of its own.
    pub switch_alias: String,
    /// Names of other boards whose switch must be ON before (and OFF only
    /// after) this board's switch, in sequencing order.
    pub dependencies: Vec<String>,
}

impl Board {
    /// Whether the board has a controllable switch of its own.
    pub fn has_switch(&self) -> bool {
        !self.switch_alias.is_empty()
    }
}

/// Board-level power action requested over the command protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchAction {
    /// Power dependencies up in order, soft-start delay, then the board.
    On,
    /// Power the board down first, then its dependencies.
    Off,
    /// Off, delay, on — target switch only.
    Reset,
    /// On, delay, off — a timed pulse on the target switch only.
    Toggle,
}

impl SwitchAction {
    /// The protocol keyword for this action (`"ON"`, `"OFF"`, …).
    pub fn keyword(&self) -> &'static str {
        match self {
            SwitchAction::On => "ON",
            SwitchAction::Off => "OFF",
            SwitchAction::Reset => "RESET",
            SwitchAction::Toggle => "TOGGLE",
        }
    }
}

impl std::str::FromStr for SwitchAction {
    type Err = RackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(SwitchAction::On),
            "OFF" => Ok(SwitchAction::Off),
            "RESET" => Ok(SwitchAction::Reset),
            "TOGGLE" => Ok(SwitchAction::Toggle),
            other => Err(RackError::InvalidAction(other.to_string())),
        }
    }
}

/// Global error type spanning configuration faults, serial device failures,
/// and malformed client requests.
///
/// Nothing here is process-fatal: every variant is caught at its origin and
/// turned into a log entry plus either a degraded component state or a
/// user-facing error string.
#[derive(Error, Debug)]
pub enum RackError {
    /// Malformed or inconsistent configuration document. Fatal to a RELOAD;
    /// the previous working topology, if any, stays active.
    #[error("Config error: {0}")]
    Config(String),

    /// Serial device absent or failed to open. Degrades that controller to
    /// inert; the rest of the system keeps running.
    #[error("Device '{device}' unavailable: {details}")]
    DeviceUnavailable { device: String, details: String },

    /// Write/read failure mid-protocol. Degrades the link to `Unavailable`.
    #[error("I/O failure on '{device}': {details}")]
    Io { device: String, details: String },

    /// Client requested an action on a board the topology does not know.
    #[error("unknown board '{0}'")]
    UnknownBoard(String),

    /// Client requested an action outside ON/OFF/RESET/TOGGLE.
    #[error("invalid action '{0}'")]
    InvalidAction(String),

    /// Client request did not parse as any recognised command shape.
    #[error("invalid command")]
    InvalidCommand,
}
