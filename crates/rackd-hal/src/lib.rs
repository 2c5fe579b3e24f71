//! `rackd-hal` – Serial switch-controller access
//!
//! Owns the open/closed lifecycle of each serial-attached switch controller
//! and speaks its line-oriented configure/command protocol:
//!
//! | Directive | Wire form | Purpose |
//! |---|---|---|
//! | configure | `s <pin-name> <A_HI\|A_LO>\r\n` | set one pin's active polarity |
//! | finish | `s FINISH\r\n` | commit the controller's configuration |
//! | set | `c <pin-name> <0\|1>\r\n` | command one pin deasserted/asserted |
//!
//! Every write is followed by reading one reply line from the device, which
//! is logged but not otherwise validated.

pub mod link;

pub use link::{BAUD_RATE, ControllerLink, LinkState, LinkTransport, READ_TIMEOUT};
