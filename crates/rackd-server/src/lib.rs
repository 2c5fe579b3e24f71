//! `rackd-server` – The TCP Command Front End
//!
//! Boots a line-oriented TCP server (default `0.0.0.0:6000`) that:
//!
//! 1. **Accepts** any number of concurrent client sessions, each served by
//!    its own task with an independent read-line / reply loop.
//!
//! 2. **Parses** one command per CRLF-terminated line: `HELP`, `LIST`,
//!    `RELOAD`, or `<board> <ON|OFF|RESET|TOGGLE>`, and dispatches power
//!    actions to the [`Sequencer`].
//!
//! 3. **Acknowledges** every reply with a final `OK\r\n` line, for error
//!    bodies and successes alike, so clients can frame replies uniformly.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rackd_engine::Rack;
//! use rackd_server::CommandServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let rack = Arc::new(Rack::new("/etc/rackd/rack.json"));
//!     CommandServer::new(Arc::clone(&rack))
//!         .run()
//!         .await
//!         .expect("command server failed");
//! }
//! ```
//!
//! [`Sequencer`]: rackd_engine::Sequencer

pub mod command;
pub mod server;

pub use command::{CommandHandler, Request};
pub use server::{CommandServer, DEFAULT_LISTEN};
