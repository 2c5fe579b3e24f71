//! [`CommandHandler`] – text command parsing and dispatch.
//!
//! One command per line. Recognised forms:
//!
//! | Line | Effect |
//! |---|---|
//! | `HELP` | List the zero-argument commands |
//! | `LIST` | List boards and their dependencies |
//! | `RELOAD` | Re-read the configuration file and reconfigure controllers |
//! | `<board> <ON\|OFF\|RESET\|TOGGLE>` | Run a power sequence |
//!
//! [`CommandHandler::process`] returns the reply body only; the session
//! loop appends the `OK\r\n` acknowledgment that terminates every reply.

use std::sync::Arc;

use rackd_engine::{Rack, Sequencer};
use rackd_types::SwitchAction;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A parsed client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Help,
    List,
    Reload,
    /// Two-token form; the action is kept raw so the handler can report
    /// board-membership errors before action-validity errors.
    Action { board: String, action: String },
    /// Any line shape the protocol does not recognise.
    Invalid,
}

impl Request {
    /// Parse one raw line. Trailing CR/LF is stripped; tokens are split on
    /// single spaces, so empty tokens from doubled spaces make the line
    /// invalid rather than being collapsed.
    pub fn parse(line: &str) -> Self {
        let tokens: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(' ').collect();
        match tokens.as_slice() {
            ["HELP"] => Request::Help,
            ["LIST"] => Request::List,
            ["RELOAD"] => Request::Reload,
            [_single] => Request::Invalid,
            [board, action] => Request::Action {
                board: (*board).to_string(),
                action: (*action).to_string(),
            },
            _ => Request::Invalid,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandHandler
// ---------------------------------------------------------------------------

/// Executes parsed requests against the shared [`Rack`].
///
/// Cloned per session; all clones share the same rack and sequencer state
/// through the inner [`Arc`].
#[derive(Clone)]
pub struct CommandHandler {
    rack: Arc<Rack>,
    sequencer: Sequencer,
}

impl CommandHandler {
    pub fn new(rack: Arc<Rack>) -> Self {
        let sequencer = Sequencer::new(Arc::clone(&rack));
        Self { rack, sequencer }
    }

    /// Process one client line and return the reply body.
    ///
    /// Every body line is CRLF-terminated. The caller appends the final
    /// `OK\r\n`, which terminates replies for errors and successes alike.
    pub async fn process(&self, line: &str) -> String {
        match Request::parse(line) {
            Request::Help => "HELP\r\nRELOAD\r\nLIST\r\n".to_string(),
            Request::List => self.list_boards().await,
            Request::Reload => self.reload().await,
            Request::Action { board, action } => self.run_action(&board, &action).await,
            Request::Invalid => "invalid command\r\n".to_string(),
        }
    }

    async fn list_boards(&self) -> String {
        let topo = self.rack.topology().await;
        let mut output = String::new();
        for (name, board) in &topo.boards {
            output.push_str(name);
            output.push_str(" dependencies:\r\n");
            for dependency in &board.dependencies {
                output.push_str("  ");
                output.push_str(dependency);
                output.push_str("\r\n");
            }
        }
        output
    }

    async fn reload(&self) -> String {
        info!("reloading configuration on client request");
        match self.rack.reload().await {
            Ok(()) => "reloading config file\r\n".to_string(),
            Err(e) => {
                warn!(error = %e, "reload failed; previous topology kept");
                format!("reload failed: {e}\r\n")
            }
        }
    }

    /// Board membership is checked before action validity, so an unknown
    /// board with a garbage action reports the unknown board.
    async fn run_action(&self, board: &str, action: &str) -> String {
        let topo = self.rack.topology().await;
        if !topo.boards.contains_key(board) {
            return "unknown switch or command\r\n".to_string();
        }
        drop(topo);

        let Ok(action) = action.parse::<SwitchAction>() else {
            return "invalid switch command\r\n".to_string();
        };

        match self.sequencer.execute(board, action).await {
            Ok(()) => format!("{}\r\n", action.keyword()),
            // The board can vanish between the membership check and the
            // sequencer's own lookup when a RELOAD lands in between.
            Err(e) => {
                warn!(board, error = %e, "sequence aborted");
                "unknown switch or command\r\n".to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
