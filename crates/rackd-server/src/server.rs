//! [`CommandServer`] – TCP line-command front end.
//!
//! Listens on `0.0.0.0:6000` (configurable via
//! [`CommandServer::with_listen_addr`]). Each accepted connection gets its
//! own task running a read-line / reply loop; every reply is terminated by
//! `OK\r\n` whether the command succeeded or not.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use rackd_engine::Rack;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::command::CommandHandler;

/// Default listen address for the command protocol.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:6000";

/// Every reply line batch closes with this acknowledgment.
const ACK: &str = "OK\r\n";

// ---------------------------------------------------------------------------
// CommandServer
// ---------------------------------------------------------------------------

/// TCP server exposing the command protocol over a shared [`Rack`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rackd_engine::Rack;
/// use rackd_server::CommandServer;
///
/// #[tokio::main]
/// async fn main() {
///     let rack = Arc::new(Rack::new("/etc/rackd/rack.json"));
///     CommandServer::new(Arc::clone(&rack))
///         .run()
///         .await
///         .expect("command server failed");
/// }
/// ```
pub struct CommandServer {
    rack: Arc<Rack>,
    listen_addr: String,
}

impl CommandServer {
    /// Create a server over `rack` on the [`DEFAULT_LISTEN`] address.
    pub fn new(rack: Arc<Rack>) -> Self {
        Self {
            rack,
            listen_addr: DEFAULT_LISTEN.to_string(),
        }
    }

    /// Override the listen address (builder-style).
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Return the configured listen address.
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    /// Bind the listen address and serve until the process exits.
    ///
    /// # Errors
    ///
    /// Returns the bind error; accept errors are logged and survived.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(addr = %self.listen_addr, "command server listening");
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let handler = CommandHandler::new(Arc::clone(&self.rack));
        let sessions: Arc<Mutex<HashSet<SocketAddr>>> = Arc::new(Mutex::new(HashSet::new()));

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = handler.clone();
                    let sessions = Arc::clone(&sessions);
                    tokio::spawn(async move {
                        let active = {
                            let mut set = sessions.lock().await;
                            set.insert(peer);
                            set.len()
                        };
                        info!(%peer, active, "session opened");
                        if let Err(e) = handle_session(stream, peer, handler).await {
                            warn!(%peer, error = %e, "session ended with error");
                        }
                        let active = {
                            let mut set = sessions.lock().await;
                            set.remove(&peer);
                            set.len()
                        };
                        info!(%peer, active, "session closed");
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-session handler
// ---------------------------------------------------------------------------

async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    handler: CommandHandler,
) -> Result<(), std::io::Error> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        if lines.read_line(&mut line).await? == 0 {
            // EOF: client closed its side.
            return Ok(());
        }
        debug!(%peer, command = line.trim_end(), "received command");
        let mut reply = handler.process(&line).await;
        reply.push_str(ACK);
        write_half.write_all(reply.as_bytes()).await?;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rackd_engine::Topology;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const SAMPLE: &str = r#"{
        "switches": [
            { "ttyNet": [
                { "pin_name": "P1", "active": "A_HI", "alias": "s1" }
            ] }
        ],
        "boards": [
            { "name": "A", "switch": "s1", "dependencies": [] }
        ]
    }"#;

    async fn spawn_server() -> SocketAddr {
        let rack = Arc::new(Rack::new("/unused.json"));
        rack.install(Topology::from_json(SAMPLE).unwrap()).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(CommandServer::new(rack).serve(listener));
        addr
    }

    async fn roundtrip(addr: SocketAddr, request: &str, expected: &str) {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(request.as_bytes()).await.unwrap();

        let mut reply = Vec::new();
        while !reply.ends_with(b"OK\r\n") {
            let mut buf = [0u8; 256];
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed before acknowledging");
            reply.extend_from_slice(&buf[..n]);
        }
        assert_eq!(String::from_utf8(reply).unwrap(), expected);
    }

    #[test]
    fn default_listen_is_port_6000() {
        let rack = Arc::new(Rack::new("/unused.json"));
        let server = CommandServer::new(rack);
        assert_eq!(server.listen_addr(), "0.0.0.0:6000");
    }

    #[test]
    fn with_listen_addr_overrides_default() {
        let rack = Arc::new(Rack::new("/unused.json"));
        let server = CommandServer::new(rack).with_listen_addr("127.0.0.1:7000");
        assert_eq!(server.listen_addr(), "127.0.0.1:7000");
    }

    #[tokio::test]
    async fn help_over_tcp_ends_with_ok() {
        let addr = spawn_server().await;
        roundtrip(addr, "HELP\r\n", "HELP\r\nRELOAD\r\nLIST\r\nOK\r\n").await;
    }

    #[tokio::test]
    async fn error_replies_also_end_with_ok() {
        let addr = spawn_server().await;
        roundtrip(addr, "garbage line here\r\n", "invalid command\r\nOK\r\n").await;
    }

    #[tokio::test]
    async fn session_handles_multiple_commands() {
        let addr = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        for (request, expected) in [
            ("HELP\r\n", "HELP\r\nRELOAD\r\nLIST\r\nOK\r\n"),
            ("LIST\r\n", "A dependencies:\r\nOK\r\n"),
        ] {
            client.write_all(request.as_bytes()).await.unwrap();
            let mut reply = Vec::new();
            while !reply.ends_with(b"OK\r\n") {
                let mut buf = [0u8; 256];
                let n = client.read(&mut buf).await.unwrap();
                assert!(n > 0);
                reply.extend_from_slice(&buf[..n]);
            }
            assert_eq!(String::from_utf8(reply).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn concurrent_sessions_are_served_independently() {
        let addr = spawn_server().await;
        let a = tokio::spawn(roundtrip(addr, "HELP\r\n", "HELP\r\nRELOAD\r\nLIST\r\nOK\r\n"));
        let b = tokio::spawn(roundtrip(addr, "LIST\r\n", "A dependencies:\r\nOK\r\n"));
        a.await.unwrap();
        b.await.unwrap();
    }
}
