//! [`ControllerLink`] – one serial device handle and its protocol driver.
//!
//! A link moves through `Unopened → Available → Unavailable`. Any I/O
//! failure while `Available` degrades the link to `Unavailable`, after which
//! every directive is a silent no-op. There is no automatic retry or
//! reopen; a fresh [`ControllerLink::open`] (normally triggered by a
//! hot-plug event) is the only path back to `Available`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::SerialStream;
use tracing::{debug, warn};

use rackd_types::{Pin, RackError};

/// Fixed baud rate for every switch controller.
pub const BAUD_RATE: u32 = 9_600;

/// How long to wait for a controller's reply line before giving up on it.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1_500);

/// Byte stream a link can drive its protocol over.
///
/// Real deployments use a [`SerialStream`]; tests attach an in-memory duplex
/// pipe. Keeping the seam this wide also allows e.g. TCP serial bridges.
pub trait LinkTransport: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkTransport for T {}

/// Lifecycle state of a [`ControllerLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No open attempt has been made yet.
    Unopened,
    /// Device is open and the protocol can be driven.
    Available,
    /// Device failed to open or an I/O error occurred; directives are
    /// no-ops until a fresh `open` supersedes this state.
    Unavailable,
}

/// Owns exactly one serial controller device and speaks its protocol.
pub struct ControllerLink {
    id: String,
    state: LinkState,
    port: Option<Box<dyn LinkTransport>>,
    read_buf: Vec<u8>,
}

impl ControllerLink {
    /// Create an unopened link for the controller named `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: LinkState::Unopened,
            port: None,
            read_buf: Vec::with_capacity(128),
        }
    }

    /// Controller device name this link belongs to.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Attempt to open the serial device at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RackError::DeviceUnavailable`] when the device cannot be
    /// opened; the link is left `Unavailable` and the system keeps running
    /// with this controller's pins inert.
    pub fn open(&mut self, path: &str) -> Result<(), RackError> {
        let builder = tokio_serial::new(path, BAUD_RATE).timeout(READ_TIMEOUT);
        match SerialStream::open(&builder) {
            Ok(port) => {
                debug!(controller = %self.id, path, "serial device opened");
                self.attach(Box::new(port));
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Unavailable;
                self.port = None;
                Err(RackError::DeviceUnavailable {
                    device: self.id.clone(),
                    details: e.to_string(),
                })
            }
        }
    }

    /// Attach an already-open transport, making the link `Available`.
    ///
    /// This is the seam [`open`][Self::open] goes through and the way tests
    /// drive the protocol over an in-memory pipe.
    pub fn attach(&mut self, port: Box<dyn LinkTransport>) {
        self.port = Some(port);
        self.read_buf.clear();
        self.state = LinkState::Available;
    }

    /// Send the configure directive for each pin in declaration order, then
    /// the finish directive committing the controller's configuration.
    ///
    /// Best-effort: a failed directive degrades the link (turning the rest
    /// of the batch into no-ops) but the batch is still walked to the end.
    ///
    /// # Errors
    ///
    /// Returns the first [`RackError::Io`] encountered, if any.
    pub async fn configure(&mut self, pins: &[Pin]) -> Result<(), RackError> {
        let mut first_err = None;
        for pin in pins {
            debug!(
                controller = %self.id,
                pin = %pin.name,
                active = %pin.active_level,
                "configuring pin"
            );
            let line = format!("s {} {}\r\n", pin.name, pin.active_level);
            if let Err(e) = self.transact(&line).await {
                warn!(controller = %self.id, pin = %pin.name, error = %e, "pin configure failed");
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.transact("s FINISH\r\n").await {
            warn!(controller = %self.id, error = %e, "configuration commit failed");
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Command one pin to the requested logic level (`true` = asserted).
    ///
    /// The controller applies the polarity configured for the pin, so the
    /// wire level is always `1` for asserted and `0` for deasserted.
    ///
    /// # Errors
    ///
    /// Returns [`RackError::Io`] on a write/read failure. A no-op returning
    /// `Ok` while the link is not `Available`.
    pub async fn command(&mut self, pin_name: &str, level: bool) -> Result<(), RackError> {
        let line = format!("c {} {}\r\n", pin_name, u8::from(level));
        self.transact(&line).await
    }

    /// Write one directive line and read (and log) one reply line.
    async fn transact(&mut self, line: &str) -> Result<(), RackError> {
        if self.state != LinkState::Available {
            return Ok(());
        }
        let Some(port) = self.port.as_mut() else {
            return Ok(());
        };

        if let Err(e) = port.write_all(line.as_bytes()).await {
            self.state = LinkState::Unavailable;
            return Err(RackError::Io {
                device: self.id.clone(),
                details: e.to_string(),
            });
        }

        match timeout(READ_TIMEOUT, read_reply(&mut **port, &mut self.read_buf)).await {
            Ok(Ok(reply)) => {
                debug!(controller = %self.id, reply = %reply, "controller reply");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = LinkState::Unavailable;
                Err(RackError::Io {
                    device: self.id.clone(),
                    details: e.to_string(),
                })
            }
            // The original firmware sometimes stays quiet; a missing reply
            // line is tolerated, matching the fixed pyserial read timeout.
            Err(_elapsed) => {
                debug!(controller = %self.id, "no reply within timeout");
                Ok(())
            }
        }
    }
}

/// Read bytes until a LF, buffering any overshoot for the next reply.
async fn read_reply(
    port: &mut (dyn LinkTransport + '_),
    buf: &mut Vec<u8>,
) -> std::io::Result<String> {
    loop {
        if let Some(idx) = buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buf.drain(..=idx).collect();
            return Ok(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        let mut chunk = [0u8; 64];
        let n = port.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackd_types::ActiveLevel;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn pin(name: &str, alias: &str, level: ActiveLevel) -> Pin {
        Pin {
            name: name.to_string(),
            controller_id: "ttySwitchLvl1".to_string(),
            alias: alias.to_string(),
            active_level: level,
        }
    }

    /// Scripted device: records every directive line and answers `ok`.
    fn spawn_device(harness: DuplexStream) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(harness);
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                seen_clone.lock().unwrap().push(line);
                if write_half.write_all(b"ok\r\n").await.is_err() {
                    break;
                }
            }
        });
        seen
    }

    fn attached_link() -> (ControllerLink, Arc<Mutex<Vec<String>>>) {
        let (port, harness) = tokio::io::duplex(256);
        let seen = spawn_device(harness);
        let mut link = ControllerLink::new("ttySwitchLvl1");
        link.attach(Box::new(port));
        (link, seen)
    }

    #[tokio::test]
    async fn configure_sends_pin_directives_then_finish() {
        let (mut link, seen) = attached_link();
        let pins = vec![
            pin("D2", "1A", ActiveLevel::ActiveLow),
            pin("D3", "1B", ActiveLevel::ActiveHigh),
        ];

        link.configure(&pins).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            ["s D2 A_LO", "s D3 A_HI", "s FINISH"],
            "pins must be configured in declaration order before FINISH"
        );
        assert_eq!(link.state(), LinkState::Available);
    }

    #[tokio::test]
    async fn command_sends_set_directive_with_logic_level() {
        let (mut link, seen) = attached_link();

        link.command("D2", true).await.unwrap();
        link.command("D2", false).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["c D2 1", "c D2 0"]);
    }

    #[tokio::test]
    async fn repeated_configure_is_idempotent_on_the_wire() {
        let (mut link, seen) = attached_link();
        let pins = vec![pin("D2", "1A", ActiveLevel::ActiveLow)];

        link.configure(&pins).await.unwrap();
        link.configure(&pins).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            ["s D2 A_LO", "s FINISH", "s D2 A_LO", "s FINISH"]
        );
    }

    #[tokio::test]
    async fn unopened_link_directives_are_noops() {
        let mut link = ControllerLink::new("ttySwitchLvl1");
        assert_eq!(link.state(), LinkState::Unopened);
        link.command("D2", true).await.unwrap();
        link.configure(&[pin("D2", "1A", ActiveLevel::ActiveLow)])
            .await
            .unwrap();
        assert_eq!(link.state(), LinkState::Unopened);
    }

    #[tokio::test]
    async fn open_failure_degrades_link_to_unavailable() {
        let mut link = ControllerLink::new("ttyMissing");
        let err = link.open("/dev/ttyMissing-rackd-test").unwrap_err();
        assert!(matches!(err, RackError::DeviceUnavailable { .. }));
        assert_eq!(link.state(), LinkState::Unavailable);
        // Subsequent commands are silently skipped, not retried.
        link.command("D2", true).await.unwrap();
    }

    #[tokio::test]
    async fn io_failure_degrades_link_and_later_commands_are_noops() {
        let (port, harness) = tokio::io::duplex(256);
        drop(harness); // device vanished
        let mut link = ControllerLink::new("ttySwitchLvl1");
        link.attach(Box::new(port));

        let err = link.command("D2", true).await.unwrap_err();
        assert!(matches!(err, RackError::Io { .. }));
        assert_eq!(link.state(), LinkState::Unavailable);

        link.command("D2", false).await.unwrap();
        assert_eq!(link.state(), LinkState::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_is_tolerated_after_read_timeout() {
        // Keep the harness end alive but never reply.
        let (port, _harness) = tokio::io::duplex(256);
        let mut link = ControllerLink::new("ttySwitchLvl1");
        link.attach(Box::new(port));

        link.command("D2", true).await.unwrap();
        assert_eq!(link.state(), LinkState::Available);
    }
}
