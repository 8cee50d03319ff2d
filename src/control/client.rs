//! Line-oriented Tor control-port client
//!
//! Speaks the minimal subset of the control protocol the orchestrator
//! needs: `AUTHENTICATE`, `SIGNAL NEWNYM`, `QUIT`. Replies are single
//! `<code> <text>` lines; 250 is success.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use super::ControlSession;
use crate::error::{Result, TorPoolError};

/// Tor accepts at most one NEWNYM per ten seconds; requests inside the
/// window are silently deferred, so availability is tracked locally from
/// the last accepted signal.
const NEWNYM_COOLDOWN: Duration = Duration::from_secs(10);

/// One authenticated control-port connection
#[derive(Debug)]
pub struct TorControlSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    last_newnym: Option<Instant>,
    closed: bool,
}

impl TorControlSession {
    /// Connect to a control port and authenticate
    ///
    /// Uses null authentication, for control ports without a cookie or
    /// password configured.
    pub async fn attach(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            TorPoolError::ControlAuth(format!("control port {} unreachable: {}", addr, e))
        })?;
        let (read_half, write_half) = stream.into_split();

        let mut session = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            last_newnym: None,
            closed: false,
        };

        let reply = session.command("AUTHENTICATE").await?;
        if !reply.starts_with("250") {
            return Err(TorPoolError::ControlAuth(format!(
                "{}: handshake rejected: {}",
                addr, reply
            )));
        }

        debug!("Authenticated control session on {}", addr);
        Ok(session)
    }

    /// Send one command and read the single reply line
    async fn command(&mut self, cmd: &str) -> Result<String> {
        self.writer.write_all(cmd.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;

        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(TorPoolError::ControlProtocol(
                "control connection closed by peer".into(),
            ));
        }
        Ok(line.trim_end().to_string())
    }
}

#[async_trait]
impl ControlSession for TorControlSession {
    fn newnym_available(&self) -> bool {
        match self.last_newnym {
            Some(at) => at.elapsed() >= NEWNYM_COOLDOWN,
            None => true,
        }
    }

    async fn rotate(&mut self) -> Result<()> {
        let reply = self.command("SIGNAL NEWNYM").await?;
        if !reply.starts_with("250") {
            return Err(TorPoolError::ControlProtocol(format!(
                "NEWNYM refused: {}",
                reply
            )));
        }
        self.last_newnym = Some(Instant::now());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Best effort; the peer may already be gone during teardown.
        let _ = self.writer.write_all(b"QUIT\r\n").await;
        let _ = self.writer.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal control-port stand-in: answers AUTHENTICATE and SIGNAL
    /// with the configured reply lines, QUIT with 250.
    async fn fake_control_port(auth_reply: &'static str, signal_reply: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let reply = if line.starts_with("AUTHENTICATE") {
                    auth_reply
                } else if line.starts_with("SIGNAL") {
                    signal_reply
                } else {
                    "250 closing connection"
                };
                if write_half
                    .write_all(format!("{}\r\n", reply).as_bytes())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_attach_authenticates() {
        let addr = fake_control_port("250 OK", "250 OK").await;
        let session = TorControlSession::attach(&addr).await.unwrap();
        assert!(session.newnym_available());
    }

    #[tokio::test]
    async fn test_attach_rejected_handshake() {
        let addr = fake_control_port("515 Bad authentication", "250 OK").await;
        let err = TorControlSession::attach(&addr).await.unwrap_err();
        assert!(matches!(err, TorPoolError::ControlAuth(_)));
    }

    #[tokio::test]
    async fn test_attach_unreachable_port() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = TorControlSession::attach(&addr).await.unwrap_err();
        assert!(matches!(err, TorPoolError::ControlAuth(_)));
    }

    #[tokio::test]
    async fn test_rotate_starts_cooldown() {
        let addr = fake_control_port("250 OK", "250 OK").await;
        let mut session = TorControlSession::attach(&addr).await.unwrap();

        assert!(session.newnym_available());
        session.rotate().await.unwrap();
        assert!(!session.newnym_available());
    }

    #[tokio::test]
    async fn test_rotate_refused_is_error() {
        let addr = fake_control_port("250 OK", "551 Internal error").await;
        let mut session = TorControlSession::attach(&addr).await.unwrap();

        let err = session.rotate().await.unwrap_err();
        assert!(matches!(err, TorPoolError::ControlProtocol(_)));
        // A refused signal does not start the cooldown.
        assert!(session.newnym_available());
    }

    #[tokio::test]
    async fn test_close_twice_is_ok() {
        let addr = fake_control_port("250 OK", "250 OK").await;
        let mut session = TorControlSession::attach(&addr).await.unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();
    }
}
