//! Resilient connection -- bounded reconnect-and-retry around one exchange.
//!
//! State machine: `Unconnected -> Connected -> (Failed -> Connected)*`.
//! An exchange is tried once plus `command_retries` times; every failure
//! closes the socket and the next attempt reconnects. Exhaustion is
//! terminal for that call and reported, distinguishing a peer that
//! answered with a wrong command id from one that simply broke.

use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, warn};

use mfsprobe_protocol::commands::command_name;
use mfsprobe_protocol::ProtocolError;
use mfsprobe_topology::Endpoint;

use crate::config::{ConnectionSection, DispatchSection};
use crate::transport::FrameTransport;

#[derive(Debug, thiserror::Error)]
pub enum CommunicationError {
    #[error("can't connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: ProtocolError,
    },
    #[error("bad answer from {endpoint}")]
    BadAnswer { endpoint: Endpoint },
    #[error("communication with {endpoint} broken: {source}")]
    Broken {
        endpoint: Endpoint,
        #[source]
        source: ProtocolError,
    },
}

impl CommunicationError {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            CommunicationError::Connect { endpoint, .. }
            | CommunicationError::BadAnswer { endpoint }
            | CommunicationError::Broken { endpoint, .. } => *endpoint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Failed,
}

/// Timing and retry budget for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Per-attempt budget of the first connect.
    pub connect_timeout: Duration,
    /// Per-attempt budget of reconnects after a failed exchange.
    pub reconnect_timeout: Duration,
    /// Connect attempts before giving up (at least 1).
    pub connect_attempts: u32,
    /// Per read/write budget.
    pub io_timeout: Duration,
    /// Retries of one exchange after the first attempt.
    pub command_retries: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ConnectionSection::default())
    }
}

impl From<&ConnectionSection> for ConnectionSettings {
    fn from(c: &ConnectionSection) -> Self {
        let connect = Duration::from_millis(c.connect_timeout_ms);
        Self {
            connect_timeout: connect,
            reconnect_timeout: connect,
            connect_attempts: c.connect_attempts.max(1),
            io_timeout: Duration::from_millis(c.io_timeout_ms),
            command_retries: c.command_retries,
        }
    }
}

impl ConnectionSettings {
    /// Settings for fan-out tasks: one connect attempt each, reads bounded
    /// only by the dispatcher deadline.
    pub fn for_dispatch(d: &DispatchSection, command_retries: u32) -> Self {
        Self {
            connect_timeout: Duration::from_millis(d.connect_timeout_ms),
            reconnect_timeout: Duration::from_millis(d.reconnect_timeout_ms),
            connect_attempts: 1,
            io_timeout: d.deadline(),
            command_retries,
        }
    }
}

/// One endpoint, at most one live socket. Connects lazily.
pub struct Connection {
    endpoint: Endpoint,
    settings: ConnectionSettings,
    transport: Option<FrameTransport>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(endpoint: Endpoint, settings: ConnectionSettings) -> Self {
        Self {
            endpoint,
            settings,
            transport: None,
            state: ConnectionState::Unconnected,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Establish the socket if there is none, using the first-connect budget.
    pub async fn connect(&mut self) -> Result<(), CommunicationError> {
        self.open(self.settings.connect_timeout).await
    }

    async fn open(&mut self, per_attempt: Duration) -> Result<(), CommunicationError> {
        if self.transport.is_some() {
            return Ok(());
        }
        let addr = self.endpoint.socket_addr();
        let mut last = None;
        for attempt in 1..=self.settings.connect_attempts {
            match FrameTransport::connect(addr, per_attempt, self.settings.io_timeout).await {
                Ok(t) => {
                    self.transport = Some(t);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Err(e) => {
                    debug!(endpoint = %self.endpoint, attempt, error = %e, "connect failed");
                    last = Some(e);
                }
            }
        }
        self.state = ConnectionState::Failed;
        Err(CommunicationError::Connect {
            endpoint: self.endpoint,
            source: last.unwrap_or(ProtocolError::ConnectionClosed),
        })
    }

    /// Drop the socket. The next command reconnects.
    pub fn close(&mut self) {
        self.transport = None;
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Unconnected;
        }
    }

    /// Best-effort graceful close.
    pub async fn shutdown(&mut self) {
        if let Some(t) = self.transport.take() {
            t.shutdown().await;
        }
        self.state = ConnectionState::Unconnected;
    }

    /// One request/reply exchange with transparent retry.
    ///
    /// A connect failure while (re)establishing the socket ends the call
    /// immediately: `BadAnswer` if an earlier attempt already saw a protocol
    /// violation, `Connect` otherwise.
    pub async fn command(
        &mut self,
        cmd_out: u32,
        cmd_in: u32,
        payload: impl Into<Bytes>,
    ) -> Result<Bytes, CommunicationError> {
        let payload = payload.into();
        let mut violated = false;
        let mut last = ProtocolError::ConnectionClosed;

        for attempt in 0..=self.settings.command_retries {
            let budget = if attempt == 0 {
                self.settings.connect_timeout
            } else {
                self.settings.reconnect_timeout
            };
            if let Err(e) = self.open(budget).await {
                if violated {
                    warn!(endpoint = %self.endpoint, error = %e, "reconnect failed after bad answer");
                    return Err(CommunicationError::BadAnswer {
                        endpoint: self.endpoint,
                    });
                }
                return Err(e);
            }
            let Some(transport) = self.transport.as_mut() else {
                continue;
            };

            match transport.exchange(cmd_out, cmd_in, payload.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    violated |= e.is_violation();
                    debug!(
                        endpoint = %self.endpoint,
                        command = command_name(cmd_out),
                        attempt,
                        error = %e,
                        "exchange failed"
                    );
                    self.transport = None;
                    self.state = ConnectionState::Failed;
                    last = e;
                }
            }
        }

        if violated {
            Err(CommunicationError::BadAnswer {
                endpoint: self.endpoint,
            })
        } else {
            Err(CommunicationError::Broken {
                endpoint: self.endpoint,
                source: last,
            })
        }
    }

    /// Several payloads in sequence over the same connection. Each one gets
    /// its own retry budget; the first exhausted one fails the batch.
    pub async fn command_batch(
        &mut self,
        cmd_out: u32,
        cmd_in: u32,
        payloads: &[Bytes],
    ) -> Result<Vec<Bytes>, CommunicationError> {
        let mut replies = Vec::with_capacity(payloads.len());
        for p in payloads {
            replies.push(self.command(cmd_out, cmd_in, p.clone()).await?);
        }
        Ok(replies)
    }
}
