//! Master connection -- a `Connection` that knows the peer's version.
//!
//! The version comes from the node-info probe that selected the master;
//! until it is set the connection reports `ProtocolVersion::UNKNOWN` and
//! every version gate fails closed. Likewise requests that change cluster
//! state are only sent once the peer is known to hold the leader role.

use bytes::Bytes;
use std::net::Ipv4Addr;
use tracing::{info, warn};

use mfsprobe_protocol::admin::{encode_session_remove, ChunkServerCommand, CommandStatus};
use mfsprobe_protocol::commands::{
    CLTOMA_CSSERV_COMMAND, CLTOMA_MLOG_LIST, CLTOMA_SESSION_COMMAND, MATOCL_CSSERV_COMMAND,
    MATOCL_MLOG_LIST, MATOCL_SESSION_COMMAND,
};
use mfsprobe_protocol::metaloggers::MetaloggerEntry;
use mfsprobe_protocol::version::{Feature, FeatureSet, Release};
use mfsprobe_protocol::{DecodeError, ProtocolVersion};
use mfsprobe_topology::{Endpoint, NodeRole};

use crate::connection::{CommunicationError, Connection, ConnectionSettings};

/// Failure of a typed request against the active master.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{command} requires master {required} or newer (got {actual})")]
    Unsupported {
        command: String,
        required: ProtocolVersion,
        actual: ProtocolVersion,
    },
    #[error("{command} must go to the leading master; {endpoint} is {}", describe(.role))]
    NotLeader {
        command: String,
        endpoint: Endpoint,
        role: Option<NodeRole>,
    },
    #[error(transparent)]
    Communication(#[from] CommunicationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

fn describe(role: &Option<NodeRole>) -> String {
    match role {
        Some(role) => role.to_string(),
        None => "of unknown role".to_string(),
    }
}

pub struct MasterConnection {
    conn: Connection,
    role: Option<NodeRole>,
    raw_version: ProtocolVersion,
    release: Release,
    features: FeatureSet,
}

impl MasterConnection {
    pub fn new(endpoint: Endpoint, settings: ConnectionSettings) -> Self {
        Self::from_connection(Connection::new(endpoint, settings))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            role: None,
            raw_version: ProtocolVersion::UNKNOWN,
            release: ProtocolVersion::UNKNOWN.release(),
            features: FeatureSet::default(),
        }
    }

    /// Record the wire version reported by the peer and derive its release
    /// and feature mask.
    pub fn set_version(&mut self, raw: ProtocolVersion) {
        self.raw_version = raw;
        self.release = raw.release();
        self.features = FeatureSet::for_version(self.release.version);
    }

    /// Record the role the peer reported in its node-info reply.
    pub fn set_role(&mut self, role: NodeRole) {
        self.role = Some(role);
    }

    pub fn role(&self) -> Option<NodeRole> {
        self.role
    }

    /// True once the peer reported a role that holds the leader slot.
    pub fn is_leader(&self) -> bool {
        self.role.is_some_and(|r| r.claims_leader())
    }

    pub fn endpoint(&self) -> Endpoint {
        self.conn.endpoint()
    }

    /// Release version (PRO bit stripped).
    pub fn version(&self) -> ProtocolVersion {
        self.release.version
    }

    pub fn raw_version(&self) -> ProtocolVersion {
        self.raw_version
    }

    pub fn release(&self) -> Release {
        self.release
    }

    pub fn version_at_least(&self, major: u16, minor: u8, patch: u8) -> bool {
        self.release.version.at_least(major, minor, patch)
    }

    pub fn version_less_than(&self, major: u16, minor: u8, patch: u8) -> bool {
        !self.version_at_least(major, minor, patch)
    }

    pub fn is_pro(&self) -> Option<bool> {
        self.release.pro
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub async fn command(
        &mut self,
        cmd_out: u32,
        cmd_in: u32,
        payload: impl Into<Bytes>,
    ) -> Result<Bytes, CommunicationError> {
        self.conn.command(cmd_out, cmd_in, payload).await
    }

    // ========================================================================
    // Administrative requests
    // ========================================================================

    fn require_leader(&self, command: &str) -> Result<(), CommandError> {
        if self.is_leader() {
            return Ok(());
        }
        warn!(endpoint = %self.endpoint(), command, "refused: peer is not the leader");
        Err(CommandError::NotLeader {
            command: command.to_string(),
            endpoint: self.endpoint(),
            role: self.role,
        })
    }

    /// Send a chunk server maintenance command. Only the leader accepts it,
    /// and it is gated on the master's release version; an unknown version
    /// never passes a gate.
    pub async fn cs_command(
        &mut self,
        command: ChunkServerCommand,
        ip: Ipv4Addr,
        port: u16,
    ) -> Result<CommandStatus, CommandError> {
        self.require_leader(&command.to_string())?;
        if let Some(required) = command.min_version() {
            if self.release.version < required {
                return Err(CommandError::Unsupported {
                    command: command.to_string(),
                    required,
                    actual: self.release.version,
                });
            }
        }
        let reply = self
            .command(
                CLTOMA_CSSERV_COMMAND,
                MATOCL_CSSERV_COMMAND,
                command.encode(ip, port),
            )
            .await?;
        let status = CommandStatus::decode(&reply)?;
        if status.is_ok() {
            info!(%command, %ip, port, "chunk server command accepted");
        } else {
            warn!(%command, %ip, port, %status, "chunk server command refused");
        }
        Ok(status)
    }

    /// Remove a client session. Leader only.
    pub async fn session_remove(&mut self, session_id: u32) -> Result<CommandStatus, CommandError> {
        self.require_leader("session remove")?;
        let reply = self
            .command(
                CLTOMA_SESSION_COMMAND,
                MATOCL_SESSION_COMMAND,
                encode_session_remove(session_id),
            )
            .await?;
        let status = CommandStatus::decode(&reply)?;
        if !status.is_ok() {
            warn!(session_id, %status, "session removal refused");
        }
        Ok(status)
    }

    pub async fn metaloggers(&mut self) -> Result<Vec<MetaloggerEntry>, CommandError> {
        let reply = self
            .command(CLTOMA_MLOG_LIST, MATOCL_MLOG_LIST, Bytes::new())
            .await?;
        Ok(MetaloggerEntry::decode_list(&reply)?)
    }
}

impl std::fmt::Debug for MasterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterConnection")
            .field("endpoint", &self.conn.endpoint())
            .field("role", &self.role)
            .field("version", &self.raw_version)
            .field("state", &self.conn.state())
            .finish()
    }
}
