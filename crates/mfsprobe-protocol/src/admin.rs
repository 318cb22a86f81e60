//! Administrative requests against a master: chunk server and session
//! maintenance commands, plus the single-byte status reply they share.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::be::u8_at;
use crate::version::ProtocolVersion;
use crate::DecodeError;

pub const STATUS_OK: u8 = 0;
pub const ERROR_NOTFOUND: u8 = 41;
pub const ERROR_ACTIVE: u8 = 42;

pub const MFS_SESSION_COMMAND_REMOVE: u8 = 0;

/// Chunk server maintenance command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkServerCommand {
    Remove,
    BackToWork,
    MaintenanceOn,
    MaintenanceOff,
    TmpRemove,
}

impl ChunkServerCommand {
    pub fn id(self) -> u8 {
        match self {
            ChunkServerCommand::Remove => 0,
            ChunkServerCommand::BackToWork => 1,
            ChunkServerCommand::MaintenanceOn => 2,
            ChunkServerCommand::MaintenanceOff => 3,
            ChunkServerCommand::TmpRemove => 4,
        }
    }

    /// Oldest master (release version) accepting this command, if gated.
    pub fn min_version(self) -> Option<ProtocolVersion> {
        match self {
            ChunkServerCommand::BackToWork => Some(ProtocolVersion::new(1, 6, 28)),
            ChunkServerCommand::MaintenanceOn | ChunkServerCommand::MaintenanceOff => {
                Some(ProtocolVersion::new(2, 0, 11))
            }
            ChunkServerCommand::Remove | ChunkServerCommand::TmpRemove => None,
        }
    }

    /// Request payload: commandid:8 ip:32 port:16.
    pub fn encode(self, ip: Ipv4Addr, port: u16) -> Bytes {
        let mut buf = BytesMut::with_capacity(7);
        buf.put_u8(self.id());
        buf.put_slice(&ip.octets());
        buf.put_u16(port);
        buf.freeze()
    }
}

impl fmt::Display for ChunkServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChunkServerCommand::Remove => "remove",
            ChunkServerCommand::BackToWork => "back to work",
            ChunkServerCommand::MaintenanceOn => "maintenance on",
            ChunkServerCommand::MaintenanceOff => "maintenance off",
            ChunkServerCommand::TmpRemove => "temporary remove",
        };
        f.write_str(name)
    }
}

/// Session removal payload: commandid:8 sessionid:32.
pub fn encode_session_remove(session_id: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(MFS_SESSION_COMMAND_REMOVE);
    buf.put_u32(session_id);
    buf.freeze()
}

/// Status byte returned by administrative commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    NotFound,
    /// Target still connected; it must be stopped first.
    Active,
    Other(u8),
}

impl CommandStatus {
    pub fn from_wire(v: u8) -> Self {
        match v {
            STATUS_OK => CommandStatus::Ok,
            ERROR_NOTFOUND => CommandStatus::NotFound,
            ERROR_ACTIVE => CommandStatus::Active,
            other => CommandStatus::Other(other),
        }
    }

    /// Decode a `status:8` reply. Any other length is rejected.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != 1 {
            return Err(DecodeError::UnknownLength {
                record: "command status",
                length: data.len(),
            });
        }
        Ok(Self::from_wire(u8_at(data, 0, "command status")?))
    }

    pub fn is_ok(&self) -> bool {
        *self == CommandStatus::Ok
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Ok => f.write_str("ok"),
            CommandStatus::NotFound => f.write_str("not found"),
            CommandStatus::Active => f.write_str("still active"),
            CommandStatus::Other(v) => write!(f, "error {v}"),
        }
    }
}
