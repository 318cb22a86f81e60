//! mfsprobe Protocol -- wire constants, frame codec, versioned record decoders.
//!
//! Plain TCP between client and master/chunk/metalogger servers.
//! Every frame: 4-byte big-endian command id + 4-byte big-endian payload
//! length + payload bytes.

pub mod admin;
pub mod cluster_summary;
pub mod codec;
pub mod commands;
pub mod defaults;
pub mod metaloggers;
pub mod node_info;
pub mod version;

pub use admin::{ChunkServerCommand, CommandStatus};
pub use cluster_summary::{ClusterSummary, CopyAccounting, SummaryLayout};
pub use codec::{Frame, FrameCodec};
pub use defaults::{ProtocolDefaults, DEFAULTS};
pub use metaloggers::MetaloggerEntry;
pub use node_info::{LastSave, MetaBlock, NodeClock, NodeInfo, NodeInfoLayout, NodeState, StateBlock};
pub use version::{Feature, FeatureSet, ProtocolVersion, Release};

/// Keepalive / no-op command id. Transparently skipped while awaiting a reply.
pub const ANTOAN_NOP: u32 = DEFAULTS.nop_command;

/// Frame header size in bytes: command id + payload length.
pub const HEADER_SIZE: usize = 8;

/// Largest payload a single frame may announce (sourced from protocol defaults).
pub const MAX_PAYLOAD_BYTES: usize = DEFAULTS.max_payload_bytes;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("payload too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("unexpected command: expected {expected}, got {got}")]
    UnexpectedCommand { expected: u32, got: u32 },
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True when the peer answered, but with something we did not ask for.
    pub fn is_violation(&self) -> bool {
        matches!(self, ProtocolError::UnexpectedCommand { .. })
    }
}

/// Record-level decode failure. Never accompanied by a partial record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized {record} answer of {length} bytes (too new version?)")]
    UnknownLength { record: &'static str, length: usize },
    #[error("truncated {record}: need {needed} bytes, got {got}")]
    Truncated {
        record: &'static str,
        needed: usize,
        got: usize,
    },
}

/// Big-endian field readers over a payload of already validated length.
///
/// Layout tables guarantee every offset fits inside the payload, so the
/// readers only fail if a table entry is wrong.
pub(crate) mod be {
    use crate::DecodeError;

    fn take<const N: usize>(
        data: &[u8],
        at: usize,
        record: &'static str,
    ) -> Result<[u8; N], DecodeError> {
        data.get(at..at + N)
            .and_then(|s| s.try_into().ok())
            .ok_or(DecodeError::Truncated {
                record,
                needed: at + N,
                got: data.len(),
            })
    }

    pub fn u8_at(data: &[u8], at: usize, record: &'static str) -> Result<u8, DecodeError> {
        Ok(take::<1>(data, at, record)?[0])
    }

    pub fn u16_at(data: &[u8], at: usize, record: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(take(data, at, record)?))
    }

    pub fn u32_at(data: &[u8], at: usize, record: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(take(data, at, record)?))
    }

    pub fn u64_at(data: &[u8], at: usize, record: &'static str) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(take(data, at, record)?))
    }
}
