//! Per-probe outcome and role classification.
//!
//! A probe either failed in one of three mutually exclusive ways or produced
//! a decoded node-info record. Classification turns the record into a role
//! using the working/next/stable/sync fields.

use mfsprobe_protocol::{NodeInfo, NodeState, ProtocolVersion};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Oldest version of the pre-HA layouts that is not a plain single master.
const HA_PREVIEW_VERSION: ProtocolVersion = ProtocolVersion::new(1, 7, 0);

/// Sentinel carried in every state field by community single-master builds.
const MASTER_CE_SYNC: u8 = 0xFF;

/// Result of probing one endpoint with the node-info command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// Connection could not be established at all.
    Unreachable,
    /// Connected, but the exchange failed after retries.
    Busy,
    /// Replied with a payload no known layout matches, or kept answering
    /// with the wrong command id.
    WrongAnswer { length: Option<usize> },
    /// Decoded reply. `raw` is kept for follow-up decoders.
    Answered {
        info: NodeInfo,
        #[serde(skip)]
        raw: Vec<u8>,
    },
}

impl ProbeOutcome {
    pub fn info(&self) -> Option<&NodeInfo> {
        match self {
            ProbeOutcome::Answered { info, .. } => Some(info),
            _ => None,
        }
    }
}

/// Follower synchronisation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Desync,
    Synced,
    Delayed,
    Init,
    Other(u8),
}

impl SyncState {
    pub fn from_wire(v: u8) -> Self {
        match v {
            0 => SyncState::Desync,
            1 => SyncState::Synced,
            2 => SyncState::Delayed,
            3 => SyncState::Init,
            other => SyncState::Other(other),
        }
    }

    pub fn is_synced(&self) -> bool {
        *self == SyncState::Synced
    }
}

/// Role of one probed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Unreachable,
    Busy,
    WrongAnswer,
    /// Pre-1.7 master: always the leader of its one-node cluster.
    LegacyLeader,
    /// 1.7.x HA preview node that must be upgraded before it can serve.
    UpgradeRequired,
    /// Community single master.
    Master,
    /// Working and next state disagree, or the stable flag is unset.
    Transition { from: NodeState, to: NodeState },
    Leader,
    Deputy,
    Elect,
    Usurper,
    Follower { sync: SyncState },
    Other { state: NodeState },
}

impl NodeRole {
    /// Classify one probe outcome.
    pub fn classify(outcome: &ProbeOutcome) -> Self {
        match outcome {
            ProbeOutcome::Unreachable => NodeRole::Unreachable,
            ProbeOutcome::Busy => NodeRole::Busy,
            ProbeOutcome::WrongAnswer { .. } => NodeRole::WrongAnswer,
            ProbeOutcome::Answered { info, .. } => Self::from_info(info),
        }
    }

    /// Classify a decoded node-info record.
    pub fn from_info(info: &NodeInfo) -> Self {
        let Some(state) = info.state else {
            return if info.version < HA_PREVIEW_VERSION {
                NodeRole::LegacyLeader
            } else {
                NodeRole::UpgradeRequired
            };
        };

        if state.working == NodeState::MasterCe
            && state.next == NodeState::MasterCe
            && state.stable == MASTER_CE_SYNC
            && state.sync == MASTER_CE_SYNC
        {
            return NodeRole::Master;
        }

        if state.stable == 0 || state.working != state.next {
            return NodeRole::Transition {
                from: state.working,
                to: state.next,
            };
        }

        match state.working {
            NodeState::Leader => NodeRole::Leader,
            NodeState::Deputy => NodeRole::Deputy,
            NodeState::Elect => NodeRole::Elect,
            NodeState::Usurper => NodeRole::Usurper,
            NodeState::Follower => NodeRole::Follower {
                sync: SyncState::from_wire(state.sync),
            },
            other => NodeRole::Other { state: other },
        }
    }

    /// True for roles that take the leader slot (authoritative master).
    pub fn claims_leader(&self) -> bool {
        matches!(
            self,
            NodeRole::Leader | NodeRole::Deputy | NodeRole::Master | NodeRole::LegacyLeader
        )
    }

    /// Rank used for roster ordering: serving masters first, failures last.
    pub fn rank(&self) -> u8 {
        match self {
            NodeRole::Leader | NodeRole::Master | NodeRole::LegacyLeader => 0,
            NodeRole::Deputy => 1,
            NodeRole::Elect => 2,
            NodeRole::Usurper => 3,
            NodeRole::Follower { sync } if sync.is_synced() => 4,
            NodeRole::Follower { .. } => 5,
            NodeRole::Transition { .. } | NodeRole::Other { .. } => 6,
            NodeRole::UpgradeRequired => 7,
            NodeRole::Busy => 8,
            NodeRole::WrongAnswer => 9,
            NodeRole::Unreachable => 10,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Unreachable => f.write_str("UNREACHABLE"),
            NodeRole::Busy => f.write_str("BUSY"),
            NodeRole::WrongAnswer => f.write_str("WRONG ANSWER"),
            NodeRole::LegacyLeader => f.write_str("OLD MASTER (LEADER ONLY)"),
            NodeRole::UpgradeRequired => f.write_str("UPGRADE THIS UNIT!"),
            NodeRole::Master => f.write_str("MASTER"),
            NodeRole::Transition { from, to } => {
                write!(f, "transition {} -> {}", from.name(), to.name())
            }
            NodeRole::Leader => f.write_str("LEADER"),
            NodeRole::Deputy => f.write_str("DEPUTY"),
            NodeRole::Elect => f.write_str("ELECT"),
            NodeRole::Usurper => f.write_str("USURPER"),
            NodeRole::Follower { sync } => match sync {
                SyncState::Synced => f.write_str("FOLLOWER"),
                SyncState::Desync => f.write_str("FOLLOWER (DESYNC)"),
                SyncState::Delayed => f.write_str("FOLLOWER (DELAYED)"),
                SyncState::Init => f.write_str("FOLLOWER (INIT)"),
                SyncState::Other(v) => write!(f, "FOLLOWER (SYNC {v})"),
            },
            NodeRole::Other { state } => f.write_str(state.name()),
        }
    }
}
