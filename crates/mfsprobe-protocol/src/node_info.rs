//! Node-info (`MATOCL_INFO`) record -- the discovery reply of every master.
//!
//! The reply grew over a dozen protocol revisions without ever carrying an
//! explicit format tag: the payload length alone selects the layout. Newer
//! layouts inserted a `freespace:64` field (+8) and later three chunk
//! counters (+4 on top) in front of the shared tail, so offsets past that
//! point shift. The shift is not monotonic in length (173 has none), hence
//! the explicit table below instead of a formula.
//!
//! Decoding keeps raw integers. Scaling helpers convert on demand.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::be::{u32_at, u64_at, u8_at};
use crate::defaults::DEFAULTS;
use crate::version::ProtocolVersion;
use crate::DecodeError;

const RECORD: &str = "node info";

/// Where the version triple comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionField {
    /// Pre-1.6 replies carry no version; it is implied by the length.
    Implied(ProtocolVersion),
    /// `>HBB` at offset 0.
    Header,
}

/// Field offsets for one known payload length. `None` = field absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfoLayout {
    pub length: usize,
    pub version: VersionField,
    /// memusage:64
    pub memory: Option<usize>,
    /// syscpu:64 usercpu:64
    pub cpu: Option<usize>,
    /// laststore_ts:32 laststore_duration:32 laststore_status:8
    pub last_save: Option<usize>,
    /// state:8 nstate:8 stable:8 sync:8 leaderip:32 state_chg_time:32 meta_version:64
    pub state: Option<usize>,
    /// exports_checksum:64
    pub exports_checksum: Option<usize>,
    /// metaid:64 lastsave_metaversion:64 lastsave_checksum:32
    pub meta: Option<usize>,
    /// usec_local_time:64 last_changelog_time:32
    pub clock: Option<usize>,
}

const fn legacy(length: usize, version: VersionField) -> NodeInfoLayout {
    NodeInfoLayout {
        length,
        version,
        memory: None,
        cpu: None,
        last_save: None,
        state: None,
        exports_checksum: None,
        meta: None,
        clock: None,
    }
}

/// Every node-info layout this client understands, keyed by payload length.
pub const NODE_INFO_LAYOUTS: [NodeInfoLayout; 13] = [
    legacy(52, VersionField::Implied(ProtocolVersion::new(1, 4, 0))),
    legacy(60, VersionField::Implied(ProtocolVersion::new(1, 5, 0))),
    legacy(68, VersionField::Header),
    NodeInfoLayout {
        memory: Some(4),
        ..legacy(76, VersionField::Header)
    },
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(92),
        ..legacy(101, VersionField::Header)
    },
    // >= 2.0.0: HA state block
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(92),
        state: Some(101),
        ..legacy(121, VersionField::Header)
    },
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(92),
        state: Some(101),
        exports_checksum: Some(121),
        ..legacy(129, VersionField::Header)
    },
    // freespace inserted: +8
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(100),
        state: Some(109),
        exports_checksum: Some(129),
        ..legacy(137, VersionField::Header)
    },
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(100),
        state: Some(109),
        exports_checksum: Some(129),
        clock: Some(137),
        ..legacy(149, VersionField::Header)
    },
    // metainfo mode without freespace: no shift
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(92),
        state: Some(101),
        exports_checksum: Some(121),
        meta: Some(129),
        ..legacy(173, VersionField::Header)
    },
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(100),
        state: Some(109),
        exports_checksum: Some(129),
        meta: Some(137),
        ..legacy(181, VersionField::Header)
    },
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(100),
        state: Some(109),
        exports_checksum: Some(129),
        meta: Some(137),
        clock: Some(181),
        ..legacy(193, VersionField::Header)
    },
    // ec4 chunk counters inserted: +8+4
    NodeInfoLayout {
        memory: Some(4),
        cpu: Some(12),
        last_save: Some(104),
        state: Some(113),
        exports_checksum: Some(133),
        meta: Some(141),
        clock: Some(193),
        ..legacy(205, VersionField::Header)
    },
];

impl NodeInfoLayout {
    /// Look up the layout for a payload length. Unknown lengths are an error,
    /// never a best-effort parse.
    pub fn for_length(length: usize) -> Result<&'static NodeInfoLayout, DecodeError> {
        NODE_INFO_LAYOUTS
            .iter()
            .find(|l| l.length == length)
            .ok_or(DecodeError::UnknownLength {
                record: RECORD,
                length,
            })
    }

    /// Bytes inserted before the shared tail relative to the 121-byte layout.
    pub fn shift(&self) -> usize {
        self.state.map(|s| s - 101).unwrap_or(0)
    }

    /// True for layouts carrying the HA state block (>= 2.0.0).
    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }
}

/// Role a master reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Dummy,
    Leader,
    Elect,
    Follower,
    Usurper,
    Deputy,
    /// Community edition single master; no HA.
    MasterCe,
    Other(u8),
}

impl NodeState {
    pub fn from_wire(v: u8) -> Self {
        match v {
            0x00 => NodeState::Dummy,
            0x01 => NodeState::Leader,
            0x02 => NodeState::Elect,
            0x03 => NodeState::Follower,
            0x04 => NodeState::Usurper,
            0x05 => NodeState::Deputy,
            0xFF => NodeState::MasterCe,
            other => NodeState::Other(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            NodeState::Dummy => 0x00,
            NodeState::Leader => 0x01,
            NodeState::Elect => 0x02,
            NodeState::Follower => 0x03,
            NodeState::Usurper => 0x04,
            NodeState::Deputy => 0x05,
            NodeState::MasterCe => 0xFF,
            NodeState::Other(v) => v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Dummy => "DUMMY",
            NodeState::Leader => "LEADER",
            NodeState::Elect => "ELECT",
            NodeState::Follower => "FOLLOWER",
            NodeState::Usurper => "USURPER",
            NodeState::Deputy => "DEPUTY",
            NodeState::MasterCe => "MASTER",
            NodeState::Other(_) => "???",
        }
    }
}

/// Last metadata save bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSave {
    /// Unix seconds of the last successful store (0 = unknown).
    pub timestamp: u32,
    /// Seconds before 2.0.14, milliseconds from 2.0.14 on.
    pub duration_raw: u32,
    pub status: u8,
}

impl LastSave {
    /// Save duration in seconds, honouring the unit switch at 2.0.14.
    /// `release` is the marketed release, not the raw wire triple.
    pub fn duration_secs(&self, release: ProtocolVersion) -> f64 {
        if release.at_least(2, 0, 14) {
            self.duration_raw as f64 / 1000.0
        } else {
            self.duration_raw as f64
        }
    }
}

/// HA state block (>= 2.0.0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlock {
    pub working: NodeState,
    pub next: NodeState,
    pub stable: u8,
    pub sync: u8,
    pub leader_ip: Ipv4Addr,
    pub change_time: u32,
    pub metaversion: u64,
}

/// Cluster identity and last saved metadata image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaBlock {
    pub meta_id: u64,
    pub last_save_metaversion: u64,
    pub last_save_checksum: u32,
}

/// Node-local clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeClock {
    /// Microseconds since the epoch on the node.
    pub usec_time: u64,
    /// Unix seconds of the last changelog entry applied.
    pub last_changelog_time: u32,
}

/// Decoded node-info reply. Fields absent from the layout are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub length: usize,
    pub version: ProtocolVersion,
    pub memory_usage: Option<u64>,
    /// Raw CPU-time counters (sys, user); see `sys_cpu`/`user_cpu`.
    pub cpu_raw: Option<(u64, u64)>,
    pub last_save: Option<LastSave>,
    pub state: Option<StateBlock>,
    pub exports_checksum: Option<u64>,
    pub meta: Option<MetaBlock>,
    pub clock: Option<NodeClock>,
}

impl NodeInfo {
    /// Decode a node-info payload. The payload length selects the layout.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let layout = NodeInfoLayout::for_length(data.len())?;

        let version = match layout.version {
            VersionField::Implied(v) => v,
            VersionField::Header => {
                ProtocolVersion::from_wire(data).ok_or(DecodeError::Truncated {
                    record: RECORD,
                    needed: 4,
                    got: data.len(),
                })?
            }
        };

        let memory_usage = layout
            .memory
            .map(|at| u64_at(data, at, RECORD))
            .transpose()?;

        let cpu_raw = layout
            .cpu
            .map(|at| Ok::<_, DecodeError>((u64_at(data, at, RECORD)?, u64_at(data, at + 8, RECORD)?)))
            .transpose()?;

        let last_save = layout
            .last_save
            .map(|at| {
                Ok::<_, DecodeError>(LastSave {
                    timestamp: u32_at(data, at, RECORD)?,
                    duration_raw: u32_at(data, at + 4, RECORD)?,
                    status: u8_at(data, at + 8, RECORD)?,
                })
            })
            .transpose()?;

        let state = layout
            .state
            .map(|at| {
                Ok::<_, DecodeError>(StateBlock {
                    working: NodeState::from_wire(u8_at(data, at, RECORD)?),
                    next: NodeState::from_wire(u8_at(data, at + 1, RECORD)?),
                    stable: u8_at(data, at + 2, RECORD)?,
                    sync: u8_at(data, at + 3, RECORD)?,
                    leader_ip: Ipv4Addr::from(u32_at(data, at + 4, RECORD)?),
                    change_time: u32_at(data, at + 8, RECORD)?,
                    metaversion: u64_at(data, at + 12, RECORD)?,
                })
            })
            .transpose()?;

        let exports_checksum = layout
            .exports_checksum
            .map(|at| u64_at(data, at, RECORD))
            .transpose()?;

        let meta = layout
            .meta
            .map(|at| {
                Ok::<_, DecodeError>(MetaBlock {
                    meta_id: u64_at(data, at, RECORD)?,
                    last_save_metaversion: u64_at(data, at + 8, RECORD)?,
                    last_save_checksum: u32_at(data, at + 16, RECORD)?,
                })
            })
            .transpose()?;

        let clock = layout
            .clock
            .map(|at| {
                Ok::<_, DecodeError>(NodeClock {
                    usec_time: u64_at(data, at, RECORD)?,
                    last_changelog_time: u32_at(data, at + 8, RECORD)?,
                })
            })
            .transpose()?;

        Ok(NodeInfo {
            length: data.len(),
            version,
            memory_usage,
            cpu_raw,
            last_save,
            state,
            exports_checksum,
            meta,
            clock,
        })
    }

    /// System CPU usage in seconds per second (fixed point, 1e7 divisor).
    pub fn sys_cpu(&self) -> Option<f64> {
        self.cpu_raw
            .map(|(sys, _)| sys as f64 / DEFAULTS.cpu_time_divisor)
    }

    /// User CPU usage in seconds per second (fixed point, 1e7 divisor).
    pub fn user_cpu(&self) -> Option<f64> {
        self.cpu_raw
            .map(|(_, user)| user as f64 / DEFAULTS.cpu_time_divisor)
    }

    /// Last save duration in seconds.
    pub fn last_save_secs(&self) -> Option<f64> {
        let release = self.version.release().version;
        self.last_save.map(|s| s.duration_secs(release))
    }

    pub fn metaversion(&self) -> Option<u64> {
        self.state.map(|s| s.metaversion)
    }
}
