//! Cluster-wide counters carried by the leader's node-info reply.
//!
//! Only the HA-era layouts (121 bytes and up) carry the counters in a form
//! worth decoding. Like `node_info`, the payload length selects a row of
//! `SUMMARY_LAYOUTS`; the last-save block is shared with the node-info table.

use serde::{Deserialize, Serialize};

use crate::be::{u32_at, u64_at, u8_at};
use crate::node_info::{LastSave, NodeInfoLayout};
use crate::version::ProtocolVersion;
use crate::DecodeError;

const RECORD: &str = "cluster info";

/// How chunk redundancy is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CopyAccounting {
    /// Pre-metainfo masters: total copies and copies of regular chunks.
    Copies { all_copies: u32, regular_copies: u32 },
    /// Metainfo masters: per-format chunk counts and part totals.
    /// The ec4 fields are zero on layouts that predate them.
    MetaInfo {
        copy_chunks: u32,
        ec8_chunks: u32,
        ec4_chunks: u32,
        chunk_copies: u64,
        chunk_ec8_parts: u64,
        chunk_ec4_parts: u64,
        chunk_hyp_copies: u64,
    },
}

/// Decoded cluster counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub version: ProtocolVersion,
    pub memory_usage: u64,
    pub sys_cpu: f64,
    pub user_cpu: f64,
    pub total_space: u64,
    pub avail_space: u64,
    /// Absent before the freespace field was introduced.
    pub free_space: Option<u64>,
    pub trash_space: u64,
    pub trash_files: u32,
    pub sustained_space: u64,
    pub sustained_files: u32,
    pub nodes: u32,
    pub dirs: u32,
    pub files: u32,
    pub chunks: u32,
    pub last_save: LastSave,
    pub last_save_secs: f64,
    pub accounting: CopyAccounting,
}

/// Where the chunk redundancy counters sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingLayout {
    /// allcopies:32 regularcopies:32
    Copies { at: usize },
    /// copychunks:32 ec8chunks:32 [ec4chunks:32] at `chunks`, then the part
    /// totals at `parts`: copies:64 ec8parts:64 [ec4parts:64] hypcopies:64.
    MetaInfo {
        chunks: usize,
        ec4_chunks: Option<usize>,
        parts: usize,
        ec4_parts: bool,
    },
}

/// Counter offsets for one payload length. The last-save block comes from
/// the matching `NodeInfoLayout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLayout {
    pub length: usize,
    /// freespace:64
    pub free_space: Option<usize>,
    /// trashspace:64
    pub trash_space: usize,
    /// trashnodes:32 sustainedspace:64 sustainednodes:32 allnodes:32
    /// dirnodes:32 filenodes:32 chunks:32
    pub counts: usize,
    pub accounting: AccountingLayout,
}

const fn copies(length: usize, shift: usize) -> SummaryLayout {
    SummaryLayout {
        length,
        free_space: if shift > 0 { Some(44) } else { None },
        trash_space: 44 + shift,
        counts: 52 + shift,
        accounting: AccountingLayout::Copies { at: 84 + shift },
    }
}

const fn metainfo(length: usize, shift: usize, parts: usize) -> SummaryLayout {
    SummaryLayout {
        accounting: AccountingLayout::MetaInfo {
            chunks: 84 + shift,
            ec4_chunks: None,
            parts,
            ec4_parts: false,
        },
        ..copies(length, shift)
    }
}

/// Every cluster counter layout, keyed by payload length.
pub const SUMMARY_LAYOUTS: [SummaryLayout; 8] = [
    copies(121, 0),
    copies(129, 0),
    // freespace inserted: +8
    copies(137, 8),
    copies(149, 8),
    // metainfo mode without freespace
    metainfo(173, 0, 149),
    metainfo(181, 8, 157),
    metainfo(193, 8, 157),
    SummaryLayout {
        accounting: AccountingLayout::MetaInfo {
            chunks: 92,
            ec4_chunks: Some(100),
            parts: 161,
            ec4_parts: true,
        },
        ..copies(205, 8)
    },
];

impl SummaryLayout {
    /// Look up the layout for a payload length. Pre-HA lengths carry no
    /// usable counters and are rejected like unknown ones.
    pub fn for_length(length: usize) -> Result<&'static SummaryLayout, DecodeError> {
        SUMMARY_LAYOUTS
            .iter()
            .find(|l| l.length == length)
            .ok_or(DecodeError::UnknownLength {
                record: RECORD,
                length,
            })
    }
}

impl AccountingLayout {
    fn decode(&self, data: &[u8]) -> Result<CopyAccounting, DecodeError> {
        match *self {
            AccountingLayout::Copies { at } => Ok(CopyAccounting::Copies {
                all_copies: u32_at(data, at, RECORD)?,
                regular_copies: u32_at(data, at + 4, RECORD)?,
            }),
            AccountingLayout::MetaInfo {
                chunks,
                ec4_chunks,
                parts,
                ec4_parts,
            } => {
                let chunk_copies = u64_at(data, parts, RECORD)?;
                let chunk_ec8_parts = u64_at(data, parts + 8, RECORD)?;
                let (chunk_ec4_parts, hyp_at) = if ec4_parts {
                    (u64_at(data, parts + 16, RECORD)?, parts + 24)
                } else {
                    (0, parts + 16)
                };
                Ok(CopyAccounting::MetaInfo {
                    copy_chunks: u32_at(data, chunks, RECORD)?,
                    ec8_chunks: u32_at(data, chunks + 4, RECORD)?,
                    ec4_chunks: match ec4_chunks {
                        Some(at) => u32_at(data, at, RECORD)?,
                        None => 0,
                    },
                    chunk_copies,
                    chunk_ec8_parts,
                    chunk_ec4_parts,
                    chunk_hyp_copies: u64_at(data, hyp_at, RECORD)?,
                })
            }
        }
    }
}

impl ClusterSummary {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let length = data.len();
        let layout = SummaryLayout::for_length(length)?;
        let info_layout = NodeInfoLayout::for_length(length)?;
        let truncated = DecodeError::Truncated {
            record: RECORD,
            needed: 4,
            got: length,
        };
        let version = ProtocolVersion::from_wire(data).ok_or(truncated.clone())?;
        let save_at = info_layout.last_save.ok_or(truncated)?;

        let memory_usage = u64_at(data, 4, RECORD)?;
        let sys_raw = u64_at(data, 12, RECORD)?;
        let user_raw = u64_at(data, 20, RECORD)?;
        let total_space = u64_at(data, 28, RECORD)?;
        let avail_space = u64_at(data, 36, RECORD)?;
        let free_space = match layout.free_space {
            Some(at) => Some(u64_at(data, at, RECORD)?),
            None => None,
        };
        let c = layout.counts;

        let last_save = LastSave {
            timestamp: u32_at(data, save_at, RECORD)?,
            duration_raw: u32_at(data, save_at + 4, RECORD)?,
            status: u8_at(data, save_at + 8, RECORD)?,
        };

        let divisor = crate::DEFAULTS.cpu_time_divisor;
        Ok(ClusterSummary {
            version,
            memory_usage,
            sys_cpu: sys_raw as f64 / divisor,
            user_cpu: user_raw as f64 / divisor,
            total_space,
            avail_space,
            free_space,
            trash_space: u64_at(data, layout.trash_space, RECORD)?,
            trash_files: u32_at(data, c, RECORD)?,
            sustained_space: u64_at(data, c + 4, RECORD)?,
            sustained_files: u32_at(data, c + 12, RECORD)?,
            nodes: u32_at(data, c + 16, RECORD)?,
            dirs: u32_at(data, c + 20, RECORD)?,
            files: u32_at(data, c + 24, RECORD)?,
            chunks: u32_at(data, c + 28, RECORD)?,
            last_save,
            last_save_secs: last_save.duration_secs(version.release().version),
            accounting: layout.accounting.decode(data)?,
        })
    }
}
