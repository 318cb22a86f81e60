//! Cross-node consistency aggregates.
//!
//! Highest saved metadata version with its checksum (ORed on ties, so a
//! later mismatch shows up as a changed value), plus clock skew and
//! metadata delay per node.

use mfsprobe_protocol::{NodeInfo, DEFAULTS};
use serde::Serialize;

use crate::discovery::RosterEntry;

/// Grace subtracted from the metadata delay, in seconds.
const META_DELAY_GRACE_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Consistency {
    pub highest_saved_metaversion: u64,
    pub highest_metaversion_checksum: u32,
    /// Leader's clock in microseconds; `None` or 0 when unknown.
    pub leader_usec_time: Option<u64>,
    /// max - min of node clocks, only computed without a leader clock.
    pub clock_spread_usec: Option<u64>,
}

impl Consistency {
    pub fn compute(entries: &[RosterEntry], leader_usec_time: Option<u64>) -> Self {
        let leader_usec_time = leader_usec_time.filter(|&t| t != 0);
        let mut out = Consistency {
            leader_usec_time,
            ..Default::default()
        };

        let mut min_usec: Option<u64> = None;
        let mut max_usec: Option<u64> = None;

        for info in entries.iter().filter_map(RosterEntry::info) {
            if let Some(meta) = info.meta {
                if meta.last_save_metaversion > out.highest_saved_metaversion {
                    out.highest_saved_metaversion = meta.last_save_metaversion;
                    out.highest_metaversion_checksum = meta.last_save_checksum;
                } else if meta.last_save_metaversion == out.highest_saved_metaversion {
                    out.highest_metaversion_checksum |= meta.last_save_checksum;
                }
            }
            if leader_usec_time.is_none() {
                if let Some(t) = info.clock.map(|c| c.usec_time).filter(|&t| t > 0) {
                    min_usec = Some(min_usec.map_or(t, |m| m.min(t)));
                    max_usec = Some(max_usec.map_or(t, |m| m.max(t)));
                }
            }
        }

        if let (Some(min), Some(max)) = (min_usec, max_usec) {
            out.clock_spread_usec = Some(max - min);
        }
        out
    }

    /// Clock skew of one node in seconds: distance from the leader clock,
    /// or the cluster-wide spread when no leader clock is known. 0 for
    /// nodes without a clock.
    pub fn sec_delta(&self, info: &NodeInfo) -> f64 {
        let Some(t) = info.clock.map(|c| c.usec_time).filter(|&t| t != 0) else {
            return 0.0;
        };
        match self.leader_usec_time {
            Some(leader) => leader.abs_diff(t) as f64 / DEFAULTS.usec_per_sec,
            None => self
                .clock_spread_usec
                .map(|d| d as f64 / DEFAULTS.usec_per_sec)
                .unwrap_or(0.0),
        }
    }

    /// Seconds the node's changelog lags behind the leader clock, minus a
    /// one second grace. `None` when either side is unknown.
    pub fn meta_delay(&self, info: &NodeInfo) -> Option<f64> {
        let leader = self.leader_usec_time?;
        let chlog = info
            .clock
            .map(|c| c.last_changelog_time)
            .filter(|&t| t != 0)?;
        let delay = leader as f64 / DEFAULTS.usec_per_sec - chlog as f64;
        Some(if delay > META_DELAY_GRACE_SECS {
            delay - META_DELAY_GRACE_SECS
        } else {
            0.0
        })
    }
}
