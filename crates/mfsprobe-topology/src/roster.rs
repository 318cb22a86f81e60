//! Roster ordering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::discovery::RosterEntry;

/// Sort key for roster listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterOrder {
    #[default]
    Endpoint,
    Version,
    Role,
    Metaversion,
    Clock,
}

impl std::str::FromStr for RosterOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "endpoint" | "ip" => Ok(RosterOrder::Endpoint),
            "version" => Ok(RosterOrder::Version),
            "role" | "state" => Ok(RosterOrder::Role),
            "metaversion" => Ok(RosterOrder::Metaversion),
            "clock" => Ok(RosterOrder::Clock),
            other => Err(format!("unknown roster order: {other}")),
        }
    }
}

fn compare(a: &RosterEntry, b: &RosterEntry, order: RosterOrder) -> Ordering {
    match order {
        RosterOrder::Endpoint => a.endpoint.cmp(&b.endpoint),
        RosterOrder::Version => {
            let key = |e: &RosterEntry| e.info().map(|i| i.version.release().sort_key());
            key(a).cmp(&key(b))
        }
        RosterOrder::Role => a.role.rank().cmp(&b.role.rank()),
        RosterOrder::Metaversion => {
            let key = |e: &RosterEntry| e.info().and_then(|i| i.metaversion()).unwrap_or(0);
            key(a).cmp(&key(b))
        }
        RosterOrder::Clock => {
            let key = |e: &RosterEntry| {
                e.info()
                    .and_then(|i| i.clock)
                    .map(|c| c.usec_time)
                    .unwrap_or(0)
            };
            key(a).cmp(&key(b))
        }
    }
}

/// Stable sort of the roster, optionally reversed.
pub fn sort_roster(entries: &mut [RosterEntry], order: RosterOrder, reverse: bool) {
    entries.sort_by(|a, b| compare(a, b, order));
    if reverse {
        entries.reverse();
    }
}
