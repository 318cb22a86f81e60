//! mfsprobe Topology -- role classification and active-master selection.
//!
//! Pure logic, no I/O. The resolver in the `mfsprobe` crate probes
//! endpoints and feeds each outcome into a `Discovery`, which decides on
//! the fly which node holds the active slot. The finished `Snapshot` is
//! replaced wholesale by the next pass, never patched.

pub mod consistency;
pub mod discovery;
pub mod endpoint;
pub mod role;
pub mod roster;

pub use consistency::Consistency;
pub use discovery::{
    apply_leader_hint, Candidate, Discovery, DiscoveryMode, ProbeCounts, RoleFlags, RosterEntry,
    Snapshot, Step,
};
pub use endpoint::Endpoint;
pub use role::{NodeRole, ProbeOutcome, SyncState};
pub use roster::{sort_roster, RosterOrder};

fn servers(endpoints: &usize) -> &'static str {
    if *endpoints == 1 {
        "the MooseFS Master server"
    } else {
        "MooseFS Master servers"
    }
}

fn masters(endpoints: &usize) -> &'static str {
    if *endpoints == 1 {
        "master"
    } else {
        "masters"
    }
}

/// Cluster-wide discovery failure. Per-endpoint failures never surface
/// here; they are part of the roster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Can't resolve the MooseFS Master hostname ({hosts})")]
    Unresolvable { hosts: String },
    #[error("Can't connect to {} ({hosts})", servers(.endpoints))]
    Unreachable { hosts: String, endpoints: usize },
    #[error(
        "Got wrong answer from {} ({hosts}) - likely the {} version is too new",
        servers(.endpoints),
        masters(.endpoints)
    )]
    VersionMismatch { hosts: String, endpoints: usize },
    #[error("No leading MooseFS Master found ({hosts})")]
    NoLeadingMaster { hosts: String },
    /// Masters answered, but none of them is the leader. Requests that
    /// change cluster state are refused.
    #[error("MooseFS Master leader not found ({hosts})")]
    NoLeader { hosts: String },
}
