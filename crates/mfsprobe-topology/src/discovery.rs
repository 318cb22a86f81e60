//! Discovery pass -- feeds probe outcomes in endpoint order and tracks which
//! node holds the active slot.
//!
//! Selection is first-found-wins per role and is evaluated as each probe
//! arrives: a LEADER/DEPUTY (or a single-node MASTER) takes the slot
//! unconditionally, ELECT only while no leader is known, USURPER only while
//! neither leader nor elect is known. FOLLOWERs are tracked for reporting
//! and never take the slot.
//!
//! The pass is generic over the connection handle `C` so the I/O layer can
//! hand over the live connection that produced each probe. Handles that do
//! not end up in the active slot are dropped as soon as they lose.

use mfsprobe_protocol::NodeInfo;
use serde::Serialize;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::role::{NodeRole, ProbeOutcome};
use crate::TopologyError;

/// How far a pass probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Stop at the first node that takes the leader slot.
    LeaderOnly,
    /// Probe every endpoint and keep the roster.
    FullRoster,
}

/// What the caller should do after feeding one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Which roles were seen during the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleFlags {
    pub leader: bool,
    pub elect: bool,
    pub usurper: bool,
    pub follower: bool,
    pub deputy: bool,
}

impl RoleFlags {
    pub fn any(&self) -> bool {
        self.leader || self.elect || self.usurper || self.follower || self.deputy
    }

    /// Leader, elect, usurper or deputy.
    pub fn leading(&self) -> bool {
        self.leader || self.elect || self.usurper || self.deputy
    }
}

/// Per-pass failure counters used to pick the cluster-wide diagnosis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeCounts {
    pub probed: usize,
    pub unreachable: usize,
    pub busy: usize,
    pub wrong_answer: usize,
}

/// One roster line: endpoint, outcome and role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub endpoint: Endpoint,
    pub role: NodeRole,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

impl RosterEntry {
    pub fn info(&self) -> Option<&NodeInfo> {
        self.outcome.info()
    }
}

/// The node holding (or contending for) the active slot.
#[derive(Debug)]
pub struct Candidate<C> {
    pub endpoint: Endpoint,
    pub role: NodeRole,
    pub info: NodeInfo,
    /// Raw node-info payload, for follow-up decoders.
    pub raw: Vec<u8>,
    pub conn: C,
}

/// Immutable result of one discovery pass.
#[derive(Debug)]
pub struct Snapshot<C> {
    pub mode: DiscoveryMode,
    pub found: RoleFlags,
    pub counts: ProbeCounts,
    pub active: Option<Candidate<C>>,
    /// Leader's local clock in microseconds, when the leader reports one.
    pub leader_usec_time: Option<u64>,
    /// Every probed endpoint in probe order. `None` for leader-only passes.
    pub roster: Option<Vec<RosterEntry>>,
}

impl<C> Snapshot<C> {
    /// Cluster-wide failure, if the pass found nothing usable.
    ///
    /// `hosts` is the user-supplied host string, echoed in the message.
    pub fn diagnose(&self, hosts: &str) -> Option<TopologyError> {
        let c = &self.counts;
        let hosts = hosts.to_string();
        if c.probed == 0 {
            return Some(TopologyError::Unresolvable { hosts });
        }
        if self.found.leading() {
            return None;
        }
        if c.unreachable == c.probed {
            return Some(TopologyError::Unreachable {
                hosts,
                endpoints: c.probed,
            });
        }
        if c.wrong_answer > 0 && c.wrong_answer + c.unreachable == c.probed {
            return Some(TopologyError::VersionMismatch {
                hosts,
                endpoints: c.probed,
            });
        }
        Some(TopologyError::NoLeadingMaster { hosts })
    }
}

enum Slot {
    Leader,
    Elect,
    Usurper,
}

/// State of one in-progress discovery pass.
pub struct Discovery<C> {
    mode: DiscoveryMode,
    found: RoleFlags,
    counts: ProbeCounts,
    leader: Option<Candidate<C>>,
    elect: Option<Candidate<C>>,
    usurper: Option<Candidate<C>>,
    leader_usec_time: Option<u64>,
    roster: Vec<RosterEntry>,
}

impl<C> Discovery<C> {
    pub fn new(mode: DiscoveryMode) -> Self {
        Self {
            mode,
            found: RoleFlags::default(),
            counts: ProbeCounts::default(),
            leader: None,
            elect: None,
            usurper: None,
            leader_usec_time: None,
            roster: Vec::new(),
        }
    }

    pub fn found(&self) -> RoleFlags {
        self.found
    }

    /// Feed one probe. `conn` is the live connection that produced an
    /// answered probe; it is kept only if the node takes a slot.
    pub fn observe(&mut self, endpoint: Endpoint, outcome: ProbeOutcome, conn: Option<C>) -> Step {
        let role = NodeRole::classify(&outcome);
        self.counts.probed += 1;
        match role {
            NodeRole::Unreachable => self.counts.unreachable += 1,
            NodeRole::Busy => self.counts.busy += 1,
            NodeRole::WrongAnswer => self.counts.wrong_answer += 1,
            _ => {}
        }
        debug!(%endpoint, %role, "probe classified");

        if self.mode == DiscoveryMode::FullRoster {
            self.roster.push(RosterEntry {
                endpoint,
                role,
                outcome: outcome.clone(),
            });
        }

        if let ProbeOutcome::Answered { info, raw } = outcome {
            self.claim(endpoint, role, info, raw, conn);
        }

        if self.found.leader && self.mode == DiscoveryMode::LeaderOnly {
            Step::Stop
        } else {
            Step::Continue
        }
    }

    /// Update role flags and, if the node wins a slot, keep its connection.
    fn claim(
        &mut self,
        endpoint: Endpoint,
        role: NodeRole,
        info: NodeInfo,
        raw: Vec<u8>,
        conn: Option<C>,
    ) {
        let slot = match role {
            r if r.claims_leader() => {
                if self.found.leader {
                    return;
                }
                self.found.leader = true;
                self.found.deputy |= r == NodeRole::Deputy;
                self.leader_usec_time = info.clock.map(|k| k.usec_time);
                // contenders are no longer needed
                self.elect = None;
                self.usurper = None;
                Slot::Leader
            }
            NodeRole::Elect => {
                if self.found.elect {
                    return;
                }
                self.found.elect = true;
                if self.found.leader {
                    return;
                }
                Slot::Elect
            }
            NodeRole::Usurper => {
                if self.found.usurper {
                    return;
                }
                self.found.usurper = true;
                if self.found.leader || self.found.elect {
                    return;
                }
                Slot::Usurper
            }
            NodeRole::Follower { .. } => {
                self.found.follower = true;
                return;
            }
            _ => return,
        };

        let Some(conn) = conn else {
            return;
        };
        debug!(%endpoint, %role, "slot taken");
        let candidate = Candidate {
            endpoint,
            role,
            info,
            raw,
            conn,
        };
        match slot {
            Slot::Leader => self.leader = Some(candidate),
            Slot::Elect => self.elect = Some(candidate),
            Slot::Usurper => self.usurper = Some(candidate),
        }
    }

    /// Close the pass. The active slot goes to leader, else elect, else
    /// usurper.
    pub fn finish(self) -> Snapshot<C> {
        let active = self.leader.or(self.elect).or(self.usurper);
        Snapshot {
            mode: self.mode,
            found: self.found,
            counts: self.counts,
            active,
            leader_usec_time: self.leader_usec_time,
            roster: match self.mode {
                DiscoveryMode::FullRoster => Some(self.roster),
                DiscoveryMode::LeaderOnly => None,
            },
        }
    }
}

/// Stable reorder putting endpoints whose address equals `hint` first.
pub fn apply_leader_hint(endpoints: &mut [Endpoint], hint: Option<std::net::Ipv4Addr>) {
    if let Some(hint) = hint {
        endpoints.sort_by_key(|e| e.ip != hint);
    }
}
