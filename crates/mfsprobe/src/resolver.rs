//! Cluster topology resolver.
//!
//! Resolves the configured host list, probes endpoints one by one with the
//! node-info command and feeds each outcome into a `Discovery` pass. The
//! resulting `Snapshot` owns the live connection of the selected master.
//! Re-running discovery replaces the snapshot wholesale.

use bytes::Bytes;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use mfsprobe_protocol::commands::{CLTOMA_INFO, MATOCL_INFO};
use mfsprobe_protocol::{ClusterSummary, DecodeError, NodeInfo};
use mfsprobe_topology::{
    apply_leader_hint, Consistency, Discovery, DiscoveryMode, Endpoint, NodeRole, ProbeOutcome,
    RoleFlags, RosterEntry, Snapshot, Step, TopologyError,
};

use crate::config::ProbeConfig;
use crate::connection::{CommunicationError, Connection, ConnectionSettings};
use crate::master::MasterConnection;
use crate::resolve::resolve_endpoints;

pub struct ClusterResolver {
    hosts: String,
    endpoints: Vec<Endpoint>,
    settings: ConnectionSettings,
    snapshot: Snapshot<MasterConnection>,
}

impl ClusterResolver {
    /// Resolve `hosts` and run the first discovery pass.
    ///
    /// With a leader hint the pass stops at the first leader; without one
    /// every endpoint is probed.
    pub async fn discover(
        hosts: &str,
        port: u16,
        leader_hint: Option<Ipv4Addr>,
        settings: ConnectionSettings,
    ) -> Self {
        let endpoints = resolve_endpoints(hosts, port).await;
        Self::with_endpoints(hosts, endpoints, leader_hint, settings).await
    }

    /// Run the first pass over already resolved endpoints. `hosts` is only
    /// used in error messages.
    pub async fn with_endpoints(
        hosts: &str,
        mut endpoints: Vec<Endpoint>,
        leader_hint: Option<Ipv4Addr>,
        settings: ConnectionSettings,
    ) -> Self {
        apply_leader_hint(&mut endpoints, leader_hint);
        let mode = if leader_hint.is_some() {
            DiscoveryMode::LeaderOnly
        } else {
            DiscoveryMode::FullRoster
        };
        let snapshot = discovery_pass(&endpoints, settings, mode).await;
        Self {
            hosts: hosts.to_string(),
            endpoints,
            settings,
            snapshot,
        }
    }

    pub async fn from_config(cfg: &ProbeConfig) -> Self {
        Self::discover(
            &cfg.master.hosts,
            cfg.master.port,
            cfg.master.leader_hint,
            ConnectionSettings::from(&cfg.connection),
        )
        .await
    }

    /// Probe again and replace the snapshot.
    pub async fn rediscover(&mut self, mode: DiscoveryMode) {
        self.snapshot = discovery_pass(&self.endpoints, self.settings, mode).await;
    }

    // ========================================================================
    // Role queries
    // ========================================================================

    pub fn found(&self) -> RoleFlags {
        self.snapshot.found
    }

    pub fn any_found(&self) -> bool {
        self.snapshot.found.any()
    }

    pub fn leading_found(&self) -> bool {
        self.snapshot.found.leading()
    }

    pub fn leader_found(&self) -> bool {
        self.snapshot.found.leader
    }

    pub fn elect_found(&self) -> bool {
        self.snapshot.found.elect
    }

    pub fn usurper_found(&self) -> bool {
        self.snapshot.found.usurper
    }

    pub fn follower_found(&self) -> bool {
        self.snapshot.found.follower
    }

    pub fn deputy_found(&self) -> bool {
        self.snapshot.found.deputy
    }

    // ========================================================================
    // Snapshot access
    // ========================================================================

    pub fn hosts(&self) -> &str {
        &self.hosts
    }

    /// Endpoints in probe order (leader hint applied).
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn snapshot(&self) -> &Snapshot<MasterConnection> {
        &self.snapshot
    }

    /// Cluster-wide failure, if the last pass found nothing usable.
    pub fn error(&self) -> Option<TopologyError> {
        self.snapshot.diagnose(&self.hosts)
    }

    /// Connection to the active master.
    pub fn master(&mut self) -> Option<&mut MasterConnection> {
        self.snapshot.active.as_mut().map(|c| &mut c.conn)
    }

    /// Connection to the leader, for requests that change cluster state.
    /// An elect or usurper holding the active slot is not enough.
    pub fn leader_master(&mut self) -> Result<&mut MasterConnection, TopologyError> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        let hosts = self.hosts.clone();
        let leader_found = self.snapshot.found.leader;
        match self.snapshot.active.as_mut() {
            Some(c) if leader_found && c.conn.is_leader() => Ok(&mut c.conn),
            _ => Err(TopologyError::NoLeader { hosts }),
        }
    }

    pub fn master_endpoint(&self) -> Option<Endpoint> {
        self.snapshot.active.as_ref().map(|c| c.endpoint)
    }

    pub fn master_role(&self) -> Option<NodeRole> {
        self.snapshot.active.as_ref().map(|c| c.role)
    }

    pub fn master_info(&self) -> Option<&NodeInfo> {
        self.snapshot.active.as_ref().map(|c| &c.info)
    }

    /// Cluster counters from the active master's node-info reply.
    pub fn cluster_summary(&self) -> Option<Result<ClusterSummary, DecodeError>> {
        self.snapshot
            .active
            .as_ref()
            .map(|c| ClusterSummary::decode(&c.raw))
    }

    /// Classified roster of every endpoint. Runs a full pass first when the
    /// current snapshot came from a leader-only pass.
    pub async fn roster(&mut self) -> &[RosterEntry] {
        if self.snapshot.roster.is_none() {
            self.rediscover(DiscoveryMode::FullRoster).await;
        }
        self.snapshot.roster.as_deref().unwrap_or(&[])
    }

    pub async fn consistency(&mut self) -> Consistency {
        self.roster().await;
        let roster = self.snapshot.roster.as_deref().unwrap_or(&[]);
        Consistency::compute(roster, self.snapshot.leader_usec_time)
    }
}

/// Probe one endpoint with the node-info command. The live connection is
/// returned alongside an answered probe.
pub async fn probe(
    endpoint: Endpoint,
    settings: ConnectionSettings,
) -> (ProbeOutcome, Option<MasterConnection>) {
    let mut conn = Connection::new(endpoint, settings);
    if let Err(e) = conn.connect().await {
        debug!(%endpoint, error = %e, "unreachable");
        return (ProbeOutcome::Unreachable, None);
    }

    let reply = match conn.command(CLTOMA_INFO, MATOCL_INFO, Bytes::new()).await {
        Ok(reply) => reply,
        Err(CommunicationError::BadAnswer { .. }) => {
            warn!(%endpoint, "wrong command id in reply");
            return (ProbeOutcome::WrongAnswer { length: None }, None);
        }
        Err(e) => {
            warn!(%endpoint, error = %e, "busy");
            return (ProbeOutcome::Busy, None);
        }
    };

    match NodeInfo::decode(&reply) {
        Ok(info) => {
            let mut master = MasterConnection::from_connection(conn);
            master.set_version(info.version);
            master.set_role(NodeRole::from_info(&info));
            (
                ProbeOutcome::Answered {
                    info,
                    raw: reply.to_vec(),
                },
                Some(master),
            )
        }
        Err(e) => {
            warn!(%endpoint, error = %e, "undecodable node info");
            (
                ProbeOutcome::WrongAnswer {
                    length: Some(reply.len()),
                },
                None,
            )
        }
    }
}

async fn discovery_pass(
    endpoints: &[Endpoint],
    settings: ConnectionSettings,
    mode: DiscoveryMode,
) -> Snapshot<MasterConnection> {
    let mut discovery = Discovery::new(mode);
    for &endpoint in endpoints {
        let (outcome, conn) = probe(endpoint, settings).await;
        if discovery.observe(endpoint, outcome, conn) == Step::Stop {
            break;
        }
    }
    let snapshot = discovery.finish();

    match &snapshot.active {
        Some(c) => info!(
            endpoint = %c.endpoint,
            role = %c.role,
            version = %c.info.version.release(),
            probed = snapshot.counts.probed,
            "active master selected"
        ),
        None => info!(
            probed = snapshot.counts.probed,
            unreachable = snapshot.counts.unreachable,
            busy = snapshot.counts.busy,
            wrong_answer = snapshot.counts.wrong_answer,
            "no active master"
        ),
    }
    snapshot
}
