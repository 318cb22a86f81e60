//! Cluster resolver against fake masters: role priority, leader hint,
//! legacy layouts, failure diagnosis, consistency aggregates.

use std::net::Ipv4Addr;

use mfsprobe::ClusterResolver;
use mfsprobe_protocol::{CopyAccounting, NodeState, ProtocolVersion};
use mfsprobe_topology::{
    DiscoveryMode, Endpoint, NodeRole, ProbeOutcome, SyncState, TopologyError,
};

use crate::harness::{closed_endpoint, fast_settings, modern, FakeMaster, NodeInfoBuilder, Reply};

async fn resolve(endpoints: Vec<Endpoint>, hint: Option<Ipv4Addr>) -> ClusterResolver {
    ClusterResolver::with_endpoints("test-masters", endpoints, hint, fast_settings()).await
}

#[tokio::test]
async fn test_leader_beats_elect_in_either_order() {
    let elect = FakeMaster::answering(modern(NodeState::Elect)).await;
    let leader = FakeMaster::answering(modern(NodeState::Leader)).await;

    for order in [
        vec![elect.endpoint, leader.endpoint],
        vec![leader.endpoint, elect.endpoint],
    ] {
        let mut r = resolve(order, None).await;
        assert_eq!(r.master_endpoint(), Some(leader.endpoint));
        assert_eq!(r.master_role(), Some(NodeRole::Leader));
        assert!(r.leader_found() && r.elect_found());
        assert!(r.error().is_none());
        let master = r.master().unwrap();
        assert_eq!(master.version(), ProtocolVersion::new(4, 57, 5));
        assert_eq!(master.is_pro(), Some(false));
    }
}

#[tokio::test]
async fn test_usurper_beats_follower() {
    let usurper = FakeMaster::answering(modern(NodeState::Usurper)).await;
    let follower = FakeMaster::answering(modern(NodeState::Follower)).await;

    let r = resolve(vec![follower.endpoint, usurper.endpoint], None).await;
    assert_eq!(r.master_endpoint(), Some(usurper.endpoint));
    assert!(r.usurper_found() && r.follower_found());
    assert!(!r.leader_found());
}

#[tokio::test]
async fn test_deputy_takes_leader_slot() {
    let deputy = FakeMaster::answering(modern(NodeState::Deputy)).await;
    let r = resolve(vec![deputy.endpoint], None).await;
    assert!(r.leader_found() && r.deputy_found());
    assert_eq!(r.master_role(), Some(NodeRole::Deputy));
}

#[tokio::test]
async fn test_leader_hint_probes_hinted_node_first() {
    let elect_ip = Ipv4Addr::new(127, 0, 0, 2);
    let leader_ip = Ipv4Addr::new(127, 0, 0, 3);
    let elect = FakeMaster::spawn_on(elect_ip, vec![Reply::info(modern(NodeState::Elect))]).await;
    let leader =
        FakeMaster::spawn_on(leader_ip, vec![Reply::info(modern(NodeState::Leader))]).await;
    let endpoints = vec![elect.endpoint, leader.endpoint];

    let r = resolve(endpoints.clone(), Some(leader_ip)).await;
    assert_eq!(r.endpoints()[0], leader.endpoint);
    assert_eq!(r.master_endpoint(), Some(leader.endpoint));
    // leader-only pass stopped before reaching the elect
    assert_eq!(elect.requests(), 0);
    assert_eq!(r.snapshot().mode, DiscoveryMode::LeaderOnly);

    // A stale hint changes the probe order, not the outcome.
    let r = resolve(endpoints.clone(), Some(elect_ip)).await;
    assert_eq!(r.master_endpoint(), Some(leader.endpoint));

    let r = resolve(endpoints, None).await;
    assert_eq!(r.master_endpoint(), Some(leader.endpoint));
}

#[tokio::test]
async fn test_roster_reruns_after_leader_only_pass() {
    let leader_ip = Ipv4Addr::new(127, 0, 0, 4);
    let leader =
        FakeMaster::spawn_on(leader_ip, vec![Reply::info(modern(NodeState::Leader))]).await;
    let follower = FakeMaster::answering(modern(NodeState::Follower)).await;

    let mut r = resolve(vec![follower.endpoint, leader.endpoint], Some(leader_ip)).await;
    assert!(r.snapshot().roster.is_none());
    assert_eq!(follower.requests(), 0);

    let roster = r.roster().await;
    assert_eq!(roster.len(), 2);
    assert_eq!(roster[0].endpoint, leader.endpoint);
    assert_eq!(
        roster[1].role,
        NodeRole::Follower {
            sync: SyncState::Synced
        }
    );
    assert_eq!(r.snapshot().mode, DiscoveryMode::FullRoster);
    assert_eq!(r.master_endpoint(), Some(leader.endpoint));
}

#[tokio::test]
async fn test_unresolvable_hostname() {
    let r = ClusterResolver::discover("nosuchhost.invalid", 9421, None, fast_settings()).await;
    assert!(!r.any_found());
    assert!(r.endpoints().is_empty());
    let err = r.error().unwrap();
    assert_eq!(
        err,
        TopologyError::Unresolvable {
            hosts: "nosuchhost.invalid".into()
        }
    );
    assert!(err.to_string().contains("nosuchhost.invalid"));
}

#[tokio::test]
async fn test_three_legacy_masters() {
    let servers = [
        FakeMaster::answering(vec![0; 52]).await,
        FakeMaster::answering(vec![0; 52]).await,
        FakeMaster::answering(vec![0; 52]).await,
    ];
    let mut r = resolve(servers.iter().map(|s| s.endpoint).collect(), None).await;

    assert_eq!(r.master_endpoint(), Some(servers[0].endpoint));
    let roster = r.roster().await;
    assert_eq!(roster.len(), 3);
    for entry in roster {
        assert_eq!(entry.role, NodeRole::LegacyLeader);
        assert_eq!(entry.info().unwrap().version, ProtocolVersion::new(1, 4, 0));
    }
}

#[tokio::test]
async fn test_follower_feeds_consistency() {
    let payload = NodeInfoBuilder::new(205)
        .version(4, 57, 10)
        .state(NodeState::Follower, NodeState::Follower, 1, 1)
        .metaversion(5000)
        .last_saved(4800, 0x0a0b_0c0d)
        .clock(1_700_000_000_000_000, 1_699_999_990)
        .build();
    let follower = FakeMaster::answering(payload).await;

    let mut r = resolve(vec![follower.endpoint], None).await;
    assert!(r.follower_found());
    assert!(r.master().is_none());
    assert_eq!(
        r.error(),
        Some(TopologyError::NoLeadingMaster {
            hosts: "test-masters".into()
        })
    );

    let c = r.consistency().await;
    assert_eq!(c.highest_saved_metaversion, 4800);
    assert_eq!(c.highest_metaversion_checksum, 0x0a0b_0c0d);
    assert_eq!(c.leader_usec_time, None);
    assert_eq!(c.clock_spread_usec, Some(0));
}

#[tokio::test]
async fn test_equal_saved_versions_or_checksums() {
    let leader = NodeInfoBuilder::new(205)
        .version(4, 57, 10)
        .role(NodeState::Leader)
        .last_saved(100, 0b0011)
        .clock(2_000_000, 0)
        .build();
    let follower = NodeInfoBuilder::new(205)
        .version(4, 57, 10)
        .role(NodeState::Follower)
        .last_saved(100, 0b0101)
        .clock(1_500_000, 0)
        .build();
    let a = FakeMaster::answering(leader).await;
    let b = FakeMaster::answering(follower).await;

    let mut r = resolve(vec![a.endpoint, b.endpoint], None).await;
    let c = r.consistency().await;
    assert_eq!(c.highest_saved_metaversion, 100);
    assert_eq!(c.highest_metaversion_checksum, 0b0111);
    assert_eq!(c.leader_usec_time, Some(2_000_000));

    let roster = r.roster().await.to_vec();
    let follower_info = roster[1].info().unwrap();
    assert_eq!(c.sec_delta(follower_info), 0.5);
}

#[tokio::test]
async fn test_all_unreachable() {
    let r = resolve(vec![closed_endpoint().await, closed_endpoint().await], None).await;
    assert!(!r.any_found());
    assert_eq!(
        r.error(),
        Some(TopologyError::Unreachable {
            hosts: "test-masters".into(),
            endpoints: 2
        })
    );
}

#[tokio::test]
async fn test_unknown_length_is_version_mismatch() {
    let too_new = FakeMaster::answering(vec![0; 213]).await;
    let mut r = resolve(vec![too_new.endpoint, closed_endpoint().await], None).await;

    assert!(matches!(
        r.error(),
        Some(TopologyError::VersionMismatch { endpoints: 2, .. })
    ));
    let roster = r.roster().await;
    assert_eq!(roster[0].role, NodeRole::WrongAnswer);
    assert_eq!(
        roster[0].outcome,
        ProbeOutcome::WrongAnswer { length: Some(213) }
    );
    assert_eq!(roster[1].role, NodeRole::Unreachable);
}

#[tokio::test]
async fn test_dropping_node_is_busy() {
    let flaky = FakeMaster::spawn(vec![Reply::Drop]).await;
    let leader = FakeMaster::answering(modern(NodeState::Leader)).await;

    let mut r = resolve(vec![flaky.endpoint, leader.endpoint], None).await;
    assert_eq!(r.master_endpoint(), Some(leader.endpoint));
    assert_eq!(r.roster().await[0].role, NodeRole::Busy);
    assert_eq!(r.snapshot().counts.busy, 1);
}

#[tokio::test]
async fn test_transitioning_node_does_not_lead() {
    let payload = NodeInfoBuilder::new(205)
        .version(4, 57, 10)
        .state(NodeState::Elect, NodeState::Leader, 1, 1)
        .build();
    let node = FakeMaster::answering(payload).await;

    let mut r = resolve(vec![node.endpoint], None).await;
    assert!(r.master().is_none());
    assert!(matches!(r.error(), Some(TopologyError::NoLeadingMaster { .. })));
}

#[tokio::test]
async fn test_cluster_summary_of_active_master() {
    let mut payload = NodeInfoBuilder::new(205)
        .version(4, 57, 10)
        .role(NodeState::Leader)
        .build();
    payload[4..12].copy_from_slice(&8192u64.to_be_bytes());
    let leader = FakeMaster::answering(payload).await;

    let r = resolve(vec![leader.endpoint], None).await;
    let summary = r.cluster_summary().unwrap().unwrap();
    assert_eq!(summary.memory_usage, 8192);
    assert!(matches!(summary.accounting, CopyAccounting::MetaInfo { .. }));
}
