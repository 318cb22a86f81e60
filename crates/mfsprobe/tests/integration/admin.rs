//! Administrative requests through the connection the resolver selected.

use std::net::Ipv4Addr;

use mfsprobe::{ClusterResolver, CommandError};
use mfsprobe_protocol::admin::ERROR_NOTFOUND;
use mfsprobe_protocol::commands::{MATOCL_CSSERV_COMMAND, MATOCL_MLOG_LIST, MATOCL_SESSION_COMMAND};
use mfsprobe_protocol::{ChunkServerCommand, CommandStatus, NodeState, ProtocolVersion};
use mfsprobe_topology::{NodeRole, TopologyError};

use crate::harness::{fast_settings, modern, FakeMaster, NodeInfoBuilder, Reply};

async fn leader_then(reply: Reply) -> (FakeMaster, ClusterResolver) {
    let server = FakeMaster::spawn(vec![Reply::info(modern(NodeState::Leader)), reply]).await;
    let r =
        ClusterResolver::with_endpoints("admin", vec![server.endpoint], None, fast_settings())
            .await;
    (server, r)
}

#[tokio::test]
async fn test_cs_maintenance_on() {
    let (server, mut r) = leader_then(Reply::frame(MATOCL_CSSERV_COMMAND, vec![0])).await;
    let master = r.master().unwrap();

    let status = master
        .cs_command(
            ChunkServerCommand::MaintenanceOn,
            Ipv4Addr::new(10, 0, 0, 5),
            9422,
        )
        .await
        .unwrap();
    assert_eq!(status, CommandStatus::Ok);
    assert_eq!(server.last_payload(), vec![2, 10, 0, 0, 5, 0x24, 0xce]);
    // the probe connection was reused
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_session_remove_not_found() {
    let (server, mut r) =
        leader_then(Reply::frame(MATOCL_SESSION_COMMAND, vec![ERROR_NOTFOUND])).await;
    let status = r.master().unwrap().session_remove(77).await.unwrap();
    assert_eq!(status, CommandStatus::NotFound);
    assert_eq!(server.last_payload(), vec![0, 0, 0, 0, 77]);
}

#[tokio::test]
async fn test_metalogger_list() {
    let mut list = Vec::new();
    list.extend_from_slice(&[0, 4, 57, 10, 10, 0, 0, 8]);
    list.extend_from_slice(&[0, 4, 56, 2, 10, 0, 0, 9]);
    let (_server, mut r) = leader_then(Reply::frame(MATOCL_MLOG_LIST, list)).await;

    let loggers = r.master().unwrap().metaloggers().await.unwrap();
    assert_eq!(loggers.len(), 2);
    assert_eq!(loggers[0].version, ProtocolVersion::new(4, 57, 10));
    assert_eq!(loggers[1].ip, Ipv4Addr::new(10, 0, 0, 9));
}

#[tokio::test]
async fn test_malformed_metalogger_list() {
    let (_server, mut r) = leader_then(Reply::frame(MATOCL_MLOG_LIST, vec![0; 12])).await;
    let err = r.master().unwrap().metaloggers().await.unwrap_err();
    assert!(matches!(err, CommandError::Decode(_)));
}

#[tokio::test]
async fn test_back_to_work_gated_on_legacy_master() {
    // 1.6.x masters answer with the 68-byte layout
    let payload = NodeInfoBuilder::new(68).version(1, 6, 20).build();
    let server = FakeMaster::answering(payload).await;
    let mut r =
        ClusterResolver::with_endpoints("admin", vec![server.endpoint], None, fast_settings())
            .await;

    let master = r.master().unwrap();
    assert_eq!(master.version(), ProtocolVersion::new(1, 6, 20));
    let err = master
        .cs_command(ChunkServerCommand::BackToWork, Ipv4Addr::new(10, 0, 0, 5), 9422)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Unsupported { .. }));
    assert_eq!(server.requests(), 1);
}

#[tokio::test]
async fn test_admin_refused_without_leader() {
    let server = FakeMaster::answering(modern(NodeState::Elect)).await;
    let mut r =
        ClusterResolver::with_endpoints("admin", vec![server.endpoint], None, fast_settings())
            .await;
    assert!(r.elect_found() && !r.leader_found());
    assert!(r.error().is_none());
    assert_eq!(
        r.leader_master().unwrap_err(),
        TopologyError::NoLeader {
            hosts: "admin".into()
        }
    );

    // the elect holds the active slot but must not receive mutations
    let master = r.master().unwrap();
    assert_eq!(master.role(), Some(NodeRole::Elect));
    let err = master
        .cs_command(ChunkServerCommand::Remove, Ipv4Addr::new(10, 0, 0, 5), 9422)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::NotLeader { .. }));
    let err = master.session_remove(77).await.unwrap_err();
    assert!(matches!(err, CommandError::NotLeader { .. }));

    // only the node-info request reached the server
    assert_eq!(server.requests(), 1);
}

#[tokio::test]
async fn test_leader_master_after_usurper_and_leader() {
    let usurper = FakeMaster::answering(modern(NodeState::Usurper)).await;
    let leader = FakeMaster::spawn(vec![
        Reply::info(modern(NodeState::Leader)),
        Reply::frame(MATOCL_SESSION_COMMAND, vec![0]),
    ])
    .await;
    let mut r = ClusterResolver::with_endpoints(
        "admin",
        vec![usurper.endpoint, leader.endpoint],
        None,
        fast_settings(),
    )
    .await;

    let master = r.leader_master().unwrap();
    assert_eq!(master.endpoint(), leader.endpoint);
    assert_eq!(master.session_remove(3).await.unwrap(), CommandStatus::Ok);
    assert_eq!(usurper.requests(), 1);
}
