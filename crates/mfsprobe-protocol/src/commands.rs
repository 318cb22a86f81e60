//! Command identifiers for the request/reply pairs this client speaks.
//!
//! Naming follows the server sources: `CLTOMA_*` client to master,
//! `MATOCL_*` master to client, `CLTOCS_*`/`CSTOCL_*` for chunk servers.

use crate::defaults::DEFAULTS;

const BASE: u32 = DEFAULTS.proto_base;

// ============================================================================
// Discovery
// ============================================================================

/// Node-info request. Empty payload.
pub const CLTOMA_INFO: u32 = BASE + 510;
/// Node-info reply. Layout depends on payload length, see `node_info`.
pub const MATOCL_INFO: u32 = BASE + 511;

// ============================================================================
// Reports
// ============================================================================

pub const CLTOMA_CSERV_LIST: u32 = BASE + 500;
pub const MATOCL_CSERV_LIST: u32 = BASE + 501;
pub const CLTOMA_SESSION_LIST: u32 = BASE + 508;
pub const MATOCL_SESSION_LIST: u32 = BASE + 509;
/// Metalogger list request. Empty payload.
pub const CLTOMA_MLOG_LIST: u32 = BASE + 522;
/// Metalogger list reply: N * [ version:32 ip:32 ].
pub const MATOCL_MLOG_LIST: u32 = BASE + 523;
pub const CLTOMA_INSTANCE_NAME: u32 = BASE + 550;
pub const MATOCL_INSTANCE_NAME: u32 = BASE + 551;
pub const CLTOCS_HDD_LIST: u32 = BASE + 600;
pub const CSTOCL_HDD_LIST: u32 = BASE + 601;

// ============================================================================
// Administrative commands
// ============================================================================

/// commandid:8 ip:32 port:16 (version >= 1.6.28)
pub const CLTOMA_CSSERV_COMMAND: u32 = BASE + 524;
/// status:8
pub const MATOCL_CSSERV_COMMAND: u32 = BASE + 525;
/// commandid:8 sessionid:32
pub const CLTOMA_SESSION_COMMAND: u32 = BASE + 526;
/// status:8
pub const MATOCL_SESSION_COMMAND: u32 = BASE + 527;

/// Human-readable name for logging.
pub fn command_name(id: u32) -> &'static str {
    match id {
        x if x == DEFAULTS.nop_command => "ANTOAN_NOP",
        CLTOMA_INFO => "CLTOMA_INFO",
        MATOCL_INFO => "MATOCL_INFO",
        CLTOMA_CSERV_LIST => "CLTOMA_CSERV_LIST",
        MATOCL_CSERV_LIST => "MATOCL_CSERV_LIST",
        CLTOMA_SESSION_LIST => "CLTOMA_SESSION_LIST",
        MATOCL_SESSION_LIST => "MATOCL_SESSION_LIST",
        CLTOMA_MLOG_LIST => "CLTOMA_MLOG_LIST",
        MATOCL_MLOG_LIST => "MATOCL_MLOG_LIST",
        CLTOMA_INSTANCE_NAME => "CLTOMA_INSTANCE_NAME",
        MATOCL_INSTANCE_NAME => "MATOCL_INSTANCE_NAME",
        CLTOCS_HDD_LIST => "CLTOCS_HDD_LIST",
        CSTOCL_HDD_LIST => "CSTOCL_HDD_LIST",
        CLTOMA_CSSERV_COMMAND => "CLTOMA_CSSERV_COMMAND",
        MATOCL_CSSERV_COMMAND => "MATOCL_CSSERV_COMMAND",
        CLTOMA_SESSION_COMMAND => "CLTOMA_SESSION_COMMAND",
        MATOCL_SESSION_COMMAND => "MATOCL_SESSION_COMMAND",
        _ => "UNKNOWN",
    }
}
