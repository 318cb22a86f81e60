//! mfsprobe -- client control layer for a MooseFS cluster.
//!
//! Frame transport and resilient connection over tokio TCP, a concurrent
//! dispatcher with a shared deadline, and the resolver that finds the
//! active master. Re-exports the types integration tests and main.rs use.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod master;
pub mod report;
pub mod resolve;
pub mod resolver;
pub mod transport;

pub use config::ProbeConfig;
pub use connection::{CommunicationError, Connection, ConnectionSettings, ConnectionState};
pub use dispatcher::Dispatcher;
pub use master::{CommandError, MasterConnection};
pub use resolver::ClusterResolver;
pub use transport::FrameTransport;

use std::path::PathBuf;

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_or_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn dirs_or_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
