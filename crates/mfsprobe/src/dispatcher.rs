//! Concurrent dispatcher -- one resilient exchange per endpoint under a
//! single wall-clock deadline.
//!
//! Every endpoint gets its own tokio task and owns its `Connection`
//! exclusively. Results are keyed by `"ip:port"`. Endpoints that fail or
//! are still in flight when the deadline hits are simply missing from the
//! map; the deadline aborts the stragglers and their sockets are dropped
//! before `run` returns.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use mfsprobe_topology::Endpoint;

use crate::config::ProbeConfig;
use crate::connection::{CommunicationError, Connection, ConnectionSettings};

pub struct Dispatcher {
    deadline: Duration,
    settings: ConnectionSettings,
}

impl Dispatcher {
    pub fn new(deadline: Duration, settings: ConnectionSettings) -> Self {
        Self { deadline, settings }
    }

    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self::new(
            cfg.dispatch.deadline(),
            ConnectionSettings::for_dispatch(&cfg.dispatch, cfg.connection.command_retries),
        )
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Same request to every endpoint.
    pub async fn run(
        &self,
        endpoints: &[Endpoint],
        cmd_out: u32,
        cmd_in: u32,
        payload: Bytes,
    ) -> HashMap<String, Bytes> {
        self.run_each(
            endpoints.iter().map(|e| (*e, payload.clone())).collect(),
            cmd_out,
            cmd_in,
        )
        .await
    }

    /// A distinct request payload per endpoint.
    pub async fn run_each(
        &self,
        requests: Vec<(Endpoint, Bytes)>,
        cmd_out: u32,
        cmd_in: u32,
    ) -> HashMap<String, Bytes> {
        let settings = self.settings;
        let jobs = requests
            .into_iter()
            .map(|(endpoint, payload)| {
                let job = async move {
                    let mut conn = Connection::new(endpoint, settings);
                    let result = conn.command(cmd_out, cmd_in, payload).await;
                    conn.shutdown().await;
                    result
                };
                (endpoint, job)
            })
            .collect();
        self.fan_out(jobs).await
    }

    /// Several payloads in sequence per endpoint, over one connection per
    /// endpoint. An endpoint appears in the result only if every one of its
    /// requests was answered.
    pub async fn run_batch(
        &self,
        requests: Vec<(Endpoint, Vec<Bytes>)>,
        cmd_out: u32,
        cmd_in: u32,
    ) -> HashMap<String, Vec<Bytes>> {
        let settings = self.settings;
        let jobs = requests
            .into_iter()
            .map(|(endpoint, payloads)| {
                let job = async move {
                    let mut conn = Connection::new(endpoint, settings);
                    let result = conn.command_batch(cmd_out, cmd_in, &payloads).await;
                    conn.shutdown().await;
                    result
                };
                (endpoint, job)
            })
            .collect();
        self.fan_out(jobs).await
    }

    async fn fan_out<T, F>(&self, jobs: Vec<(Endpoint, F)>) -> HashMap<String, T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, CommunicationError>> + Send + 'static,
    {
        let mut results = HashMap::with_capacity(jobs.len());
        if jobs.is_empty() {
            return results;
        }

        let deadline = Instant::now() + self.deadline;
        let mut tasks = JoinSet::new();
        for (endpoint, job) in jobs {
            let key = endpoint.key();
            tasks.spawn(async move { (key, job.await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((key, Ok(value))))) => {
                    debug!(endpoint = %key, "answered");
                    results.insert(key, value);
                }
                Ok(Some(Ok((key, Err(e))))) => {
                    warn!(endpoint = %key, error = %e, "no answer");
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "dispatch task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = tasks.len(),
                        deadline_ms = self.deadline.as_millis() as u64,
                        "deadline elapsed, cancelling"
                    );
                    // Abort and reap: aborted tasks drop their sockets.
                    tasks.shutdown().await;
                    break;
                }
            }
        }
        results
    }
}
