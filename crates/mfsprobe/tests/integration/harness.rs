//! Test harness for in-process mfsprobe integration tests.
//!
//! Provides FakeMaster (a scripted TCP server on an ephemeral 127.0.0.1
//! port), a builder for node-info payloads of any known layout, and a few
//! helpers for endpoints nobody listens on.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use mfsprobe::ConnectionSettings;
use mfsprobe_protocol::commands::MATOCL_INFO;
use mfsprobe_protocol::{NodeInfoLayout, NodeState, ANTOAN_NOP};
use mfsprobe_topology::Endpoint;

/// What the fake server does with one request.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Reply {
    /// Answer with `command` and `payload`, preceded by `nops` NOP frames.
    Frame {
        command: u32,
        payload: Vec<u8>,
        nops: usize,
    },
    /// Stop accepting connections, then answer. Reconnects are refused.
    Last { command: u32, payload: Vec<u8> },
    /// Read the request and never answer.
    Hang,
    /// Close the connection without answering.
    Drop,
}

#[allow(dead_code)]
impl Reply {
    pub fn info(payload: Vec<u8>) -> Self {
        Reply::Frame {
            command: MATOCL_INFO,
            payload,
            nops: 0,
        }
    }

    pub fn with_nops(payload: Vec<u8>, nops: usize) -> Self {
        Reply::Frame {
            command: MATOCL_INFO,
            payload,
            nops,
        }
    }

    pub fn frame(command: u32, payload: Vec<u8>) -> Self {
        Reply::Frame {
            command,
            payload,
            nops: 0,
        }
    }
}

/// A scripted server. Requests are numbered across all connections; the
/// i-th request gets `script[i]`, the last entry repeating forever.
pub struct FakeMaster {
    pub endpoint: Endpoint,
    requests: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
    last_payload: Arc<std::sync::Mutex<Vec<u8>>>,
    handle: tokio::task::JoinHandle<()>,
}

#[allow(dead_code)]
impl FakeMaster {
    pub async fn spawn(script: Vec<Reply>) -> Self {
        Self::spawn_on(Ipv4Addr::LOCALHOST, script).await
    }

    /// Listen on another loopback address (127.0.0.0/8) so tests can tell
    /// servers apart by IP.
    pub async fn spawn_on(ip: Ipv4Addr, script: Vec<Reply>) -> Self {
        assert!(!script.is_empty(), "script needs at least one reply");
        let listener = TcpListener::bind((ip, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let last_payload = Arc::new(std::sync::Mutex::new(Vec::new()));
        let script = Arc::new(script);
        let gate = Arc::new(Gate::default());

        let handle = {
            let requests = requests.clone();
            let connections = connections.clone();
            let last_payload = last_payload.clone();
            tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        a = listener.accept() => a,
                        _ = gate.close.notified() => break,
                    };
                    let Ok((stream, _)) = accepted else {
                        return;
                    };
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        stream,
                        script.clone(),
                        requests.clone(),
                        last_payload.clone(),
                        gate.clone(),
                    ));
                }
                drop(listener);
                gate.closed.notify_one();
            })
        };

        Self {
            endpoint: Endpoint::new(ip, port),
            requests,
            connections,
            last_payload,
            handle,
        }
    }

    /// Server answering every request with the same node-info payload.
    pub async fn answering(payload: Vec<u8>) -> Self {
        Self::spawn(vec![Reply::info(payload)]).await
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Vec<u8> {
        self.last_payload.lock().unwrap().clone()
    }
}

impl Drop for FakeMaster {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Lets a connection shut the listener down before it answers.
#[derive(Default)]
struct Gate {
    close: Notify,
    closed: Notify,
}

async fn serve(
    mut stream: TcpStream,
    script: Arc<Vec<Reply>>,
    requests: Arc<AtomicUsize>,
    last_payload: Arc<std::sync::Mutex<Vec<u8>>>,
    gate: Arc<Gate>,
) {
    loop {
        let mut header = [0u8; 8];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut payload = vec![0u8; len];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }
        *last_payload.lock().unwrap() = payload;

        let n = requests.fetch_add(1, Ordering::SeqCst);
        let reply = script[n.min(script.len() - 1)].clone();
        match reply {
            Reply::Frame {
                command,
                payload,
                nops,
            } => {
                let mut wire = Vec::new();
                for _ in 0..nops {
                    wire.extend(frame(ANTOAN_NOP, &[]));
                }
                wire.extend(frame(command, &payload));
                if stream.write_all(&wire).await.is_err() {
                    return;
                }
            }
            Reply::Last { command, payload } => {
                gate.close.notify_one();
                gate.closed.notified().await;
                if stream.write_all(&frame(command, &payload)).await.is_err() {
                    return;
                }
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return;
            }
            Reply::Drop => return,
        }
    }
}

pub fn frame(command: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&command.to_be_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// An endpoint on 127.0.0.1 with nothing listening.
pub async fn closed_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new(Ipv4Addr::LOCALHOST, port)
}

/// Short budgets so failing paths finish quickly.
pub fn fast_settings() -> ConnectionSettings {
    ConnectionSettings {
        connect_timeout: Duration::from_millis(200),
        reconnect_timeout: Duration::from_millis(200),
        connect_attempts: 2,
        io_timeout: Duration::from_millis(300),
        command_retries: 3,
    }
}

// ============================================================================
// Node-info payload builder
// ============================================================================

/// Builds a node-info payload of a known length, writing each block at the
/// offset the layout table gives for that length.
#[derive(Debug, Clone)]
pub struct NodeInfoBuilder {
    buf: Vec<u8>,
    layout: &'static NodeInfoLayout,
}

#[allow(dead_code)]
impl NodeInfoBuilder {
    pub fn new(length: usize) -> Self {
        let layout = NodeInfoLayout::for_length(length).unwrap();
        Self {
            buf: vec![0u8; length],
            layout,
        }
    }

    /// Wire version triple (header layouts only).
    pub fn version(mut self, major: u16, minor: u8, patch: u8) -> Self {
        self.buf[0..2].copy_from_slice(&major.to_be_bytes());
        self.buf[2] = minor;
        self.buf[3] = patch;
        self
    }

    pub fn state(mut self, working: NodeState, next: NodeState, stable: u8, sync: u8) -> Self {
        let at = self.layout.state.expect("layout has no state block");
        self.buf[at] = working.to_wire();
        self.buf[at + 1] = next.to_wire();
        self.buf[at + 2] = stable;
        self.buf[at + 3] = sync;
        self
    }

    /// Shorthand for a settled node: working == next, stable, synced.
    pub fn role(self, state: NodeState) -> Self {
        self.state(state, state, 1, 1)
    }

    pub fn metaversion(mut self, v: u64) -> Self {
        let at = self.layout.state.expect("layout has no state block") + 12;
        self.buf[at..at + 8].copy_from_slice(&v.to_be_bytes());
        self
    }

    pub fn last_saved(mut self, metaversion: u64, checksum: u32) -> Self {
        let at = self.layout.meta.expect("layout has no meta block");
        self.buf[at + 8..at + 16].copy_from_slice(&metaversion.to_be_bytes());
        self.buf[at + 16..at + 20].copy_from_slice(&checksum.to_be_bytes());
        self
    }

    pub fn clock(mut self, usec_time: u64, last_changelog_time: u32) -> Self {
        let at = self.layout.clock.expect("layout has no clock block");
        self.buf[at..at + 8].copy_from_slice(&usec_time.to_be_bytes());
        self.buf[at + 8..at + 12].copy_from_slice(&last_changelog_time.to_be_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// A 205-byte reply from a current master in a settled `state`.
pub fn modern(state: NodeState) -> Vec<u8> {
    NodeInfoBuilder::new(205)
        .version(4, 57, 10)
        .role(state)
        .build()
}
