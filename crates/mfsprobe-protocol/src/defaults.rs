//! Protocol defaults -- the fixed parameter set every peer in a cluster shares.
//!
//! Command ids, reserved NOP id, frame bounds and well-known ports are
//! properties of the wire protocol and NOT node-local tunables. Timeouts and
//! retry budgets live in the client configuration instead.

/// Wire-level constants agreed between this client and all cluster servers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtocolDefaults {
    /// Offset added to every command id (0 for stock builds).
    pub proto_base: u32,
    /// Keepalive frame id; may arrive at any time instead of the awaited reply.
    pub nop_command: u32,

    // -- Framing --
    /// Upper bound on one frame's announced payload length.
    pub max_payload_bytes: usize,

    // -- Ports --
    /// Master port for client/admin traffic.
    pub master_client_port: u16,
    /// Chunk server port for client traffic.
    pub chunkserver_client_port: u16,

    // -- Client retry behaviour observed on the reference servers --
    /// Retries of one request/reply exchange after the first attempt.
    pub command_retries: u32,
    /// Connection attempts before a server is declared unreachable.
    pub connect_attempts: u32,

    // -- Scaling --
    /// Divisor turning CPU-time counters into seconds.
    pub cpu_time_divisor: f64,
    /// Microseconds per second, for node-local wall clocks.
    pub usec_per_sec: f64,
}

/// Stock MooseFS parameter set.
pub const DEFAULTS: ProtocolDefaults = ProtocolDefaults {
    proto_base: 0,
    nop_command: 0,

    // Framing
    max_payload_bytes: 128 * 1024 * 1024, // 128 MB -- large session/chunk listings

    // Ports
    master_client_port: 9421,
    chunkserver_client_port: 9422,

    // Retries
    command_retries: 3,
    connect_attempts: 4, // 3 quiet retries + 1 final attempt

    // Scaling
    cpu_time_divisor: 10_000_000.0,
    usec_per_sec: 1_000_000.0,
};
