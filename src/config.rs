// config.rs — Compile-time configuration constants.
//
// The server takes no command-line flags, environment variables, or
// configuration file; every tunable lives here as a named constant.

/// Maximum message payload size, in bytes. A frame on the wire is this plus
/// the 4-byte length header. Oversized frames close the connection;
/// oversized responses are replaced by a too-big error.
pub const MAX_MSG: usize = 4096;

/// Maximum number of arguments in a single request.
pub const MAX_ARGS: usize = 1024;

/// Load factor (entries per bucket) at which the hash map starts a
/// progressive resize into a table of double capacity.
pub const MAX_LOAD_FACTOR: usize = 8;

/// Upper bound on relocation work done per map operation while a resize is
/// in progress.
pub const REHASH_WORK: usize = 128;

/// Initial bucket-array capacity of a fresh hash map. Always a power of two.
pub const INITIAL_CAPACITY: usize = 4;

/// Connections with no I/O activity for this long are closed by the timer pass.
pub const IDLE_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on expired keys collected in one timer pass.
pub const TTL_EXPIRE_BATCH: usize = 2_000;

/// Sorted sets with more members than this are destroyed on the worker pool
/// rather than inline, so that freeing them does not stall the event loop.
pub const LARGE_ZSET_LEN: usize = 10_000;

/// Number of worker threads dedicated to large-object destruction.
pub const DESTROYER_THREADS: usize = 4;

/// Poll timeout when no connection or TTL deadline is pending, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;

/// TCP port the server binary listens on.
pub const DEFAULT_PORT: u16 = 1234;
