// minkv — in-memory key-value server over a length-prefixed TCP protocol

#[macro_use]
pub mod log;

pub mod avl;
pub mod client;
pub mod commands;
pub mod config;
pub mod conn;
pub mod hash;
pub mod heap;
pub mod idle;
pub mod keyspace;
pub mod net;
pub mod protocol;
pub mod server;
pub mod threadpool;
pub mod zset;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level convenience re-exports for the most common entry points.
// ─────────────────────────────────────────────────────────────────────────────

/// The server: owns the listening socket, all connections, and the keyspace.
pub use server::Server;

/// Blocking client used by the command-line tool and the wire tests.
pub use client::Client;

/// Render a response payload as human-readable text.
pub use client::render_response;

/// The unit of storage: one key, one tagged value, an optional TTL slot.
pub use keyspace::{Entry, Keyspace, Value};

/// Progressive two-table hash map.
pub use hash::HMap;

/// Sorted set of `(score, member)` tuples, indexed by order and by name.
pub use zset::ZSet;
