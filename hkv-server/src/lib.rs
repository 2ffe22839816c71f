//! hkv-server - the TCP-facing binary: wire framing, command dispatch, and
//! the single-threaded non-blocking event loop that drives `hkv-engine`'s
//! `Keyspace` (spec.md §4.7).
//!
//! Split out as a library so integration tests and `hkv-bench` can drive a
//! real `EventLoop` in-process without spawning the `hkv-server` binary.

pub mod config;
pub mod conn;
pub mod dispatcher;
pub mod event_loop;
pub mod framer;
pub mod metrics;

pub use config::ServerConfig;
pub use event_loop::EventLoop;
pub use metrics::Metrics;
