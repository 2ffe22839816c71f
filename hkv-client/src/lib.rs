//! # Sync Client
//!
//! Provide a lightweight, synchronous client for the key-value server's
//! binary wire protocol, with connection pooling to minimize TCP handshake
//! overhead.

mod client;
mod pool;
mod wire;

pub use client::{ClientConfig, ClientError, ClientResult, KVClient, ScoredMember};
pub use wire::Response;
