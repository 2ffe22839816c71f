//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for issuing commands to the
//! key-value server over its binary length-prefixed protocol.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides pooling and protocol details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors.
//! 4. **Performance First**: Prefer direct TCP writes and buffer reuse.

use std::fmt;
use std::time::Duration;

use hkv_common::protocol::{read_f64_le, read_i64_le, read_u32_le, Status};

use crate::pool::{ConnectionPool, PoolConfig};

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    Io(std::io::Error),
    /// Frame framing violation: bad length, bad status code, truncated read.
    Protocol,
    /// Server returned `Status::Err` for the request.
    Server,
    /// Pool is at capacity and no idle connections are available.
    PoolExhausted,
    /// Address could not be parsed into a socket address.
    InvalidAddress,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "io error: {}", err),
            ClientError::Protocol => write!(f, "protocol error"),
            ClientError::Server => write!(f, "server returned an error status"),
            ClientError::PoolExhausted => write!(f, "connection pool exhausted"),
            ClientError::InvalidAddress => write!(f, "invalid address"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Configuration for the synchronous client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:1234".
    pub addr: String,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:1234".to_string(),
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// A member/score pair as returned by `zquery`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMember {
    pub name: Vec<u8>,
    pub score: f64,
}

/// Synchronous client with connection pooling.
///
/// This is a facade over the pool and the wire codec. Each call acquires a
/// connection, executes one command, and returns the connection to the pool.
pub struct KVClient {
    pool: ConnectionPool,
}

impl KVClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.addr = addr.into();
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        })?;
        Ok(KVClient { pool })
    }

    /// Fetches a value by key. Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"get", key])?;
        match resp.status {
            Status::Ok => Ok(Some(resp.data)),
            Status::Nx => Ok(None),
            Status::Err => Err(ClientError::Server),
        }
    }

    /// Sets a value for a key, leaving any existing TTL untouched.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"set", key, value])?;
        expect_ok(resp.status)
    }

    /// Deletes a key, if present.
    pub fn del(&self, key: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"del", key])?;
        expect_ok(resp.status)
    }

    /// Schedules expiry `ttl_ms` from now. `ttl_ms == -1` clears any TTL.
    /// Returns `Ok(false)` when the key does not exist.
    pub fn pexpire(&self, key: &[u8], ttl_ms: i64) -> ClientResult<bool> {
        // Numeric command arguments travel as decimal ASCII, matching the
        // dispatcher's `parse_i64`/`parse_f64`; only response payloads
        // (scores, TTLs) use the fixed-width binary encoding.
        let ttl_bytes = ttl_ms.to_string().into_bytes();
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"pexpire", key, &ttl_bytes])?;
        match resp.status {
            Status::Ok => Ok(true),
            Status::Nx => Ok(false),
            Status::Err => Err(ClientError::Server),
        }
    }

    /// Remaining TTL in milliseconds: `-2` if the key is missing, `-1` if it
    /// has no TTL, otherwise the milliseconds until expiry.
    pub fn pttl(&self, key: &[u8]) -> ClientResult<i64> {
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"pttl", key])?;
        match resp.status {
            Status::Ok => Ok(read_i64_le(&resp.data)),
            Status::Nx => Ok(-2),
            Status::Err => Err(ClientError::Server),
        }
    }

    /// Lists keys matching a glob pattern (`*`/`?`).
    pub fn keys(&self, pattern: &[u8]) -> ClientResult<Vec<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"keys", pattern])?;
        expect_ok(resp.status)?;
        Ok(decode_key_list(&resp.data))
    }

    /// Adds or updates a sorted-set member's score. Returns `true` if the
    /// member was newly inserted.
    pub fn zadd(&self, key: &[u8], member: &[u8], score: f64) -> ClientResult<bool> {
        let score_bytes = score.to_string().into_bytes();
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"zadd", key, &score_bytes, member])?;
        expect_ok(resp.status)?;
        Ok(read_u32_le(&resp.data) != 0)
    }

    /// Removes a member from a sorted set. A no-op if the key or member is
    /// missing.
    pub fn zrem(&self, key: &[u8], member: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"zrem", key, member])?;
        expect_ok(resp.status)
    }

    /// Looks up a sorted-set member's score. `Ok(None)` if absent.
    pub fn zscore(&self, key: &[u8], member: &[u8]) -> ClientResult<Option<f64>> {
        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[b"zscore", key, member])?;
        match resp.status {
            Status::Ok => Ok(Some(read_f64_le(&resp.data))),
            Status::Nx => Ok(None),
            Status::Err => Err(ClientError::Server),
        }
    }

    /// Range query over a sorted set: members at or after `(min_score,
    /// min_name)` in sort order, skipping `offset` and returning at most
    /// `limit` results.
    pub fn zquery(
        &self,
        key: &[u8],
        min_score: f64,
        min_name: &[u8],
        offset: i64,
        limit: usize,
    ) -> ClientResult<Vec<ScoredMember>> {
        let score_bytes = min_score.to_string().into_bytes();
        let offset_bytes = offset.to_string().into_bytes();
        let limit_bytes = limit.to_string().into_bytes();

        let mut conn = self.pool.acquire()?;
        let resp = conn.exec(&[
            b"zquery",
            key,
            &score_bytes,
            min_name,
            &offset_bytes,
            &limit_bytes,
        ])?;
        expect_ok(resp.status)?;
        decode_scored_members(&resp.data)
    }
}

fn expect_ok(status: Status) -> ClientResult<()> {
    match status {
        Status::Ok => Ok(()),
        Status::Nx => Ok(()),
        Status::Err => Err(ClientError::Server),
    }
}

fn decode_key_list(data: &[u8]) -> Vec<Vec<u8>> {
    let mut cursor = 0;
    let count = read_u32_le(&data[cursor..cursor + 4]);
    cursor += 4;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_u32_le(&data[cursor..cursor + 4]) as usize;
        cursor += 4;
        keys.push(data[cursor..cursor + len].to_vec());
        cursor += len;
    }
    keys
}

fn decode_scored_members(data: &[u8]) -> ClientResult<Vec<ScoredMember>> {
    if data.len() < 4 {
        return Err(ClientError::Protocol);
    }
    let mut cursor = 0;
    let count = read_u32_le(&data[cursor..cursor + 4]);
    cursor += 4;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = read_u32_le(&data[cursor..cursor + 4]) as usize;
        cursor += 4;
        let name = data[cursor..cursor + len].to_vec();
        cursor += len;
        let score = read_f64_le(&data[cursor..cursor + 8]);
        cursor += 8;
        members.push(ScoredMember { name, score });
    }
    Ok(members)
}
