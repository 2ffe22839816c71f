//! Single-threaded, non-blocking event loop (spec.md §4.7).
//!
//! Built on `mio::Poll` for readiness-based multiplexing — the idiomatic
//! Rust analogue of the spec's manual `poll`/`epoll` readiness sets (Open
//! Question 1 in spec.md §9 is resolved in favor of readiness-set
//! semantics, which is exactly what `mio` exposes).

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Buf;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use hkv_engine::Keyspace;

use crate::conn::Conn;
use crate::config::ServerConfig;
use crate::dispatcher;
use crate::framer::{self, ParseOutcome};
use crate::metrics::Metrics;

const LISTENER: Token = Token(0);
const READ_CHUNK: usize = 64 * 1024;
/// Upper bound on the readiness-wait timeout, even when the TTL heap is
/// empty, so the loop can still notice things like a shutdown signal.
const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(10);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Owns the listener, every live connection, the keyspace, and the metrics
/// aggregator. `run` never returns except on a fatal I/O error from the
/// listener's own registration.
pub struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    conns: HashMap<Token, Conn>,
    next_token: usize,
    keyspace: Keyspace,
    config: ServerConfig,
    metrics: Metrics,
}

impl EventLoop {
    pub fn bind(config: ServerConfig) -> io::Result<Self> {
        let addr = format!("{}:{}", config.bind, config.port)
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("bad address: {e}")))?;

        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let keyspace = Keyspace::new(config.worker_count(), config.zset_offload_threshold);

        Ok(EventLoop {
            poll,
            listener,
            conns: HashMap::new(),
            next_token: 1,
            keyspace,
            config,
            metrics: Metrics::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runs the loop forever (or until a fatal error registering readiness).
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.run_once(&mut events)?;
        }
    }

    /// Runs exactly one iteration: wait, accept, service readable/writable
    /// connections, then drive the TTL expiration tick. Exposed separately
    /// so tests can single-step the loop deterministically.
    pub fn run_once(&mut self, events: &mut Events) -> io::Result<()> {
        let timeout = self.poll_timeout();
        self.poll.poll(events, Some(timeout))?;

        let mut to_close = Vec::new();
        let mut listener_ready = false;

        for event in events.iter() {
            if event.token() == LISTENER {
                listener_ready = true;
                continue;
            }

            let token = event.token();
            if event.is_readable() {
                self.handle_readable(token, &mut to_close);
            }
            if event.is_writable() {
                self.handle_writable(token, &mut to_close);
            }
            if event.is_error() {
                to_close.push(token);
            }
        }

        if listener_ready {
            self.accept_loop();
        }

        for (token, conn) in self.conns.iter() {
            if conn.want_close {
                to_close.push(*token);
            }
        }

        to_close.sort_unstable();
        to_close.dedup();
        for token in to_close {
            self.close_conn(token);
        }

        self.keyspace.expire_tick_now(self.config.max_expirations_per_tick);
        Ok(())
    }

    fn poll_timeout(&self) -> Duration {
        match self.keyspace.next_expiry_ms() {
            Some(deadline) => {
                let remaining = (deadline - now_ms()).max(0) as u64;
                Duration::from_millis(remaining).min(MAX_POLL_TIMEOUT)
            }
            None => MAX_POLL_TIMEOUT,
        }
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, _addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(err) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE,
                    ) {
                        tracing::warn!(?err, "failed to register accepted connection");
                        continue;
                    }

                    let conn = Conn::new(stream);
                    debug_assert!(conn.want_read, "a freshly accepted Conn always wants read");
                    tracing::debug!(?token, "accepted connection");
                    self.conns.insert(token, conn);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                // A transient accept error must never kill the listener
                // (spec.md §7).
                Err(err) => {
                    tracing::warn!(?err, "accept error, continuing");
                    break;
                }
            }
        }
    }

    fn handle_readable(&mut self, token: Token, to_close: &mut Vec<Token>) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let conn = match self.conns.get_mut(&token) {
                Some(c) => c,
                None => return,
            };
            match conn.stream.read(&mut buf) {
                Ok(0) => {
                    to_close.push(token);
                    return;
                }
                Ok(n) => {
                    conn.incoming.extend_from_slice(&buf[..n]);
                    if n < buf.len() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => {
                    to_close.push(token);
                    return;
                }
            }
        }

        self.drain_requests(token);
        self.try_write(token, to_close);
    }

    /// Runs the framer loop: parses and dispatches every complete request
    /// already buffered (spec.md §4.6's pipelining requirement). A malformed
    /// frame sets `want_close`; the caller's end-of-iteration sweep over
    /// `conns` is what actually closes it (spec.md §3's Conn lifecycle).
    fn drain_requests(&mut self, token: Token) {
        loop {
            let conn = match self.conns.get_mut(&token) {
                Some(c) => c,
                None => return,
            };

            let outcome = framer::parse_request(
                &conn.incoming,
                self.config.max_frame_size,
                self.config.max_argv_count,
            );

            match outcome {
                ParseOutcome::Incomplete => return,
                ParseOutcome::Malformed => {
                    conn.want_close = true;
                    conn.want_read = false;
                    return;
                }
                ParseOutcome::Complete { argv, consumed } => {
                    conn.incoming.advance(consumed);
                    self.metrics.record_request_start();
                    let started = Instant::now();
                    let response = dispatcher::dispatch(&mut self.keyspace, &argv);
                    self.metrics.record_request_end(started.elapsed());
                    if dispatcher::response_is_error(&response) {
                        self.metrics.record_error();
                    }
                    let conn = self.conns.get_mut(&token).expect("connection still live");
                    conn.enqueue_response(&response);
                }
            }
        }
    }

    fn handle_writable(&mut self, token: Token, to_close: &mut Vec<Token>) {
        self.try_write(token, to_close);
    }

    fn try_write(&mut self, token: Token, to_close: &mut Vec<Token>) {
        let conn = match self.conns.get_mut(&token) {
            Some(c) => c,
            None => return,
        };
        if conn.outgoing.is_empty() {
            return;
        }

        loop {
            if conn.outgoing.is_empty() {
                break;
            }
            match conn.stream.write(&conn.outgoing) {
                Ok(0) => break,
                Ok(n) => conn.outgoing.advance(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => {
                    to_close.push(token);
                    return;
                }
            }
        }

        if conn.outgoing.is_empty() {
            conn.want_write = false;
        }
        if let Err(err) = self.reregister(token) {
            tracing::warn!(?err, "failed to reregister connection");
            to_close.push(token);
        }
    }

    fn reregister(&mut self, token: Token) -> io::Result<()> {
        let conn = match self.conns.get_mut(&token) {
            Some(c) => c,
            None => return Ok(()),
        };
        if conn.want_close {
            return Ok(());
        }
        let mut interest = if conn.want_read {
            Some(Interest::READABLE)
        } else {
            None
        };
        if conn.want_write {
            interest = Some(match interest {
                Some(existing) => existing | Interest::WRITABLE,
                None => Interest::WRITABLE,
            });
        }
        let interest = match interest {
            Some(interest) => interest,
            // Neither readable nor writable: the connection is about to be
            // closed by this iteration's end-of-loop sweep over `want_close`.
            None => return Ok(()),
        };
        self.poll.registry().reregister(&mut conn.stream, token, interest)
    }

    fn close_conn(&mut self, token: Token) {
        if let Some(mut conn) = self.conns.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            tracing::debug!(?token, "closed connection");
        }
    }
}

