//! Per-connection state (spec.md §3's `Conn`, §4.7).

use bytes::BytesMut;
use mio::net::TcpStream;

/// One accepted client connection: its socket, I/O buffers, and readiness
/// intents. Owned exclusively by the event loop, indexed by `mio::Token`.
///
/// `incoming`/`outgoing` are `BytesMut` rather than `Vec<u8>` so draining
/// consumed request bytes or already-written response bytes is an O(1)
/// cursor bump (`Buf::advance`) instead of a `Vec::drain` memmove.
pub struct Conn {
    pub stream: TcpStream,
    pub incoming: BytesMut,
    pub outgoing: BytesMut,
    pub want_read: bool,
    pub want_write: bool,
    pub want_close: bool,
}

impl Conn {
    pub fn new(stream: TcpStream) -> Self {
        Conn {
            stream,
            incoming: BytesMut::new(),
            outgoing: BytesMut::new(),
            want_read: true,
            want_write: false,
            want_close: false,
        }
    }

    /// Queues a response frame for writing and flips on the write intent.
    pub fn enqueue_response(&mut self, frame: &[u8]) {
        self.outgoing.extend_from_slice(frame);
        self.want_write = true;
    }
}
