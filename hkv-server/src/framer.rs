//! Per-connection byte-stream framer (spec.md §4.6).
//!
//! Request frame:  `len:u32 | payload[len]`
//! Payload:        `nstr:u32 | (slen:u32 | s_bytes[slen])×nstr`
//!
//! All integers little-endian, unsigned. The framer only ever looks at the
//! bytes already buffered for a connection; it never reads from the socket
//! itself (that's `EventLoop`'s job), which keeps it trivially testable
//! against arbitrary byte splits (spec.md §8: "framer idempotence").

use hkv_common::protocol::{read_u32_le, MAX_ARGV_COUNT, MAX_FRAME_SIZE};

/// Outcome of attempting to parse one request out of a buffer prefix.
pub enum ParseOutcome {
    /// Not enough bytes buffered yet for a complete frame.
    Incomplete,
    /// A complete request was parsed; `consumed` bytes should be drained
    /// from the front of the buffer.
    Complete { argv: Vec<Vec<u8>>, consumed: usize },
    /// The frame (or its payload) violates the protocol; the connection
    /// must be closed. No further parsing should be attempted.
    Malformed,
}

/// Attempts to parse a single request frame from the start of `buf`.
///
/// `max_frame_size` bounds the declared payload length (spec: `len > 32 MiB`
/// closes the connection); `max_argv_count` bounds `nstr` (spec: `nstr >
/// 200_000` is malformed).
pub fn parse_request(buf: &[u8], max_frame_size: u32, max_argv_count: u32) -> ParseOutcome {
    const LEN_PREFIX: usize = 4;
    if buf.len() < LEN_PREFIX {
        return ParseOutcome::Incomplete;
    }

    let len = read_u32_le(&buf[0..4]);
    if len > max_frame_size {
        return ParseOutcome::Malformed;
    }

    let total_needed = LEN_PREFIX + len as usize;
    if buf.len() < total_needed {
        return ParseOutcome::Incomplete;
    }

    let payload = &buf[LEN_PREFIX..total_needed];
    match parse_payload(payload, max_argv_count) {
        Some(argv) => ParseOutcome::Complete {
            argv,
            consumed: total_needed,
        },
        None => ParseOutcome::Malformed,
    }
}

fn parse_payload(payload: &[u8], max_argv_count: u32) -> Option<Vec<Vec<u8>>> {
    if payload.len() < 4 {
        return None;
    }
    let nstr = read_u32_le(&payload[0..4]);
    if nstr > max_argv_count {
        return None;
    }

    let mut cursor = 4usize;
    let mut argv = Vec::with_capacity(nstr as usize);
    for _ in 0..nstr {
        if payload.len() < cursor + 4 {
            return None;
        }
        let slen = read_u32_le(&payload[cursor..cursor + 4]) as usize;
        cursor += 4;
        if payload.len() < cursor + slen {
            return None;
        }
        argv.push(payload[cursor..cursor + slen].to_vec());
        cursor += slen;
    }

    // Trailing bytes after consuming `nstr` strings are malformed (spec.md §4.6).
    if cursor != payload.len() {
        return None;
    }
    Some(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkv_common::protocol::encode_request;

    const MAX_FRAME: u32 = MAX_FRAME_SIZE;
    const MAX_ARGV: u32 = MAX_ARGV_COUNT;

    #[test]
    fn incomplete_prefix_asks_for_more() {
        let buf = [0u8, 1, 2];
        match parse_request(&buf, MAX_FRAME, MAX_ARGV) {
            ParseOutcome::Incomplete => {}
            _ => panic!("expected incomplete"),
        }
    }

    #[test]
    fn incomplete_payload_asks_for_more() {
        let frame = encode_request(&[b"set", b"k", b"v"]);
        let partial = &frame[..frame.len() - 2];
        match parse_request(partial, MAX_FRAME, MAX_ARGV) {
            ParseOutcome::Incomplete => {}
            _ => panic!("expected incomplete"),
        }
    }

    #[test]
    fn complete_frame_parses_argv_and_consumes_exactly() {
        let frame = encode_request(&[b"get", b"foo"]);
        match parse_request(&frame, MAX_FRAME, MAX_ARGV) {
            ParseOutcome::Complete { argv, consumed } => {
                assert_eq!(argv, vec![b"get".to_vec(), b"foo".to_vec()]);
                assert_eq!(consumed, frame.len());
            }
            _ => panic!("expected complete"),
        }
    }

    #[test]
    fn oversized_frame_is_malformed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME + 1).to_le_bytes());
        match parse_request(&buf, MAX_FRAME, MAX_ARGV) {
            ParseOutcome::Malformed => {}
            _ => panic!("expected malformed"),
        }
    }

    #[test]
    fn too_many_argv_is_malformed() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(MAX_ARGV + 1).to_le_bytes());
        let mut frame = Vec::new();
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        match parse_request(&frame, MAX_FRAME, MAX_ARGV) {
            ParseOutcome::Malformed => {}
            _ => panic!("expected malformed"),
        }
    }

    #[test]
    fn trailing_garbage_is_malformed() {
        let mut frame = encode_request(&[b"get", b"foo"]);
        let extra_len = (frame.len() as u32 - 4) + 3;
        frame[0..4].copy_from_slice(&extra_len.to_le_bytes());
        frame.extend_from_slice(b"xyz");
        match parse_request(&frame, MAX_FRAME, MAX_ARGV) {
            ParseOutcome::Malformed => {}
            _ => panic!("expected malformed"),
        }
    }

    #[test]
    fn pipelined_frames_parse_one_at_a_time() {
        let mut buf = encode_request(&[b"set", b"a", b"1"]);
        buf.extend_from_slice(&encode_request(&[b"set", b"b", b"2"]));

        let mut parsed = Vec::new();
        let mut offset = 0;
        loop {
            match parse_request(&buf[offset..], MAX_FRAME, MAX_ARGV) {
                ParseOutcome::Complete { argv, consumed } => {
                    parsed.push(argv);
                    offset += consumed;
                }
                ParseOutcome::Incomplete => break,
                ParseOutcome::Malformed => panic!("unexpected malformed"),
            }
        }
        assert_eq!(offset, buf.len());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], vec![b"set".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        assert_eq!(parsed[1], vec![b"set".to_vec(), b"b".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn arbitrary_byte_splits_still_yield_n_responses_in_order() {
        // Concatenate N frames, then feed them back byte-by-byte through a
        // growing buffer, just like the event loop's incoming buffer would
        // see them arrive in arbitrary TCP segments.
        let frames: Vec<Vec<u8>> = (0..5)
            .map(|i| encode_request(&[b"set", format!("k{i}").as_bytes(), b"v"]))
            .collect();
        let mut all = Vec::new();
        for f in &frames {
            all.extend_from_slice(f);
        }

        let mut buffered = Vec::new();
        let mut parsed = Vec::new();
        for &byte in &all {
            buffered.push(byte);
            loop {
                match parse_request(&buffered, MAX_FRAME, MAX_ARGV) {
                    ParseOutcome::Complete { argv, consumed } => {
                        parsed.push(argv);
                        buffered.drain(0..consumed);
                    }
                    _ => break,
                }
            }
        }
        assert_eq!(parsed.len(), frames.len());
    }
}
