//! Wire protocol primitives shared by the server's framer and the test
//! client: fixed little-endian integer encodings, the response status
//! codes, and the resource caps that bound a single frame.
//!
//! Request frame:  `len:u32 | payload[len]`
//! Payload:        `nstr:u32 | (slen:u32 | s_bytes[slen])×nstr`
//! Response frame: `len:u32 | status:u32 | data[len-4]`
//!
//! All integers are little-endian and unsigned unless noted. `score` values
//! are serialized as IEEE-754 binary64 in native byte order, which on every
//! platform this workspace targets is little-endian; this is not a portable
//! encoding across architectures (see the design notes around Open Question
//! 2), but it matches the spec exactly.

/// Frames larger than this are treated as malformed and the connection is closed.
pub const MAX_FRAME_SIZE: u32 = 32 * 1024 * 1024;

/// Requests with more than this many argv strings are treated as malformed.
pub const MAX_ARGV_COUNT: u32 = 200_000;

/// Size of the frame length prefix, in bytes.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Size of the response status field, in bytes.
pub const STATUS_SIZE: usize = 4;

/// Response status codes (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command succeeded.
    Ok = 0,
    /// Unknown command, arity mismatch, wrong type, or bad argument.
    Err = 1,
    /// Key (or member) miss.
    Nx = 2,
}

impl Status {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Status> {
        match value {
            0 => Some(Status::Ok),
            1 => Some(Status::Err),
            2 => Some(Status::Nx),
            _ => None,
        }
    }
}

#[inline]
pub fn write_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn read_u32_le(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

#[inline]
pub fn write_i64_le(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn read_i64_le(data: &[u8]) -> i64 {
    i64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])
}

#[inline]
pub fn write_f64_le(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn read_f64_le(data: &[u8]) -> f64 {
    f64::from_le_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])
}

/// Encodes a full request frame (length prefix + argv payload) for a command.
///
/// Used by the test client and by integration tests that assemble raw wire
/// bytes directly (spec §8's literal framed-byte scenarios).
pub fn encode_request(args: &[&[u8]]) -> Vec<u8> {
    let mut payload = Vec::new();
    write_u32_le(&mut payload, args.len() as u32);
    for arg in args {
        write_u32_le(&mut payload, arg.len() as u32);
        payload.extend_from_slice(arg);
    }

    let mut frame = Vec::with_capacity(LEN_PREFIX_SIZE + payload.len());
    write_u32_le(&mut frame, payload.len() as u32);
    frame.extend_from_slice(&payload);
    frame
}

/// Encodes a full response frame (length prefix + status + data).
pub fn encode_response(status: Status, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(LEN_PREFIX_SIZE + STATUS_SIZE + data.len());
    write_u32_le(&mut frame, (STATUS_SIZE + data.len()) as u32);
    write_u32_le(&mut frame, status.as_u32());
    frame.extend_from_slice(data);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_request_payload() {
        let frame = encode_request(&[b"set", b"k", b"v"]);
        // len(u32) + nstr(u32) + 3 * (slen(u32) + bytes)
        let expected_len = 4 + 4 + (4 + 3) + (4 + 1) + (4 + 1);
        assert_eq!(frame.len(), expected_len);
        assert_eq!(read_u32_le(&frame[0..4]) as usize, frame.len() - 4);
    }

    #[test]
    fn encodes_response_roundtrip() {
        let frame = encode_response(Status::Ok, b"bar");
        assert_eq!(read_u32_le(&frame[0..4]), 7);
        assert_eq!(read_u32_le(&frame[4..8]), Status::Ok.as_u32());
        assert_eq!(&frame[8..], b"bar");
    }

    #[test]
    fn score_roundtrip() {
        let mut buf = Vec::new();
        write_f64_le(&mut buf, 1.5);
        assert_eq!(read_f64_le(&buf), 1.5);
    }
}
