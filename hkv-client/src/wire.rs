//! Client side of the length-prefixed binary wire protocol (spec.md §4.6):
//! request frames are `len:u32 | nstr:u32 | (slen:u32 | bytes)×nstr`, and
//! response frames are `len:u32 | status:u32 | data`, all little-endian.

use std::io::{self, Read};

use hkv_common::protocol::{encode_request, read_u32_le, Status, LEN_PREFIX_SIZE, STATUS_SIZE};

use crate::client::{ClientError, ClientResult};

/// A fully decoded response frame.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub data: Vec<u8>,
}

/// Encodes a request frame for the given argv.
pub fn encode(args: &[&[u8]]) -> Vec<u8> {
    encode_request(args)
}

/// Reads exactly one response frame from `reader`, reusing `scratch` across
/// calls to avoid per-request allocation.
pub fn read_response(reader: &mut impl Read, scratch: &mut Vec<u8>) -> ClientResult<Response> {
    let mut len_buf = [0u8; LEN_PREFIX_SIZE];
    reader.read_exact(&mut len_buf)?;
    let len = read_u32_le(&len_buf) as usize;
    if len < STATUS_SIZE {
        return Err(ClientError::Protocol);
    }

    scratch.clear();
    scratch.resize(len, 0);
    reader.read_exact(scratch)?;

    let status = Status::from_u32(read_u32_le(&scratch[..STATUS_SIZE]))
        .ok_or(ClientError::Protocol)?;
    let data = scratch[STATUS_SIZE..].to_vec();
    Ok(Response { status, data })
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        ClientError::Io(err)
    }
}
