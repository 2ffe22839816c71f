//! Command table and dispatch (spec.md §4.6).
//!
//! Parses an argv-style request into one of the ten supported commands,
//! executes it against the shared [`Keyspace`], and serializes a response
//! frame. Unknown commands, arity mismatches, and type mismatches all
//! produce `Status::Err` without touching the connection's lifecycle;
//! only the framer decides when a connection must close.

use hkv_common::protocol::{encode_response, read_u32_le, write_f64_le, write_i64_le, write_u32_le, Status};
use hkv_common::HkvError;
use hkv_engine::Keyspace;

/// Dispatches one already-parsed request and returns a complete response
/// frame (length prefix + status + data), ready to enqueue on a `Conn`.
pub fn dispatch(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.is_empty() {
        return err_frame();
    }

    match argv[0].as_slice() {
        b"get" => cmd_get(keyspace, argv),
        b"set" => cmd_set(keyspace, argv),
        b"del" => cmd_del(keyspace, argv),
        b"pexpire" => cmd_pexpire(keyspace, argv),
        b"pttl" => cmd_pttl(keyspace, argv),
        b"keys" => cmd_keys(keyspace, argv),
        b"zadd" => cmd_zadd(keyspace, argv),
        b"zrem" => cmd_zrem(keyspace, argv),
        b"zscore" => cmd_zscore(keyspace, argv),
        b"zquery" => cmd_zquery(keyspace, argv),
        _ => err_frame(),
    }
}

/// Whether an already-encoded response frame carries `Status::Err`, used by
/// the event loop to feed the error-rate metric without re-dispatching.
pub fn response_is_error(frame: &[u8]) -> bool {
    frame.len() >= 8 && read_u32_le(&frame[4..8]) == Status::Err.as_u32()
}

fn ok_frame(data: &[u8]) -> Vec<u8> {
    encode_response(Status::Ok, data)
}

fn nx_frame() -> Vec<u8> {
    encode_response(Status::Nx, &[])
}

fn err_frame() -> Vec<u8> {
    encode_response(Status::Err, &[])
}

fn cmd_get(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 2 {
        return err_frame();
    }
    match keyspace.get(&argv[1]) {
        Ok(value) => ok_frame(&value),
        Err(HkvError::NotFound) => nx_frame(),
        Err(_) => err_frame(),
    }
}

fn cmd_set(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 3 {
        return err_frame();
    }
    keyspace.set(&argv[1], argv[2].clone());
    ok_frame(&[])
}

fn cmd_del(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 2 {
        return err_frame();
    }
    keyspace.del(&argv[1]);
    ok_frame(&[])
}

fn cmd_pexpire(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 3 {
        return err_frame();
    }
    let ttl_ms = match parse_i64(&argv[2]) {
        Some(v) => v,
        None => return err_frame(),
    };
    match keyspace.pexpire(&argv[1], ttl_ms) {
        Ok(()) => ok_frame(&[]),
        Err(HkvError::NotFound) => nx_frame(),
        Err(_) => err_frame(),
    }
}

fn cmd_pttl(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 2 {
        return err_frame();
    }
    let remaining_ms = match keyspace.pttl(&argv[1]) {
        Ok(Some(ms)) => ms,
        Ok(None) => -1,
        Err(HkvError::NotFound) => -2,
        Err(_) => return err_frame(),
    };
    let mut data = Vec::with_capacity(8);
    write_i64_le(&mut data, remaining_ms);
    ok_frame(&data)
}

fn cmd_keys(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 2 {
        return err_frame();
    }
    let matches = keyspace.keys(&argv[1]);
    let mut data = Vec::new();
    write_u32_le(&mut data, matches.len() as u32);
    for key in matches {
        write_u32_le(&mut data, key.len() as u32);
        data.extend_from_slice(&key);
    }
    ok_frame(&data)
}

fn cmd_zadd(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 4 {
        return err_frame();
    }
    let score = match parse_f64(&argv[2]) {
        Some(v) => v,
        None => return err_frame(),
    };
    match keyspace.zadd(&argv[1], &argv[3], score) {
        Ok(is_new) => {
            let mut data = Vec::with_capacity(4);
            write_u32_le(&mut data, is_new as u32);
            ok_frame(&data)
        }
        Err(_) => err_frame(),
    }
}

fn cmd_zrem(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 3 {
        return err_frame();
    }
    // Spec table: zrem is unconditionally OK, matching del's idempotent
    // miss-is-a-no-op semantics — there is no NX row for this command.
    match keyspace.zrem(&argv[1], &argv[2]) {
        Ok(_) | Err(HkvError::NotFound) => ok_frame(&[]),
        Err(_) => err_frame(),
    }
}

fn cmd_zscore(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 3 {
        return err_frame();
    }
    match keyspace.zscore(&argv[1], &argv[2]) {
        Ok(Some(score)) => {
            let mut data = Vec::with_capacity(8);
            write_f64_le(&mut data, score);
            ok_frame(&data)
        }
        Ok(None) => nx_frame(),
        Err(HkvError::NotFound) => nx_frame(),
        Err(_) => err_frame(),
    }
}

fn cmd_zquery(keyspace: &mut Keyspace, argv: &[Vec<u8>]) -> Vec<u8> {
    if argv.len() != 6 {
        return err_frame();
    }
    let min_score = match parse_f64(&argv[2]) {
        Some(v) => v,
        None => return err_frame(),
    };
    let min_name = &argv[3];
    let offset = match parse_i64(&argv[4]) {
        Some(v) => v,
        None => return err_frame(),
    };
    let limit = match parse_i64(&argv[5]) {
        Some(v) if v >= 0 => v as usize,
        _ => return err_frame(),
    };

    let members = match keyspace.zquery(&argv[1], min_score, min_name, offset, limit) {
        Ok(members) => members,
        Err(HkvError::NotFound) => Vec::new(),
        Err(_) => return err_frame(),
    };

    let mut data = Vec::new();
    write_u32_le(&mut data, members.len() as u32);
    for (name, score) in members {
        write_u32_le(&mut data, name.len() as u32);
        data.extend_from_slice(&name);
        write_f64_le(&mut data, score);
    }
    ok_frame(&data)
}

fn parse_i64(arg: &[u8]) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse::<i64>().ok()
}

fn parse_f64(arg: &[u8]) -> Option<f64> {
    let value = std::str::from_utf8(arg).ok()?.parse::<f64>().ok()?;
    if value.is_nan() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hkv_common::protocol::{read_f64_le, read_u32_le, Status};

    fn ks() -> Keyspace {
        Keyspace::new(1, 10_000)
    }

    fn status_of(frame: &[u8]) -> Status {
        Status::from_u32(read_u32_le(&frame[4..8])).unwrap()
    }

    fn data_of(frame: &[u8]) -> &[u8] {
        &frame[8..]
    }

    #[test]
    fn set_then_get() {
        let mut k = ks();
        let resp = dispatch(&mut k, &[b"set".to_vec(), b"foo".to_vec(), b"bar".to_vec()]);
        assert_eq!(status_of(&resp), Status::Ok);

        let resp = dispatch(&mut k, &[b"get".to_vec(), b"foo".to_vec()]);
        assert_eq!(status_of(&resp), Status::Ok);
        assert_eq!(data_of(&resp), b"bar");
    }

    #[test]
    fn get_missing_is_nx() {
        let mut k = ks();
        let resp = dispatch(&mut k, &[b"get".to_vec(), b"nope".to_vec()]);
        assert_eq!(status_of(&resp), Status::Nx);
    }

    #[test]
    fn del_then_get_is_nx() {
        let mut k = ks();
        dispatch(&mut k, &[b"set".to_vec(), b"foo".to_vec(), b"bar".to_vec()]);
        let resp = dispatch(&mut k, &[b"del".to_vec(), b"foo".to_vec()]);
        assert_eq!(status_of(&resp), Status::Ok);
        let resp = dispatch(&mut k, &[b"get".to_vec(), b"foo".to_vec()]);
        assert_eq!(status_of(&resp), Status::Nx);
    }

    #[test]
    fn unknown_command_is_err() {
        let mut k = ks();
        let resp = dispatch(&mut k, &[b"bogus".to_vec()]);
        assert_eq!(status_of(&resp), Status::Err);
    }

    #[test]
    fn arity_mismatch_is_err() {
        let mut k = ks();
        let resp = dispatch(&mut k, &[b"get".to_vec()]);
        assert_eq!(status_of(&resp), Status::Err);
    }

    #[test]
    fn zadd_against_string_is_err() {
        let mut k = ks();
        dispatch(&mut k, &[b"set".to_vec(), b"s".to_vec(), b"1".to_vec()]);
        let resp = dispatch(
            &mut k,
            &[b"zadd".to_vec(), b"s".to_vec(), b"1.0".to_vec(), b"m".to_vec()],
        );
        assert_eq!(status_of(&resp), Status::Err);
    }

    #[test]
    fn zadd_zscore_roundtrip() {
        let mut k = ks();
        let resp = dispatch(
            &mut k,
            &[b"zadd".to_vec(), b"z".to_vec(), b"1.0".to_vec(), b"a".to_vec()],
        );
        assert_eq!(status_of(&resp), Status::Ok);
        assert_eq!(read_u32_le(data_of(&resp)), 1);

        let resp = dispatch(
            &mut k,
            &[b"zadd".to_vec(), b"z".to_vec(), b"1.5".to_vec(), b"a".to_vec()],
        );
        assert_eq!(read_u32_le(data_of(&resp)), 0);

        let resp = dispatch(&mut k, &[b"zscore".to_vec(), b"z".to_vec(), b"a".to_vec()]);
        assert_eq!(status_of(&resp), Status::Ok);
        assert_eq!(read_f64_le(data_of(&resp)), 1.5);
    }

    #[test]
    fn zquery_orders_by_score_then_name() {
        let mut k = ks();
        for (score, name) in [(1.0, "a"), (2.0, "b"), (2.0, "c"), (5.0, "e")] {
            dispatch(
                &mut k,
                &[
                    b"zadd".to_vec(),
                    b"z".to_vec(),
                    score.to_string().into_bytes(),
                    name.as_bytes().to_vec(),
                ],
            );
        }

        let resp = dispatch(
            &mut k,
            &[
                b"zquery".to_vec(),
                b"z".to_vec(),
                b"2".to_vec(),
                b"".to_vec(),
                b"0".to_vec(),
                b"10".to_vec(),
            ],
        );
        assert_eq!(status_of(&resp), Status::Ok);
        let data = data_of(&resp);
        let count = read_u32_le(&data[0..4]);
        assert_eq!(count, 3);
        let mut cursor = 4;
        let mut names = Vec::new();
        for _ in 0..count {
            let len = read_u32_le(&data[cursor..cursor + 4]) as usize;
            cursor += 4;
            names.push(String::from_utf8(data[cursor..cursor + len].to_vec()).unwrap());
            cursor += len + 8;
        }
        assert_eq!(names, vec!["b", "c", "e"]);
    }

    #[test]
    fn pexpire_then_pttl() {
        let mut k = ks();
        dispatch(&mut k, &[b"set".to_vec(), b"a".to_vec(), b"1".to_vec()]);
        dispatch(
            &mut k,
            &[b"pexpire".to_vec(), b"a".to_vec(), b"60000".to_vec()],
        );
        let resp = dispatch(&mut k, &[b"pttl".to_vec(), b"a".to_vec()]);
        assert_eq!(status_of(&resp), Status::Ok);
        let remaining = hkv_common::protocol::read_i64_le(data_of(&resp));
        assert!(remaining > 0 && remaining <= 60_000);
    }

    #[test]
    fn pttl_on_missing_key_is_minus_two() {
        let mut k = ks();
        let resp = dispatch(&mut k, &[b"pttl".to_vec(), b"missing".to_vec()]);
        assert_eq!(status_of(&resp), Status::Ok);
        assert_eq!(hkv_common::protocol::read_i64_le(data_of(&resp)), -2);
    }
}
