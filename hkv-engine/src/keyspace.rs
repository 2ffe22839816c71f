//! Entry lifecycle and keyspace (spec §4.6): the top-level object tying
//! together the hash index of entries, the TTL heap, and the thread pool
//! used to offload large ZSet teardown off the calling thread.

use std::time::{SystemTime, UNIX_EPOCH};

use hkv_common::{HkvError, HkvResult};

use crate::hmap::{HMap, Keyed};
use crate::pool::ThreadPool;
use crate::ttl::TtlHeap;
use crate::zset::ZSet;

/// Sentinel `heap_index` meaning "this entry has no TTL scheduled".
const NO_TTL: usize = usize::MAX;

/// What a keyspace entry holds.
enum EntryPayload {
    Str(Vec<u8>),
    ZSet(ZSet),
}

struct Entry {
    name: Vec<u8>,
    payload: EntryPayload,
    /// Back-pointer into `Keyspace::ttl`, or `NO_TTL` if this entry never
    /// expires. Kept current exclusively by the `on_move` callbacks passed
    /// into every `TtlHeap` call that can move entries around.
    heap_index: usize,
}

impl Keyed for Entry {
    fn key(&self) -> &[u8] {
        &self.name
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Matches `text` against a shell-style glob of `*` (any run) and `?` (any
/// single byte), used by `KEYS` (spec §4.6).
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    fn is_match(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => is_match(&p[1..], t) || (!t.is_empty() && is_match(p, &t[1..])),
            (Some(b'?'), Some(_)) => is_match(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => is_match(&p[1..], &t[1..]),
            _ => false,
        }
    }
    is_match(pattern, text)
}

/// The top-level store: a name-keyed entry table, a TTL min-heap, and a
/// thread pool for tearing down large ZSets off the event loop's thread.
pub struct Keyspace {
    entries: HMap<Entry>,
    ttl: TtlHeap,
    pool: ThreadPool,
    zset_offload_threshold: usize,
}

impl Keyspace {
    pub fn new(worker_count: usize, zset_offload_threshold: usize) -> Self {
        Keyspace {
            entries: HMap::new(),
            ttl: TtlHeap::new(),
            pool: ThreadPool::new(worker_count),
            zset_offload_threshold,
        }
    }

    fn is_expired(&self, idx: usize, now: i64) -> bool {
        let heap_index = self.entries.get(idx).heap_index;
        heap_index != NO_TTL && self.ttl.expires_at(heap_index) <= now
    }

    /// Looks a key up, lazily purging it first if its TTL has passed.
    fn lookup_live(&mut self, key: &[u8]) -> Option<usize> {
        let idx = self.entries.lookup(key)?;
        let now = now_ms();
        if self.is_expired(idx, now) {
            self.remove_entry(idx, key);
            None
        } else {
            Some(idx)
        }
    }

    /// Removes a live entry, detaching it from the TTL heap (if scheduled)
    /// and offloading a large ZSet's teardown to the thread pool.
    fn remove_entry(&mut self, idx: usize, key: &[u8]) {
        let heap_index = self.entries.get(idx).heap_index;
        if heap_index != NO_TTL {
            let entries = &mut self.entries;
            self.ttl
                .remove(heap_index, |owner, slot| entries.get_mut(owner).heap_index = slot);
        }
        let entry = self.entries.remove(key).expect("caller verified key exists");
        self.offload_payload(entry.payload);
    }

    fn offload_payload(&self, payload: EntryPayload) {
        if let EntryPayload::ZSet(zset) = payload {
            if zset.len() >= self.zset_offload_threshold {
                self.pool.submit(move || drop(zset));
            }
        }
    }

    /// Reads a STRING value.
    pub fn get(&mut self, key: &[u8]) -> HkvResult<Vec<u8>> {
        let idx = self.lookup_live(key).ok_or(HkvError::NotFound)?;
        match &self.entries.get(idx).payload {
            EntryPayload::Str(bytes) => Ok(bytes.clone()),
            EntryPayload::ZSet(_) => Err(HkvError::WrongType),
        }
    }

    /// Writes a STRING value, overwriting any existing entry (of any type)
    /// under `key` and clearing its TTL.
    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        if let Some(idx) = self.lookup_live(key) {
            if matches!(self.entries.get(idx).payload, EntryPayload::Str(_)) {
                if let EntryPayload::Str(bytes) = &mut self.entries.get_mut(idx).payload {
                    *bytes = value;
                }
                return;
            }
            self.remove_entry(idx, key);
        }
        self.entries.insert(Entry {
            name: key.to_vec(),
            payload: EntryPayload::Str(value),
            heap_index: NO_TTL,
        });
    }

    /// Deletes a key outright. Returns whether it existed (and was live).
    pub fn del(&mut self, key: &[u8]) -> bool {
        match self.lookup_live(key) {
            Some(idx) => {
                self.remove_entry(idx, key);
                true
            }
            None => false,
        }
    }

    /// Schedules expiry `ttl_ms` from now, replacing any previous TTL.
    /// `ttl_ms == -1` clears any existing TTL, making the key permanent again.
    pub fn pexpire(&mut self, key: &[u8], ttl_ms: i64) -> HkvResult<()> {
        let idx = self.lookup_live(key).ok_or(HkvError::NotFound)?;
        let heap_index = self.entries.get(idx).heap_index;

        if ttl_ms == -1 {
            if heap_index != NO_TTL {
                let entries = &mut self.entries;
                self.ttl
                    .remove(heap_index, |owner, slot| entries.get_mut(owner).heap_index = slot);
                self.entries.get_mut(idx).heap_index = NO_TTL;
            }
            return Ok(());
        }

        let expires_at = now_ms().saturating_add(ttl_ms);
        let entries = &mut self.entries;
        if heap_index == NO_TTL {
            self.ttl
                .push(idx, expires_at, |owner, slot| entries.get_mut(owner).heap_index = slot);
        } else {
            self.ttl
                .update(heap_index, expires_at, |owner, slot| entries.get_mut(owner).heap_index = slot);
        }
        Ok(())
    }

    /// Milliseconds remaining before expiry, or `None` if the key has no TTL.
    pub fn pttl(&mut self, key: &[u8]) -> HkvResult<Option<i64>> {
        let idx = self.lookup_live(key).ok_or(HkvError::NotFound)?;
        let heap_index = self.entries.get(idx).heap_index;
        if heap_index == NO_TTL {
            return Ok(None);
        }
        let remaining = (self.ttl.expires_at(heap_index) - now_ms()).max(0);
        Ok(Some(remaining))
    }

    /// Lists all live keys matching a `*`/`?` glob, purging expired keys
    /// encountered along the way.
    pub fn keys(&mut self, pattern: &[u8]) -> Vec<Vec<u8>> {
        let now = now_ms();
        let all: Vec<usize> = self.entries.iter().map(|(idx, _)| idx).collect();

        let mut matched = Vec::new();
        let mut expired = Vec::new();
        for idx in all {
            if self.is_expired(idx, now) {
                expired.push(self.entries.get(idx).name.clone());
                continue;
            }
            let name = self.entries.get(idx).name.clone();
            if glob_match(pattern, &name) {
                matched.push(name);
            }
        }

        for key in expired {
            if let Some(idx) = self.entries.lookup(&key) {
                self.remove_entry(idx, &key);
            }
        }
        matched
    }

    /// Absolute deadline (ms since epoch) of the next key due to expire, if
    /// any. Used by the event loop to bound its readiness-wait timeout.
    pub fn next_expiry_ms(&self) -> Option<i64> {
        self.ttl.peek_min()
    }

    /// `expire_tick` anchored to the current wall-clock time, as the event
    /// loop calls it once per iteration (spec.md §4.7).
    pub fn expire_tick_now(&mut self, max_expirations: usize) -> usize {
        self.expire_tick(now_ms(), max_expirations)
    }

    /// Runs up to `max_expirations` due evictions. Returns how many ran.
    pub fn expire_tick(&mut self, now: i64, max_expirations: usize) -> usize {
        let mut expired_count = 0;
        while expired_count < max_expirations {
            match self.ttl.peek_min() {
                Some(t) if t <= now => {}
                _ => break,
            }

            let entries = &mut self.entries;
            let (owner, _) = self
                .ttl
                .pop_min(|o, s| entries.get_mut(o).heap_index = s)
                .expect("peek_min confirmed a due entry");
            let key = self.entries.get(owner).name.clone();
            let entry = self.entries.remove(&key).expect("owner was a live arena index");
            self.offload_payload(entry.payload);
            expired_count += 1;
        }
        expired_count
    }

    /// Adds or updates a ZSET member's score. Returns `true` if new.
    pub fn zadd(&mut self, key: &[u8], name: &[u8], score: f64) -> HkvResult<bool> {
        let idx = match self.lookup_live(key) {
            Some(idx) => {
                if !matches!(self.entries.get(idx).payload, EntryPayload::ZSet(_)) {
                    return Err(HkvError::WrongType);
                }
                idx
            }
            None => self.entries.insert(Entry {
                name: key.to_vec(),
                payload: EntryPayload::ZSet(ZSet::new()),
                heap_index: NO_TTL,
            }),
        };

        match &mut self.entries.get_mut(idx).payload {
            EntryPayload::ZSet(zset) => Ok(zset.insert(name, score)),
            EntryPayload::Str(_) => unreachable!("checked above"),
        }
    }

    /// Removes a ZSET member. Returns whether it existed.
    pub fn zrem(&mut self, key: &[u8], name: &[u8]) -> HkvResult<bool> {
        let idx = self.lookup_live(key).ok_or(HkvError::NotFound)?;
        match &mut self.entries.get_mut(idx).payload {
            EntryPayload::ZSet(zset) => Ok(zset.remove(name).is_some()),
            EntryPayload::Str(_) => Err(HkvError::WrongType),
        }
    }

    /// Reads a ZSET member's score.
    pub fn zscore(&mut self, key: &[u8], name: &[u8]) -> HkvResult<Option<f64>> {
        let idx = self.lookup_live(key).ok_or(HkvError::NotFound)?;
        match &mut self.entries.get_mut(idx).payload {
            EntryPayload::ZSet(zset) => Ok(zset.score(name)),
            EntryPayload::Str(_) => Err(HkvError::WrongType),
        }
    }

    /// Range query over a ZSET: seeks to `(score, name)`, walks `offset`
    /// positions, then returns up to `limit` members in order.
    pub fn zquery(
        &mut self,
        key: &[u8],
        score: f64,
        name: &[u8],
        offset: i64,
        limit: usize,
    ) -> HkvResult<Vec<(Vec<u8>, f64)>> {
        let idx = self.lookup_live(key).ok_or(HkvError::NotFound)?;
        match &self.entries.get(idx).payload {
            EntryPayload::ZSet(zset) => Ok(zset.query(score, name, offset, limit)),
            EntryPayload::Str(_) => Err(HkvError::WrongType),
        }
    }
}
