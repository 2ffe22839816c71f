//! Sorted set (spec §4.3): a name-keyed hash index and a `(score, name)`
//! ordered AVL tree sharing one arena of [`ZNode`]s.
//!
//! Each member lives at exactly one [`crate::hmap::HMap`] arena slot. The
//! hash index resolves `name -> slot` in O(1); the AVL tree threaded through
//! the same slots resolves rank and range queries in O(log n). Deleting a
//! member touches both structures but only ever frees the one slot.

use crate::avl::{self, AvlNode, AvlStore};
use crate::hmap::{HMap, Keyed};

/// One sorted-set member: its name, score, and AVL linkage.
pub struct ZNode {
    name: Vec<u8>,
    score: f64,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
    height: i32,
    count: usize,
}

impl ZNode {
    fn new(name: Vec<u8>, score: f64) -> Self {
        ZNode {
            name,
            score,
            left: None,
            right: None,
            parent: None,
            height: 1,
            count: 1,
        }
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

impl Keyed for ZNode {
    fn key(&self) -> &[u8] {
        &self.name
    }
}

impl AvlNode for ZNode {
    fn left(&self) -> Option<usize> {
        self.left
    }
    fn set_left(&mut self, v: Option<usize>) {
        self.left = v;
    }
    fn right(&self) -> Option<usize> {
        self.right
    }
    fn set_right(&mut self, v: Option<usize>) {
        self.right = v;
    }
    fn parent(&self) -> Option<usize> {
        self.parent
    }
    fn set_parent(&mut self, v: Option<usize>) {
        self.parent = v;
    }
    fn height(&self) -> i32 {
        self.height
    }
    fn set_height(&mut self, v: i32) {
        self.height = v;
    }
    fn count(&self) -> usize {
        self.count
    }
    fn set_count(&mut self, v: usize) {
        self.count = v;
    }
    fn cmp_order(&self, score: f64, name: &[u8]) -> std::cmp::Ordering {
        (self.score, self.name.as_slice())
            .partial_cmp(&(score, name))
            .expect("scores are never NaN (rejected at the dispatcher)")
    }
}

impl AvlStore for HMap<ZNode> {
    type Node = ZNode;
    fn node(&self, idx: usize) -> &ZNode {
        self.get(idx)
    }
    fn node_mut(&mut self, idx: usize) -> &mut ZNode {
        self.get_mut(idx)
    }
}

/// A sorted set: hash index by member name, ordered index by `(score, name)`.
pub struct ZSet {
    members: HMap<ZNode>,
    root: Option<usize>,
}

impl ZSet {
    pub fn new() -> Self {
        ZSet {
            members: HMap::new(),
            root: None,
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or updates a member's score. Returns `true` if the member is
    /// new, `false` if an existing member's score was updated.
    pub fn insert(&mut self, name: &[u8], score: f64) -> bool {
        if let Some(idx) = self.members.lookup(name) {
            if self.members.get(idx).score == score {
                return false;
            }
            self.root = avl::del(&mut self.members, self.root, idx);
            let node = self.members.get_mut(idx);
            node.score = score;
            node.left = None;
            node.right = None;
            node.parent = None;
            node.height = 1;
            node.count = 1;
            self.root = Some(avl::insert(&mut self.members, self.root, idx, score, name));
            return false;
        }

        let idx = self.members.insert(ZNode::new(name.to_vec(), score));
        self.root = Some(avl::insert(&mut self.members, self.root, idx, score, name));
        true
    }

    /// Looks up a member's score by name.
    pub fn score(&mut self, name: &[u8]) -> Option<f64> {
        let idx = self.members.lookup(name)?;
        Some(self.members.get(idx).score)
    }

    /// Removes a member by name. Returns its score if it existed.
    pub fn remove(&mut self, name: &[u8]) -> Option<f64> {
        let idx = self.members.lookup(name)?;
        let score = self.members.get(idx).score;
        self.root = avl::del(&mut self.members, self.root, idx);
        self.members.remove(name);
        Some(score)
    }

    /// Returns the first member whose `(score, name)` is `>= (score, name)`.
    pub fn seek_ge(&self, score: f64, name: &[u8]) -> Option<(&[u8], f64)> {
        let idx = avl::seek_ge(&self.members, self.root, score, name)?;
        let node = self.members.get(idx);
        Some((node.name(), node.score()))
    }

    /// Walks `limit` members starting at the member located `offset`
    /// positions from the member identified by `(score, name)` (spec §4.3's
    /// `ZQUERY` semantics: seek then walk forward in sorted order).
    pub fn query(&self, score: f64, name: &[u8], offset: i64, limit: usize) -> Vec<(Vec<u8>, f64)> {
        let anchor = match avl::seek_ge(&self.members, self.root, score, name) {
            Some(idx) => idx,
            None => return Vec::new(),
        };

        let mut cur = match avl::offset(&self.members, anchor, offset) {
            Some(idx) => Some(idx),
            None => return Vec::new(),
        };

        let mut out = Vec::with_capacity(limit.min(self.len()));
        while out.len() < limit {
            let idx = match cur {
                Some(idx) => idx,
                None => break,
            };
            let node = self.members.get(idx);
            out.push((node.name().to_vec(), node.score()));
            cur = avl::offset(&self.members, idx, 1);
        }
        out
    }

    /// Clears all members.
    pub fn clear(&mut self) {
        self.members.clear();
        self.root = None;
    }
}

impl Default for ZSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_dual_invariant(zset: &ZSet) {
        // Every hash-indexed member must also be reachable from the root via
        // in-order AVL traversal, and the counts must agree (spec §8).
        fn in_order(members: &HMap<ZNode>, idx: Option<usize>, out: &mut Vec<usize>) {
            if let Some(i) = idx {
                in_order(members, members.get(i).left, out);
                out.push(i);
                in_order(members, members.get(i).right, out);
            }
        }
        let mut ordered = Vec::new();
        in_order(&zset.members, zset.root, &mut ordered);
        assert_eq!(ordered.len(), zset.len());

        let mut hashed: Vec<usize> = zset.members.iter().map(|(idx, _)| idx).collect();
        hashed.sort_unstable();
        let mut ordered_sorted = ordered.clone();
        ordered_sorted.sort_unstable();
        assert_eq!(hashed, ordered_sorted);

        let scores: Vec<f64> = ordered.iter().map(|&i| zset.members.get(i).score).collect();
        let mut sorted_scores = scores.clone();
        sorted_scores.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(scores, sorted_scores);
    }

    #[test]
    fn insert_new_member_returns_true() {
        let mut zset = ZSet::new();
        assert!(zset.insert(b"alice", 1.0));
        assert!(!zset.insert(b"alice", 2.0));
        assert_eq!(zset.len(), 1);
    }

    #[test]
    fn score_updates_reposition_member() {
        let mut zset = ZSet::new();
        zset.insert(b"alice", 5.0);
        zset.insert(b"bob", 1.0);
        zset.insert(b"carol", 3.0);
        assert_dual_invariant(&zset);

        zset.insert(b"alice", 0.0);
        assert_dual_invariant(&zset);
        let mut scores: Vec<f64> = Vec::new();
        for (name, score) in zset.query(f64::MIN, b"", 0, 10) {
            scores.push(score);
            let _ = name;
        }
        assert_eq!(scores, vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn remove_maintains_invariant() {
        let mut zset = ZSet::new();
        for i in 0..50 {
            zset.insert(format!("m{i}").as_bytes(), i as f64);
        }
        assert_dual_invariant(&zset);

        for i in (0..50).step_by(3) {
            zset.remove(format!("m{i}").as_bytes());
        }
        assert_dual_invariant(&zset);
        assert_eq!(zset.len(), 50 - (0..50).step_by(3).count());
    }

    #[test]
    fn query_walks_forward_from_seek() {
        let mut zset = ZSet::new();
        for i in 0..10 {
            zset.insert(format!("m{i:02}").as_bytes(), i as f64);
        }

        let page = zset.query(3.0, b"", 0, 3);
        let scores: Vec<f64> = page.iter().map(|(_, s)| *s).collect();
        assert_eq!(scores, vec![3.0, 4.0, 5.0]);

        let page = zset.query(3.0, b"", 2, 2);
        let scores: Vec<f64> = page.iter().map(|(_, s)| *s).collect();
        assert_eq!(scores, vec![5.0, 6.0]);
    }

    #[test]
    fn score_lookup_roundtrips() {
        let mut zset = ZSet::new();
        zset.insert(b"alice", 42.0);
        assert_eq!(zset.score(b"alice"), Some(42.0));
        assert_eq!(zset.score(b"missing"), None);
    }
}
