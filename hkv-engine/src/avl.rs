//! Order-statistic AVL tree (spec §4.2).
//!
//! Operates generically over any arena that implements [`AvlStore`], so the
//! tree never owns its nodes directly — it only reads and writes `left`,
//! `right`, `parent`, `height`, and `count` fields through the store. In
//! this workspace the store is [`crate::hmap::HMap<crate::zset::ZNode>`]:
//! the same arena slot that holds a member's hash-chain link also holds its
//! AVL link, so membership and order indexes share one allocation per
//! element (spec.md §9's arena-with-indices design note).

use std::cmp::Ordering;

/// A node's AVL linkage plus the comparator for its order key `(score, name)`.
pub trait AvlNode {
    fn left(&self) -> Option<usize>;
    fn set_left(&mut self, value: Option<usize>);
    fn right(&self) -> Option<usize>;
    fn set_right(&mut self, value: Option<usize>);
    fn parent(&self) -> Option<usize>;
    fn set_parent(&mut self, value: Option<usize>);
    fn height(&self) -> i32;
    fn set_height(&mut self, value: i32);
    fn count(&self) -> usize;
    fn set_count(&mut self, value: usize);

    /// Compares this node's `(score, name)` against `(score, name)`.
    fn cmp_order(&self, score: f64, name: &[u8]) -> Ordering;
}

/// An arena of [`AvlNode`]s addressed by stable `usize` indices.
pub trait AvlStore {
    type Node: AvlNode;
    fn node(&self, idx: usize) -> &Self::Node;
    fn node_mut(&mut self, idx: usize) -> &mut Self::Node;
}

fn height<S: AvlStore>(store: &S, idx: Option<usize>) -> i32 {
    idx.map(|i| store.node(i).height()).unwrap_or(0)
}

fn count<S: AvlStore>(store: &S, idx: Option<usize>) -> usize {
    idx.map(|i| store.node(i).count()).unwrap_or(0)
}

fn update<S: AvlStore>(store: &mut S, idx: usize) {
    let l = store.node(idx).left();
    let r = store.node(idx).right();
    let new_height = 1 + height(store, l).max(height(store, r));
    let new_count = 1 + count(store, l) + count(store, r);
    let node = store.node_mut(idx);
    node.set_height(new_height);
    node.set_count(new_count);
}

/// Left rotation around `idx` (its right child becomes the new subtree root).
fn rotate_left<S: AvlStore>(store: &mut S, idx: usize) -> usize {
    let new_root = store.node(idx).right().expect("rotate_left needs a right child");
    let moved = store.node(new_root).left();

    store.node_mut(idx).set_right(moved);
    if let Some(m) = moved {
        store.node_mut(m).set_parent(Some(idx));
    }

    let parent = store.node(idx).parent();
    store.node_mut(new_root).set_left(Some(idx));
    store.node_mut(idx).set_parent(Some(new_root));
    store.node_mut(new_root).set_parent(parent);
    reattach_to_parent(store, parent, idx, new_root);

    update(store, idx);
    update(store, new_root);
    new_root
}

/// Right rotation around `idx` (its left child becomes the new subtree root).
fn rotate_right<S: AvlStore>(store: &mut S, idx: usize) -> usize {
    let new_root = store.node(idx).left().expect("rotate_right needs a left child");
    let moved = store.node(new_root).right();

    store.node_mut(idx).set_left(moved);
    if let Some(m) = moved {
        store.node_mut(m).set_parent(Some(idx));
    }

    let parent = store.node(idx).parent();
    store.node_mut(new_root).set_right(Some(idx));
    store.node_mut(idx).set_parent(Some(new_root));
    store.node_mut(new_root).set_parent(parent);
    reattach_to_parent(store, parent, idx, new_root);

    update(store, idx);
    update(store, new_root);
    new_root
}

fn reattach_to_parent<S: AvlStore>(
    store: &mut S,
    parent: Option<usize>,
    old_child: usize,
    new_child: usize,
) {
    if let Some(p) = parent {
        if store.node(p).left() == Some(old_child) {
            store.node_mut(p).set_left(Some(new_child));
        } else {
            store.node_mut(p).set_right(Some(new_child));
        }
    }
}

fn rebalance<S: AvlStore>(store: &mut S, idx: usize) -> usize {
    update(store, idx);
    let l = store.node(idx).left();
    let r = store.node(idx).right();
    let balance = height(store, l) - height(store, r);

    if balance > 1 {
        let lc = l.expect("positive balance implies a left child");
        if height(store, store.node(lc).left()) < height(store, store.node(lc).right()) {
            let new_lc = rotate_left(store, lc);
            store.node_mut(idx).set_left(Some(new_lc));
        }
        rotate_right(store, idx)
    } else if balance < -1 {
        let rc = r.expect("negative balance implies a right child");
        if height(store, store.node(rc).right()) < height(store, store.node(rc).left()) {
            let new_rc = rotate_right(store, rc);
            store.node_mut(idx).set_right(Some(new_rc));
        }
        rotate_left(store, idx)
    } else {
        idx
    }
}

/// Recomputes height/count and rebalances from `node` up to the root.
/// Returns the new root of the whole tree.
pub fn fix<S: AvlStore>(store: &mut S, node: usize) -> usize {
    let mut cur = node;
    loop {
        let new_cur = rebalance(store, cur);
        match store.node(new_cur).parent() {
            Some(p) => cur = p,
            None => return new_cur,
        }
    }
}

/// Inserts `new_idx` (already zeroed: no children, no parent, height 1,
/// count 1) as a leaf under `root`, then fixes the tree. Returns the new
/// root.
pub fn insert<S: AvlStore>(
    store: &mut S,
    root: Option<usize>,
    new_idx: usize,
    score: f64,
    name: &[u8],
) -> usize {
    let mut cur = match root {
        Some(r) => r,
        None => return new_idx,
    };

    loop {
        let goes_right = store.node(cur).cmp_order(score, name) == Ordering::Less;
        let child = if goes_right {
            store.node(cur).right()
        } else {
            store.node(cur).left()
        };

        match child {
            Some(next) => cur = next,
            None => {
                if goes_right {
                    store.node_mut(cur).set_right(Some(new_idx));
                } else {
                    store.node_mut(cur).set_left(Some(new_idx));
                }
                store.node_mut(new_idx).set_parent(Some(cur));
                break;
            }
        }
    }

    fix(store, cur)
}

/// Splices subtree `u` out of the tree, replacing it with `v` (which may be
/// `None`). `v`'s internal children are left untouched. Returns the new
/// overall root.
fn transplant<S: AvlStore>(
    store: &mut S,
    root: Option<usize>,
    u: usize,
    v: Option<usize>,
) -> Option<usize> {
    let parent = store.node(u).parent();
    if let Some(vv) = v {
        store.node_mut(vv).set_parent(parent);
    }
    match parent {
        Some(p) => {
            if store.node(p).left() == Some(u) {
                store.node_mut(p).set_left(v);
            } else {
                store.node_mut(p).set_right(v);
            }
            root
        }
        None => v,
    }
}

/// Deletes `target` from the tree, relinking around it (never copying
/// payload, so external indices into surviving nodes remain valid), then
/// rebalances. Returns the new root, or `None` if the tree is now empty.
pub fn del<S: AvlStore>(store: &mut S, root: Option<usize>, target: usize) -> Option<usize> {
    let left = store.node(target).left();
    let right = store.node(target).right();
    let mut new_root = root;
    let rebalance_from;

    if left.is_none() {
        rebalance_from = store.node(target).parent();
        new_root = transplant(store, new_root, target, right);
    } else if right.is_none() {
        rebalance_from = store.node(target).parent();
        new_root = transplant(store, new_root, target, left);
    } else {
        let mut succ = right.unwrap();
        while let Some(l) = store.node(succ).left() {
            succ = l;
        }

        if store.node(succ).parent() != Some(target) {
            rebalance_from = store.node(succ).parent();
            let succ_right = store.node(succ).right();
            new_root = transplant(store, new_root, succ, succ_right);

            store.node_mut(succ).set_right(right);
            store.node_mut(right.unwrap()).set_parent(Some(succ));
        } else {
            rebalance_from = Some(succ);
        }

        new_root = transplant(store, new_root, target, Some(succ));
        store.node_mut(succ).set_left(left);
        store.node_mut(left.unwrap()).set_parent(Some(succ));
        update(store, succ);
    }

    match rebalance_from {
        Some(start) => Some(fix(store, start)),
        None => new_root,
    }
}

/// Rank-delta navigation: returns the node `k` positions after `node` in
/// sorted order (negative `k` moves backward), or `None` if out of range.
pub fn offset<S: AvlStore>(store: &S, node: usize, target_offset: i64) -> Option<usize> {
    let mut pos: i64 = 0;
    let mut cur = node;

    while target_offset != pos {
        let cur_left = store.node(cur).left();
        let cur_right = store.node(cur).right();

        if pos < target_offset && pos + count(store, cur_right) as i64 >= target_offset {
            cur = cur_right?;
            pos += count(store, store.node(cur).left()) as i64 + 1;
        } else if pos > target_offset && pos - count(store, cur_left) as i64 <= target_offset {
            cur = cur_left?;
            pos -= count(store, store.node(cur).right()) as i64 + 1;
        } else {
            let parent = store.node(cur).parent()?;
            if store.node(parent).right() == Some(cur) {
                pos -= count(store, cur_left) as i64 + 1;
            } else {
                pos += count(store, cur_right) as i64 + 1;
            }
            cur = parent;
        }
    }
    Some(cur)
}

/// Descends the tree tracking the deepest right-of-target ancestor, and
/// returns the first node whose `(score, name)` is `>= (score, name)`.
pub fn seek_ge<S: AvlStore>(store: &S, root: Option<usize>, score: f64, name: &[u8]) -> Option<usize> {
    let mut cur = root;
    let mut best = None;

    while let Some(idx) = cur {
        match store.node(idx).cmp_order(score, name) {
            Ordering::Less => cur = store.node(idx).right(),
            _ => {
                best = Some(idx);
                cur = store.node(idx).left();
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct TestNode {
        left: Option<usize>,
        right: Option<usize>,
        parent: Option<usize>,
        height: i32,
        count: usize,
        score: f64,
        name: Vec<u8>,
    }

    impl AvlNode for TestNode {
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
        fn cmp_order(&self, score: f64, name: &[u8]) -> Ordering {
            (self.score, self.name.as_slice())
                .partial_cmp(&(score, name))
                .unwrap()
        }
    }

    struct TestStore {
        nodes: Vec<TestNode>,
    }

    impl AvlStore for TestStore {
        type Node = TestNode;
        fn node(&self, idx: usize) -> &TestNode {
            &self.nodes[idx]
        }
        fn node_mut(&mut self, idx: usize) -> &mut TestNode {
            &mut self.nodes[idx]
        }
    }

    fn new_store() -> TestStore {
        TestStore { nodes: Vec::new() }
    }

    fn push(store: &mut TestStore, score: f64, name: &str) -> usize {
        store.nodes.push(TestNode {
            height: 1,
            count: 1,
            score,
            name: name.as_bytes().to_vec(),
            ..Default::default()
        });
        store.nodes.len() - 1
    }

    fn assert_balanced(store: &TestStore, root: Option<usize>) {
        fn check(store: &TestStore, idx: Option<usize>) -> (i32, usize) {
            match idx {
                None => (0, 0),
                Some(i) => {
                    let (lh, lc) = check(store, store.node(i).left());
                    let (rh, rc) = check(store, store.node(i).right());
                    assert!((lh - rh).abs() <= 1, "unbalanced at {i}");
                    assert_eq!(store.node(i).height(), 1 + lh.max(rh));
                    assert_eq!(store.node(i).count(), 1 + lc + rc);
                    (1 + lh.max(rh), 1 + lc + rc)
                }
            }
        }
        check(store, root);
    }

    fn in_order(store: &TestStore, idx: Option<usize>, out: &mut Vec<usize>) {
        if let Some(i) = idx {
            in_order(store, store.node(i).left(), out);
            out.push(i);
            in_order(store, store.node(i).right(), out);
        }
    }

    #[test]
    fn insert_keeps_balance_and_order() {
        let mut store = new_store();
        let mut root = None;
        let names = ["e", "d", "c", "b", "a", "f", "g", "h", "i"];
        for (i, n) in names.iter().enumerate() {
            let idx = push(&mut store, i as f64, n);
            root = Some(insert(&mut store, root, idx, i as f64, n.as_bytes()));
            assert_balanced(&store, root);
        }

        let mut order = Vec::new();
        in_order(&store, root, &mut order);
        let scores: Vec<f64> = order.iter().map(|&i| store.node(i).score).collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(scores, sorted);
    }

    #[test]
    fn delete_leaf_and_internal_nodes() {
        let mut store = new_store();
        let mut root = None;
        for i in 0..20 {
            let idx = push(&mut store, i as f64, &format!("n{i}"));
            root = Some(insert(&mut store, root, idx, i as f64, format!("n{i}").as_bytes()));
        }

        // delete a handful of nodes, including internal ones, checking
        // balance after each.
        for target in [5usize, 0, 19, 10, 3] {
            root = del(&mut store, root, target);
            assert_balanced(&store, root);
        }

        let mut order = Vec::new();
        in_order(&store, root, &mut order);
        assert_eq!(order.len(), 15);
    }

    #[test]
    fn offset_round_trips() {
        let mut store = new_store();
        let mut root = None;
        for i in 0..30 {
            let idx = push(&mut store, i as f64, &format!("n{i:02}"));
            root = Some(insert(&mut store, root, idx, i as f64, format!("n{i:02}").as_bytes()));
        }

        let mut order = Vec::new();
        in_order(&store, root, &mut order);

        for i in 0..order.len() {
            for delta in [-3i64, -1, 0, 2, 5] {
                let target = i as i64 + delta;
                if target < 0 || target >= order.len() as i64 {
                    continue;
                }
                let got = offset(&store, order[i], delta).unwrap();
                assert_eq!(got, order[target as usize]);
            }
        }

        // offset(offset(x, +a), -a) == x when both are in-range.
        let x = order[10];
        let forward = offset(&store, x, 7).unwrap();
        let back = offset(&store, forward, -7).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn offset_out_of_range_is_none() {
        let mut store = new_store();
        let idx = push(&mut store, 0.0, "only");
        let root = Some(insert(&mut store, None, idx, 0.0, b"only"));
        assert!(offset(&store, root.unwrap(), 1).is_none());
        assert!(offset(&store, root.unwrap(), -1).is_none());
    }

    #[test]
    fn seek_ge_finds_first_at_or_above() {
        let mut store = new_store();
        let mut root = None;
        for (score, name) in [(1.0, "a"), (2.0, "b"), (2.0, "c"), (5.0, "e")] {
            let idx = push(&mut store, score, name);
            root = Some(insert(&mut store, root, idx, score, name.as_bytes()));
        }

        let found = seek_ge(&store, root, 2.0, b"").unwrap();
        assert_eq!((store.node(found).score, store.node(found).name.clone()), (2.0, b"b".to_vec()));

        let found = seek_ge(&store, root, 3.0, b"").unwrap();
        assert_eq!(store.node(found).score, 5.0);

        assert!(seek_ge(&store, root, 10.0, b"").is_none());
    }
}
