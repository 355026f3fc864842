//! Partial binary search tree over the anchors
//!
//! Built once at open time. Each node holds one decoded anchor name and the
//! anchor range `[lo, hi)` of its subtree is implied by the walk. Nodes live in
//! an arena and reference children by index.
//!
//! ```text
//!                 anchor 8
//!               /          \
//!        anchor 4          anchor 12
//!        /      \          /       \
//!     [0,4)    [5,8)    [9,12)   [13,16)     ← below max depth: binary search
//! ```

use super::lookup::LookupState;
use super::name_codec::NameCodec;
use crate::Result;
use std::cmp::Ordering;

#[derive(Debug)]
struct TreeNode<K> {
    anchor: u64,
    name: K,
    left: Option<u32>,
    right: Option<u32>,
}

/// Outcome of walking the tree for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narrowed {
    /// The key is exactly this anchor's name
    Anchor(u64),
    /// The last anchor <= key lies in `[lo, hi)` (or before `lo` when `lo == 0`)
    Range { lo: u64, hi: u64 },
}

#[derive(Debug)]
pub struct BinarySearchTree<K> {
    nodes: Vec<TreeNode<K>>,
    root: Option<u32>,
    anchors: u64,
    depth: usize,
}

impl<K: NameCodec> BinarySearchTree<K> {
    /// Decode anchors through `state` and build a tree of at most `max_depth` levels
    pub fn build(state: &mut LookupState<'_, K>, max_depth: usize) -> Result<Self> {
        let anchors = state.anchor_count();
        let mut tree = Self {
            nodes: Vec::new(),
            root: None,
            anchors,
            depth: 0,
        };
        tree.root = tree.build_range(state, 0, anchors, max_depth, 1)?;
        Ok(tree)
    }

    fn build_range(
        &mut self,
        state: &mut LookupState<'_, K>,
        lo: u64,
        hi: u64,
        max_depth: usize,
        level: usize,
    ) -> Result<Option<u32>> {
        if lo >= hi || level > max_depth {
            return Ok(None);
        }
        let mid = lo + (hi - lo) / 2;
        let idx = self.nodes.len() as u32;
        self.nodes.push(TreeNode {
            anchor: mid,
            name: state.anchor_name(mid)?,
            left: None,
            right: None,
        });
        self.depth = self.depth.max(level);

        let left = self.build_range(state, lo, mid, max_depth, level + 1)?;
        let right = self.build_range(state, mid + 1, hi, max_depth, level + 1)?;
        let node = &mut self.nodes[idx as usize];
        node.left = left;
        node.right = right;
        Ok(Some(idx))
    }

    /// Walk the tree down to the anchor range that must contain `name`
    pub fn narrow(&self, name: &K) -> Narrowed {
        let (mut lo, mut hi) = (0, self.anchors);
        let mut current = self.root;
        while let Some(idx) = current {
            let node = &self.nodes[idx as usize];
            match name.cmp(&node.name) {
                Ordering::Less => {
                    hi = node.anchor;
                    current = node.left;
                }
                Ordering::Equal => return Narrowed::Anchor(node.anchor),
                Ordering::Greater => {
                    lo = node.anchor;
                    current = node.right;
                }
            }
        }
        Narrowed::Range { lo, hi }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
