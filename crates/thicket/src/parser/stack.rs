//! Graph-structured stack
//!
//! Growing nodes live in an arena and refer to each other by [`GnId`]. A
//! node is identified by its [`GnKey`], so two derivations that reach the
//! same state over the same span share one node and its future work.

use crate::automaton::StateId;
use crate::rule::RuleId;
use crate::scanner::ScannedLeaf;
use crate::sppt::EmbeddedTree;
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct GnId(u32);

impl GnId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a growing node. `count` is the number of children so far,
/// kept only where a list guard can tell the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GnKey {
    pub state: StateId,
    pub start: usize,
    pub next_input: usize,
    pub count: u32,
}

/// One derivation step: the partial node to the left (if any) and the
/// completed child that extended it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pack {
    pub left: Option<GnId>,
    pub child: GnId,
}

#[derive(Debug, Clone)]
pub(crate) struct LeafData {
    pub match_end: usize,
    pub skip: SmallVec<[ScannedLeaf; 2]>,
    pub embedded: Option<Arc<EmbeddedTree>>,
}

#[derive(Debug, Clone)]
pub(crate) struct GrowingNode {
    pub state: StateId,
    pub rule: RuleId,
    pub complete: bool,
    pub start: usize,
    pub next_input: usize,
    pub count: u32,
    pub previous: SmallVec<[GnId; 2]>,
    /// Nodes grafted onto this one on its own level; they inherit any
    /// previous link this node gains later.
    pub next: SmallVec<[GnId; 1]>,
    pub packs: SmallVec<[Pack; 1]>,
    pub leaf: Option<LeafData>,
}

#[derive(Debug, Default)]
pub(crate) struct GraphStack {
    nodes: Vec<GrowingNode>,
    index: HashMap<GnKey, GnId, ahash::RandomState>,
    links: HashSet<(GnId, GnId), ahash::RandomState>,
}

impl GraphStack {
    /// Returns the node for `key`, creating it if needed. The flag tells
    /// whether it was created.
    pub(crate) fn get_or_create(&mut self, key: GnKey, rule: RuleId, complete: bool) -> (GnId, bool) {
        if let Some(id) = self.index.get(&key) {
            return (*id, false);
        }
        let id = GnId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(GrowingNode {
            state: key.state,
            rule,
            complete,
            start: key.start,
            next_input: key.next_input,
            count: key.count,
            previous: SmallVec::new(),
            next: SmallVec::new(),
            packs: SmallVec::new(),
            leaf: None,
        });
        self.index.insert(key, id);
        (id, true)
    }

    pub(crate) fn node(&self, id: GnId) -> &GrowingNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: GnId) -> &mut GrowingNode {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn add_pack(&mut self, id: GnId, pack: Pack) {
        let packs = &mut self.nodes[id.index()].packs;
        if !packs.contains(&pack) {
            packs.push(pack);
        }
    }

    /// Records `previous` as a previous node of `id`. Returns `false` if the
    /// link already existed.
    pub(crate) fn link(&mut self, id: GnId, previous: GnId) -> bool {
        if !self.links.insert((id, previous)) {
            return false;
        }
        self.nodes[id.index()].previous.push(previous);
        true
    }

    pub(crate) fn add_next(&mut self, id: GnId, next: GnId) {
        let successors = &mut self.nodes[id.index()].next;
        if !successors.contains(&next) {
            successors.push(next);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (GnId, &GrowingNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (GnId(index as u32), node))
    }
}
