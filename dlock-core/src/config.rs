//! Node configuration and topology builders.

use std::collections::BTreeMap;

use crate::NodeId;

/// Static map from neighbour id to transport address.
#[derive(Debug, Clone)]
pub struct NeighbourTable<A> {
    peers: BTreeMap<NodeId, A>,
}

impl<A> Default for NeighbourTable<A> {
    fn default() -> Self {
        Self {
            peers: BTreeMap::new(),
        }
    }
}

impl<A> NeighbourTable<A> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId, addr: A) {
        self.peers.insert(id, addr);
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&A> {
        self.peers.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Neighbour ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.peers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &A)> {
        self.peers.iter().map(|(id, addr)| (*id, addr))
    }
}

impl<A> FromIterator<(NodeId, A)> for NeighbourTable<A> {
    fn from_iter<I: IntoIterator<Item = (NodeId, A)>>(iter: I) -> Self {
        Self {
            peers: iter.into_iter().collect(),
        }
    }
}

/// Everything a node is constructed with. Fixed for the node's lifetime.
#[derive(Debug, Clone)]
pub struct NodeConfig<A> {
    pub id: NodeId,
    pub neighbours: NeighbourTable<A>,
    /// Initial privilege holder (Raymond family).
    pub holder: NodeId,
    /// Number of tokens in the system (Raymond k-entry).
    pub tokens: usize,
}

impl<A> NodeConfig<A> {
    /// Defaults to node 0 holding a single token.
    #[must_use]
    pub fn new(id: NodeId, neighbours: NeighbourTable<A>) -> Self {
        Self {
            id,
            neighbours,
            holder: NodeId(0),
            tokens: 1,
        }
    }

    /// Node `id` in a fully connected cluster of `size` nodes. `addr` maps a
    /// neighbour id to its transport address.
    #[must_use]
    pub fn full_mesh(id: NodeId, size: u32, addr: impl Fn(NodeId) -> A) -> Self {
        let neighbours = full_mesh(id, size).into_iter().map(|n| (n, addr(n))).collect();
        Self::new(id, neighbours)
    }

    /// Node `id` in a binary tree of `size` nodes rooted at node 0, with the
    /// initial holder pointing at the parent.
    #[must_use]
    pub fn binary_tree(id: NodeId, size: u32, addr: impl Fn(NodeId) -> A) -> Self {
        let tree = binary_tree(id, size);
        let neighbours = tree.neighbours.into_iter().map(|n| (n, addr(n))).collect();
        Self::new(id, neighbours).with_holder(tree.holder)
    }

    #[must_use]
    pub fn with_holder(mut self, holder: NodeId) -> Self {
        self.holder = holder;
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.tokens = tokens;
        self
    }
}

/// Every other node of a `size`-node cluster.
#[must_use]
pub fn full_mesh(id: NodeId, size: u32) -> Vec<NodeId> {
    (0..size).map(NodeId).filter(|&n| n != id).collect()
}

/// Position of one node in a binary tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreePosition {
    /// Parent (if any) followed by children.
    pub neighbours: Vec<NodeId>,
    /// The parent, or the node itself for the root.
    pub holder: NodeId,
}

/// Node `i` has children `2i+1` and `2i+2` and parent `(i-1)/2`. The root
/// starts out holding the privilege and everyone else points at their parent.
#[must_use]
pub fn binary_tree(id: NodeId, size: u32) -> TreePosition {
    let i = id.0;
    let parent = (i > 0).then(|| NodeId((i - 1) / 2));
    let children = [2 * i + 1, 2 * i + 2]
        .into_iter()
        .filter(|&c| c < size)
        .map(NodeId);

    TreePosition {
        neighbours: parent.into_iter().chain(children).collect(),
        holder: parent.unwrap_or(id),
    }
}
