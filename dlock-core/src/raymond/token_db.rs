//! A node's view of where the k-entry tokens are.

use crate::{GroupId, NodeId};

/// One token: who holds it and the group it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub holder: NodeId,
    /// `None` while the token is free for any group.
    pub group: Option<GroupId>,
    /// Set while the local node is inside its section on this token.
    pub in_use: bool,
}

impl TokenEntry {
    #[must_use]
    pub fn free(holder: NodeId) -> Self {
        Self {
            holder,
            group: None,
            in_use: false,
        }
    }

    fn serves(&self, group: &GroupId) -> bool {
        self.group.as_ref().is_none_or(|bound| bound == group)
    }
}

/// Multiset of tokens. Entries are only moved between holders; the count
/// changes only through [`evict`](Self::evict) after a failed send.
#[derive(Debug, Clone)]
pub struct TokenDatabase {
    entries: Vec<TokenEntry>,
}

impl TokenDatabase {
    /// `count` free tokens, all held by `holder`.
    #[must_use]
    pub fn new(holder: NodeId, count: usize) -> Self {
        Self {
            entries: vec![TokenEntry::free(holder); count],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn held_by(&self, id: NodeId) -> usize {
        self.entries.iter().filter(|e| e.holder == id).count()
    }

    /// Whether `me` holds a token that is free or bound to `group`.
    #[must_use]
    pub fn has_token(&self, me: NodeId, group: &GroupId) -> bool {
        self.entries
            .iter()
            .any(|e| e.holder == me && e.serves(group))
    }

    /// Whether `me` holds a token not in use that may be granted for `group`.
    #[must_use]
    pub fn has_spare(&self, me: NodeId, group: &GroupId) -> bool {
        self.spare_index(me, group).is_some()
    }

    /// Removes and returns a spare token of `me` for `group`, preferring one
    /// already bound to it.
    pub fn take_spare(&mut self, me: NodeId, group: &GroupId) -> Option<TokenEntry> {
        let at = self.spare_index(me, group)?;
        Some(self.entries.remove(at))
    }

    fn spare_index(&self, me: NodeId, group: &GroupId) -> Option<usize> {
        let spare = |e: &TokenEntry| e.holder == me && !e.in_use;
        self.entries
            .iter()
            .position(|e| spare(e) && e.group.as_ref() == Some(group))
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| spare(e) && e.group.is_none())
            })
    }

    /// First holder that is not `me`.
    #[must_use]
    pub fn other_holder(&self, me: NodeId) -> Option<NodeId> {
        self.entries
            .iter()
            .map(|e| e.holder)
            .find(|&holder| holder != me)
    }

    /// Drops one entry held by `holder`. Returns whether one was found.
    pub fn evict(&mut self, holder: NodeId) -> bool {
        match self.entries.iter().position(|e| e.holder == holder) {
            Some(at) => {
                self.entries.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn insert(&mut self, entry: TokenEntry) {
        self.entries.push(entry);
    }

    /// Records a token arriving at `me` from `sender`, bound to `group`: one
    /// entry of the sender (or, failing that, of any other node) is replaced by
    /// an idle entry of `me`. If every entry already names `me` the count
    /// grows, since the local view was missing this token.
    pub fn transfer_from(&mut self, sender: NodeId, me: NodeId, group: Option<GroupId>) {
        let at = self
            .entries
            .iter()
            .position(|e| e.holder == sender)
            .or_else(|| self.entries.iter().position(|e| e.holder != me));
        if let Some(at) = at {
            self.entries.remove(at);
        }
        self.entries.push(TokenEntry {
            holder: me,
            group,
            in_use: false,
        });
    }

    /// Unbinds every token of `me` and marks it free.
    pub fn release_all(&mut self, me: NodeId) {
        for entry in self.entries.iter_mut().filter(|e| e.holder == me) {
            entry.group = None;
            entry.in_use = false;
        }
    }

    /// Unbinds the tokens of `me` that are not in use.
    pub fn release_idle(&mut self, me: NodeId) {
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.holder == me && !e.in_use)
        {
            entry.group = None;
        }
    }
}
