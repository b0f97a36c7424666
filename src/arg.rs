//! Abstract reachability graphs.
//!
//! Nodes live in an arena owned by the [`Arg`] and refer to each other by [`NodeId`].
//! Tree edges run from a node to its successors; the covering relation is a separate
//! set of non-owning back-references: `n` covered by `m` means `n`'s subtree need not be
//! explored because `m` subsumes it.

use std::fmt;

use indexmap::IndexSet;
use log::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ArgNode<S, A> {
    state: S,
    parent: Option<(NodeId, A)>,
    depth: usize,
    succs: Vec<NodeId>,
    expanded: bool,
    target: bool,
    bottom: bool,
    covering: Option<NodeId>,
    covered: IndexSet<NodeId>,
}

impl<S, A> ArgNode<S, A> {
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent.as_ref().map(|(p, _)| *p)
    }

    /// The action on the incoming edge; `None` for roots.
    pub fn action(&self) -> Option<&A> {
        self.parent.as_ref().map(|(_, a)| a)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn succs(&self) -> &[NodeId] {
        &self.succs
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn is_target(&self) -> bool {
        self.target
    }

    pub fn is_bottom(&self) -> bool {
        self.bottom
    }

    /// The node covering this one.
    pub fn covering(&self) -> Option<NodeId> {
        self.covering
    }

    /// The nodes this one covers, in the order they were covered.
    pub fn covered_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.covered.iter().copied()
    }
}

#[derive(Debug, Clone)]
pub struct Arg<S, A> {
    nodes: Vec<ArgNode<S, A>>,
    init: Vec<NodeId>,
}

impl<S, A> Default for Arg<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> Arg<S, A> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            init: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, n: NodeId) -> &ArgNode<S, A> {
        &self.nodes[n.0]
    }

    fn node_mut(&mut self, n: NodeId) -> &mut ArgNode<S, A> {
        &mut self.nodes[n.0]
    }

    pub fn state(&self, n: NodeId) -> &S {
        &self.nodes[n.0].state
    }

    /// All nodes, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn init_nodes(&self) -> &[NodeId] {
        &self.init
    }

    pub fn create_root(&mut self, state: S, target: bool) -> NodeId {
        let n = NodeId(self.nodes.len());
        self.nodes.push(ArgNode {
            state,
            parent: None,
            depth: 0,
            succs: Vec::new(),
            expanded: false,
            target,
            bottom: false,
            covering: None,
            covered: IndexSet::new(),
        });
        self.init.push(n);
        n
    }

    pub fn create_successor(&mut self, parent: NodeId, action: A, state: S, target: bool) -> NodeId {
        let n = NodeId(self.nodes.len());
        let depth = self.node(parent).depth + 1;
        self.nodes.push(ArgNode {
            state,
            parent: Some((parent, action)),
            depth,
            succs: Vec::new(),
            expanded: false,
            target,
            bottom: false,
            covering: None,
            covered: IndexSet::new(),
        });
        self.node_mut(parent).succs.push(n);
        n
    }

    pub fn succs(&self, n: NodeId) -> &[NodeId] {
        &self.node(n).succs
    }

    /// Tree edges `(source, action, target)`, in creation order of the targets.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, &A, NodeId)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.parent.as_ref().map(|(p, a)| (*p, a, NodeId(i))))
    }

    /// Pairs `(n, m)` with `n` covered by `m`.
    pub fn coverings(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.covering.map(|m| (NodeId(i), m)))
    }

    pub fn is_leaf(&self, n: NodeId) -> bool {
        let node = self.node(n);
        !node.expanded && node.succs.is_empty()
    }

    pub fn is_covered(&self, n: NodeId) -> bool {
        self.node(n).covering.is_some()
    }

    pub fn is_target(&self, n: NodeId) -> bool {
        self.node(n).target
    }

    pub fn is_expanded(&self, n: NodeId) -> bool {
        self.node(n).expanded
    }

    /// Whether `n` or one of its ancestors is covered or bottom.
    pub fn is_excluded(&self, n: NodeId) -> bool {
        let mut current = Some(n);
        while let Some(c) = current {
            let node = self.node(c);
            if node.covering.is_some() || node.bottom {
                return true;
            }
            current = node.parent();
        }
        false
    }

    pub fn mark_expanded(&mut self, n: NodeId) {
        self.node_mut(n).expanded = true;
    }

    /// Covers `n` by `m`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is already covered, if `n == m`, or if `m` is a descendant of `n`.
    pub fn cover(&mut self, n: NodeId, m: NodeId) {
        assert_ne!(n, m, "a node cannot cover itself");
        assert!(!self.is_covered(n), "{n} is already covered");
        assert!(!self.is_ancestor_of(n, m), "{n} cannot be covered by its descendant {m}");
        debug!("cover({}, {})", n, m);
        self.node_mut(n).covering = Some(m);
        self.node_mut(m).covered.insert(n);
    }

    pub fn uncover(&mut self, n: NodeId) {
        if let Some(m) = self.node_mut(n).covering.take() {
            debug!("uncover({}, {})", n, m);
            self.node_mut(m).covered.shift_remove(&n);
        }
    }

    /// Uncovers every node that `n` covers.
    pub fn clear_covered_nodes(&mut self, n: NodeId) {
        let covered = std::mem::take(&mut self.node_mut(n).covered);
        for c in covered {
            debug!("uncover({}, {})", c, n);
            self.node_mut(c).covering = None;
        }
    }

    /// Replaces the state of `n` along with its cached flags.
    ///
    /// # Panics
    ///
    /// Panics if `n` still covers other nodes: those coverings were checked against the
    /// old state.
    pub fn set_state(&mut self, n: NodeId, state: S, bottom: bool, target: bool) {
        assert!(
            self.node(n).covered.is_empty(),
            "covered nodes of {n} must be cleared before its state changes"
        );
        debug!("set_state({}, bottom={}, target={})", n, bottom, target);
        let node = self.node_mut(n);
        node.state = state;
        node.bottom = bottom;
        node.target = target;
    }

    /// Ancestors of `n`, excluding `n`, from the root down.
    pub fn proper_ancestors(&self, n: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::with_capacity(self.node(n).depth);
        let mut current = self.node(n).parent();
        while let Some(c) = current {
            ancestors.push(c);
            current = self.node(c).parent();
        }
        ancestors.reverse();
        ancestors
    }

    /// Descendants of `n`, excluding `n`, in depth-first preorder.
    pub fn descendants(&self, n: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack: Vec<NodeId> = self.node(n).succs.iter().rev().copied().collect();
        while let Some(c) = stack.pop() {
            result.push(c);
            stack.extend(self.node(c).succs.iter().rev().copied());
        }
        result
    }

    /// Whether `a` is a proper ancestor of `d`.
    pub fn is_ancestor_of(&self, a: NodeId, d: NodeId) -> bool {
        let depth = self.node(a).depth;
        let mut current = self.node(d).parent();
        while let Some(c) = current {
            if c == a {
                return true;
            }
            if self.node(c).depth <= depth {
                return false;
            }
            current = self.node(c).parent();
        }
        false
    }

    /// Unexpanded, non-excluded nodes, in creation order.
    pub fn incomplete_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().filter(|&n| !self.is_expanded(n) && !self.is_excluded(n))
    }

    /// A node is complete when it is excluded, or expanded with all successors complete.
    pub fn is_node_complete(&self, n: NodeId) -> bool {
        let mut stack = vec![n];
        while let Some(c) = stack.pop() {
            if self.is_excluded(c) {
                continue;
            }
            if !self.is_expanded(c) {
                return false;
            }
            stack.extend_from_slice(self.succs(c));
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        self.init.iter().all(|&n| self.is_node_complete(n))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn chain() -> (Arg<u32, char>, Vec<NodeId>) {
        let mut arg = Arg::new();
        let n0 = arg.create_root(0, false);
        let n1 = arg.create_successor(n0, 'a', 1, false);
        let n2 = arg.create_successor(n1, 'b', 2, false);
        let n3 = arg.create_successor(n0, 'c', 3, false);
        (arg, vec![n0, n1, n2, n3])
    }

    #[test]
    fn test_structure() {
        let (arg, n) = chain();
        assert_eq!(arg.len(), 4);
        assert_eq!(arg.init_nodes(), &[n[0]]);
        assert_eq!(arg.succs(n[0]), &[n[1], n[3]]);
        assert_eq!(arg.node(n[2]).depth(), 2);
        assert_eq!(arg.node(n[2]).action(), Some(&'b'));
        assert_eq!(arg.node(n[0]).action(), None);
        assert_eq!(arg.proper_ancestors(n[2]), vec![n[0], n[1]]);
        assert_eq!(arg.descendants(n[0]), vec![n[1], n[2], n[3]]);
        assert!(arg.is_ancestor_of(n[0], n[2]));
        assert!(!arg.is_ancestor_of(n[2], n[0]));
        assert!(!arg.is_ancestor_of(n[3], n[2]));
        assert!(!arg.is_ancestor_of(n[2], n[2]));
        let edges: Vec<_> = arg.edges().map(|(s, a, t)| (s, *a, t)).collect();
        assert_eq!(edges, vec![(n[0], 'a', n[1]), (n[1], 'b', n[2]), (n[0], 'c', n[3])]);
    }

    #[test]
    fn test_cover_excludes_subtree() {
        let (mut arg, n) = chain();
        arg.cover(n[1], n[3]);
        assert!(arg.is_covered(n[1]));
        assert!(arg.is_excluded(n[1]));
        assert!(arg.is_excluded(n[2]));
        assert!(!arg.is_excluded(n[3]));
        assert_eq!(arg.coverings().collect::<Vec<_>>(), vec![(n[1], n[3])]);
        assert_eq!(arg.node(n[3]).covered_nodes().collect::<Vec<_>>(), vec![n[1]]);
        arg.uncover(n[1]);
        assert!(!arg.is_excluded(n[2]));
        assert_eq!(arg.node(n[3]).covered_nodes().count(), 0);
    }

    #[test]
    fn test_clear_covered_nodes_is_idempotent() {
        let (mut arg, n) = chain();
        arg.cover(n[2], n[3]);
        arg.cover(n[1], n[3]);
        arg.clear_covered_nodes(n[3]);
        assert!(!arg.is_covered(n[1]));
        assert!(!arg.is_covered(n[2]));
        arg.clear_covered_nodes(n[3]);
        assert_eq!(arg.coverings().count(), 0);
    }

    #[test]
    #[should_panic(expected = "cannot be covered by its descendant")]
    fn test_cover_by_descendant() {
        let (mut arg, n) = chain();
        arg.cover(n[0], n[2]);
    }

    #[test]
    #[should_panic(expected = "must be cleared before its state changes")]
    fn test_set_state_requires_cleared_coverings() {
        let (mut arg, n) = chain();
        arg.cover(n[2], n[3]);
        arg.set_state(n[3], 7, false, false);
    }

    #[test]
    fn test_completeness() {
        let (mut arg, n) = chain();
        assert!(!arg.is_complete());
        assert_eq!(arg.incomplete_nodes().collect::<Vec<_>>(), vec![n[0], n[1], n[2], n[3]]);
        arg.mark_expanded(n[0]);
        arg.mark_expanded(n[1]);
        arg.mark_expanded(n[3]);
        assert_eq!(arg.incomplete_nodes().collect::<Vec<_>>(), vec![n[2]]);
        arg.set_state(n[2], 2, true, false);
        assert!(arg.is_excluded(n[2]));
        assert!(arg.is_complete());
        assert!(arg.is_leaf(n[2]));
        assert!(!arg.is_leaf(n[0]));
    }
}
