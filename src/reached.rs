use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace};

use crate::arg::{Arg, NodeId};
use crate::domain::Domain;
use crate::error::{Error, Result};

/// Maps a state to the partition its covering candidates are drawn from.
///
/// Two states that may cover each other must have the same key. Refinement replaces
/// states in place, so the key must not depend on anything refinement can change.
pub type Partitioning<S, K> = Rc<dyn Fn(&S) -> K>;

/// Puts every state in the same partition.
pub fn single_partition<S>() -> Partitioning<S, ()> {
    Rc::new(|_| ())
}

/// ARG nodes grouped by partition, each partition in insertion order.
pub struct ReachedSet<S, K> {
    partitioning: Partitioning<S, K>,
    partitions: IndexMap<K, Vec<NodeId>>,
}

impl<S, K: Hash + Eq> ReachedSet<S, K> {
    pub fn new(partitioning: Partitioning<S, K>) -> Self {
        Self {
            partitioning,
            partitions: IndexMap::new(),
        }
    }

    pub fn add<A>(&mut self, arg: &Arg<S, A>, n: NodeId) {
        let key = (self.partitioning)(arg.state(n));
        self.partitions.entry(key).or_default().push(n);
    }

    pub fn add_all<A>(&mut self, arg: &Arg<S, A>, nodes: impl IntoIterator<Item = NodeId>) {
        for n in nodes {
            self.add(arg, n);
        }
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.values().all(Vec::is_empty)
    }

    /// Tries to cover `n` by an older, not deeper node of its partition.
    ///
    /// Candidates are consulted in insertion order; the first one that subsumes `n` and
    /// is neither `n` itself nor one of its descendants is chosen. A candidate whose
    /// subsumption check the solver cannot decide is skipped. On success every node
    /// covered by `n` or by one of its descendants is uncovered, since those coverers are
    /// now excluded.
    pub fn try_to_cover<A, D>(&self, arg: &mut Arg<S, A>, domain: &D, n: NodeId) -> Result<bool>
    where
        D: Domain<A, State = S>,
    {
        if arg.is_excluded(n) {
            return Ok(false);
        }
        let key = (self.partitioning)(arg.state(n));
        let Some(candidates) = self.partitions.get(&key) else {
            return Ok(false);
        };
        let depth = arg.node(n).depth();
        for &m in candidates {
            if m == n || arg.node(m).depth() > depth || arg.is_excluded(m) || arg.is_ancestor_of(n, m) {
                continue;
            }
            match domain.is_leq(arg.state(n), arg.state(m)) {
                Ok(true) => {
                    arg.cover(n, m);
                    arg.clear_covered_nodes(n);
                    for d in arg.descendants(n) {
                        arg.clear_covered_nodes(d);
                    }
                    return Ok(true);
                }
                Ok(false) => {}
                Err(Error::Unknown(reason)) => {
                    debug!("skipping cover candidate {m} for {n}: {reason}");
                }
                Err(e) => return Err(e),
            }
        }
        trace!("no cover for {n}");
        Ok(false)
    }
}
