use std::fmt;

use crate::arg::{Arg, NodeId};

/// An alternating sequence `s0, a0, s1, ..., sn` of states and actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace<S, A> {
    states: Vec<S>,
    actions: Vec<A>,
}

impl<S, A> Trace<S, A> {
    /// # Panics
    ///
    /// Panics unless there is exactly one more state than actions.
    pub fn new(states: Vec<S>, actions: Vec<A>) -> Self {
        assert_eq!(
            states.len(),
            actions.len() + 1,
            "a trace has exactly one more state than actions"
        );
        Self { states, actions }
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn states(&self) -> &[S] {
        &self.states
    }

    pub fn actions(&self) -> &[A] {
        &self.actions
    }

    pub fn state(&self, i: usize) -> &S {
        &self.states[i]
    }

    pub fn action(&self, i: usize) -> &A {
        &self.actions[i]
    }

    pub fn last(&self) -> &S {
        &self.states[self.states.len() - 1]
    }

    pub fn into_parts(self) -> (Vec<S>, Vec<A>) {
        (self.states, self.actions)
    }
}

impl<S: fmt::Display, A: fmt::Display> fmt::Display for Trace<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, state) in self.states.iter().enumerate() {
            if i > 0 {
                writeln!(f, "  --[{}]-->", self.actions[i - 1])?;
            }
            writeln!(f, "{state}")?;
        }
        Ok(())
    }
}

/// The path of ARG nodes from a root to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgTrace {
    nodes: Vec<NodeId>,
}

impl ArgTrace {
    pub fn to<S, A>(arg: &Arg<S, A>, n: NodeId) -> Self {
        let mut nodes = arg.proper_ancestors(n);
        nodes.push(n);
        Self { nodes }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn to_trace<S: Clone, A: Clone>(&self, arg: &Arg<S, A>) -> Trace<S, A> {
        let states = self.nodes.iter().map(|&n| arg.state(n).clone()).collect();
        let actions = self.nodes[1..]
            .iter()
            .filter_map(|&n| arg.node(n).action().cloned())
            .collect();
        Trace::new(states, actions)
    }
}
