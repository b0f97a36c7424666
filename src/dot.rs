//! ARG to DOT (Graphviz) conversion.
//!
//! The generated DOT output follows these conventions:
//! - **Nodes** are labelled with their id and state; roots sit at the top (source rank)
//! - **Target nodes** are filled with the configured colour
//! - **Excluded nodes** (covered, bottom, or below such a node) have a dashed outline
//! - **Tree edges** are solid and labelled with the action
//! - **Covering edges** go from the covered node to its coverer, dashed, and do not
//!   constrain the layout
//!
//! # Examples
//!
//! ```
//! use cegar_rs::arg::Arg;
//!
//! let mut arg = Arg::new();
//! let root = arg.create_root("x = 0", false);
//! arg.create_successor(root, "x := x + 1", "x = 1", true);
//!
//! let dot = arg.to_dot().unwrap();
//! assert!(dot.starts_with("digraph arg {"));
//! // Render with: dot -Tpng arg.dot -o arg.png
//! ```

use std::fmt::{self, Display, Write as _};

use crate::arg::{Arg, NodeId};

/// Configuration options for DOT output generation.
///
/// ```
/// use cegar_rs::dot::DotConfig;
///
/// let config = DotConfig {
///     rankdir: "LR",
///     ..DotConfig::default()
/// };
/// assert_eq!(config.node_shape, "box");
/// ```
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Name of the `digraph` (default: "arg")
    pub graph_name: &'static str,
    /// Layout direction (default: "TB")
    pub rankdir: &'static str,
    /// Shape of every node (default: "box")
    pub node_shape: &'static str,
    /// Fill colour of target nodes (default: "red")
    pub target_color: &'static str,
    /// Style of covering edges and excluded nodes (default: "dashed")
    pub covered_style: &'static str,
    /// Font of labels (default: "monospace")
    pub font_name: &'static str,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            graph_name: "arg",
            rankdir: "TB",
            node_shape: "box",
            target_color: "red",
            covered_style: "dashed",
            font_name: "monospace",
        }
    }
}

impl<S: Display, A: Display> Arg<S, A> {
    /// Converts the ARG to DOT format with the default configuration.
    pub fn to_dot(&self) -> Result<String, fmt::Error> {
        self.to_dot_with_config(&DotConfig::default())
    }

    /// Converts the ARG to DOT format.
    ///
    /// Nodes appear in creation order, so the output is deterministic for a
    /// deterministic search.
    pub fn to_dot_with_config(&self, config: &DotConfig) -> Result<String, fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph {} {{", config.graph_name)?;
        writeln!(dot, "rankdir={};", config.rankdir)?;
        writeln!(dot, "node [shape={}, fontname=\"{}\"];", config.node_shape, config.font_name)?;
        writeln!(dot, "edge [fontname=\"{}\"];", config.font_name)?;

        for n in self.nodes() {
            let label = escape(&format!("{}: {}", n, self.state(n)));
            let mut attrs = vec![format!("label=\"{label}\"")];
            if self.is_target(n) {
                attrs.push(format!("style=filled, fillcolor={}", config.target_color));
                if self.is_excluded(n) {
                    attrs.push("peripheries=2".to_string());
                }
            } else if self.is_excluded(n) {
                attrs.push(format!("style={}", config.covered_style));
            }
            writeln!(dot, "{} [{}];", n, attrs.join(", "))?;
        }

        // Roots at the top
        writeln!(dot, "{{ rank=source; {} }}", join(self.init_nodes()))?;

        for (source, action, target) in self.edges() {
            writeln!(dot, "{} -> {} [label=\"{}\"];", source, target, escape(&action.to_string()))?;
        }
        for (covered, covering) in self.coverings() {
            writeln!(
                dot,
                "{} -> {} [style={}, constraint=false];",
                covered, covering, config.covered_style
            )?;
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}

fn join(nodes: &[NodeId]) -> String {
    nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>().join("; ")
}

/// Escapes a label for a double-quoted DOT string; newlines become left-justified breaks.
fn escape(label: &str) -> String {
    let mut escaped = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\l"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn sample() -> (Arg<&'static str, &'static str>, [NodeId; 4]) {
        let mut arg = Arg::new();
        let r = arg.create_root("x = 0", false);
        let a = arg.create_successor(r, "inc", "x = 1", false);
        let b = arg.create_successor(a, "inc", "x \"big\"", true);
        let c = arg.create_successor(r, "skip", "x = 0", false);
        arg.cover(c, r);
        (arg, [r, a, b, c])
    }

    #[test]
    fn test_to_dot_basic() {
        let (arg, [r, a, b, c]) = sample();
        let dot = arg.to_dot().unwrap();
        assert!(dot.starts_with("digraph arg {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains(&format!("{r} -> {a} [label=\"inc\"];")));
        assert!(dot.contains(&format!("{c} -> {r} [style=dashed, constraint=false];")));
        assert!(dot.contains(&format!("{b} [label=\"{b}: x \\\"big\\\"\", style=filled, fillcolor=red];")));
        assert!(dot.contains(&format!("{c} [label=\"{c}: x = 0\", style=dashed];")));
        assert!(dot.contains(&format!("{{ rank=source; {r} }}")));
    }

    #[test]
    fn test_to_dot_with_config() {
        let (arg, _) = sample();
        let config = DotConfig {
            graph_name: "g",
            covered_style: "dotted",
            ..DotConfig::default()
        };
        let dot = arg.to_dot_with_config(&config).unwrap();
        assert!(dot.starts_with("digraph g {"));
        assert!(dot.contains("style=dotted, constraint=false"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\"b\\c\nd"), "a\\\"b\\\\c\\ld");
    }
}
