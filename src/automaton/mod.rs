//! Deterministic finite automaton over arbitrary symbols
//!
//! Nodes live in an arena and refer to each other by index, so default
//! transitions may point back at the root or at the node itself without any
//! ownership cycles. Node `0` is always the root.
//!
//! Every node carries a set of terminal markers (empty means non-terminal), an
//! explicit transition table, and a default transition taken when no explicit
//! edge matches the input symbol. A default transition is either back to the
//! root or a self-loop; the self-loop models wildcard absorption.

mod wildcard;

pub use wildcard::{compile_wildcard, WildcardPattern};

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use thiserror::Error;

/// Index of a node inside an [`Automaton`]
pub type NodeId = usize;

/// The root node of every automaton
pub const ROOT: NodeId = 0;

/// Errors raised while building an automaton
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AutomatonError {
    #[error("Node {0} does not exist")]
    UnknownNode(NodeId),
}

/// Where a node goes when no explicit edge matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Restart from the root
    Root,
    /// Stay on the current node
    Itself,
}

#[derive(Debug, Clone)]
struct Node<S, T> {
    terminals: HashSet<T>,
    edges: HashMap<S, NodeId>,
    fallback: Fallback,
}

impl<S, T> Node<S, T> {
    fn new(fallback: Fallback) -> Self {
        Self {
            terminals: HashSet::new(),
            edges: HashMap::new(),
            fallback,
        }
    }
}

/// Arena-backed automaton with per-node default transitions
#[derive(Debug, Clone)]
pub struct Automaton<S, T> {
    nodes: Vec<Node<S, T>>,
}

impl<S, T> Automaton<S, T>
where
    S: Eq + Hash + Clone,
    T: Eq + Hash + Clone,
{
    /// Creates an automaton holding only the root
    ///
    /// The root falls back to itself, which for the root is the same as
    /// falling back to the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(Fallback::Root)],
        }
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Inserts a path starting at the root
    ///
    /// Each step is a symbol plus the fallback a freshly created node should
    /// get. Existing nodes are shared; their fallback is only ever widened from
    /// `Root` to `Itself`, never narrowed. The last node reached is tagged with
    /// `terminal` and returned.
    pub fn add_pattern<I>(&mut self, terminal: T, steps: I) -> NodeId
    where
        I: IntoIterator<Item = (S, Fallback)>,
    {
        let end = self.extend(ROOT, steps);
        self.nodes[end].terminals.insert(terminal);
        end
    }

    /// Inserts a path starting at an arbitrary node
    pub fn add_pattern_from<I>(
        &mut self,
        start: NodeId,
        terminal: T,
        steps: I,
    ) -> Result<NodeId, AutomatonError>
    where
        I: IntoIterator<Item = (S, Fallback)>,
    {
        self.check(start)?;
        let end = self.extend(start, steps);
        self.nodes[end].terminals.insert(terminal);
        Ok(end)
    }

    /// Changes the fallback of an existing node
    pub fn set_fallback(&mut self, node: NodeId, fallback: Fallback) -> Result<(), AutomatonError> {
        self.check(node)?;
        self.nodes[node].fallback = fallback;
        Ok(())
    }

    /// Returns the fallback of a node
    pub fn fallback(&self, node: NodeId) -> Option<Fallback> {
        self.nodes.get(node).map(|n| n.fallback)
    }

    /// Follows one symbol from `node`
    ///
    /// Unknown nodes step to the root.
    pub fn step(&self, node: NodeId, symbol: &S) -> NodeId {
        let Some(current) = self.nodes.get(node) else {
            return ROOT;
        };

        match current.edges.get(symbol) {
            Some(&next) => next,
            None => match current.fallback {
                Fallback::Root => ROOT,
                Fallback::Itself => node,
            },
        }
    }

    /// Folds [`step`](Self::step) over a symbol sequence
    ///
    /// Stops early and returns `start` as soon as a step lands back on the
    /// starting node through a fallback, since no further input can make
    /// progress from there.
    pub fn match_from<'a, I>(&self, start: NodeId, symbols: I) -> NodeId
    where
        I: IntoIterator<Item = &'a S>,
        S: 'a,
    {
        let mut current = start;
        for symbol in symbols {
            let next = self.step(current, symbol);
            if next == start && self.is_reset(current, symbol) {
                return start;
            }
            current = next;
        }
        current
    }

    /// Terminal markers of the node reached by walking `symbols` from the root
    pub fn terminals<'a, I>(&self, symbols: I) -> &HashSet<T>
    where
        I: IntoIterator<Item = &'a S>,
        S: 'a,
    {
        let end = self.match_from(ROOT, symbols);
        &self.nodes[end].terminals
    }

    /// Terminal markers attached to a node
    pub fn terminals_of(&self, node: NodeId) -> Option<&HashSet<T>> {
        self.nodes.get(node).map(|n| &n.terminals)
    }

    /// Walks from the root and reports whether `marker` was reached
    ///
    /// A node carrying `marker` whose fallback is a self-loop accepts every
    /// continuation, so reaching one anywhere along the walk counts. A node
    /// carrying `marker` with a root fallback only counts at the end of input.
    ///
    /// This differs from checking [`terminals`](Self::terminals) of the final
    /// node: once a longer pattern sharing the prefix leads the walk off the
    /// self-looping node and then resets, `terminals` comes back empty while
    /// `accepts` still reports the earlier match.
    pub fn accepts<'a, I>(&self, symbols: I, marker: &T) -> bool
    where
        I: IntoIterator<Item = &'a S>,
        S: 'a,
    {
        let mut current = ROOT;
        for symbol in symbols {
            let node = &self.nodes[current];
            if node.fallback == Fallback::Itself && node.terminals.contains(marker) {
                return true;
            }

            if self.is_reset(current, symbol) {
                return false;
            }
            current = self.step(current, symbol);
        }
        self.nodes[current].terminals.contains(marker)
    }

    /// True when `symbol` has no edge out of `node` and the node falls back to the root
    fn is_reset(&self, node: NodeId, symbol: &S) -> bool {
        match self.nodes.get(node) {
            Some(n) => n.fallback == Fallback::Root && !n.edges.contains_key(symbol),
            None => true,
        }
    }

    fn check(&self, node: NodeId) -> Result<(), AutomatonError> {
        if node < self.nodes.len() {
            Ok(())
        } else {
            Err(AutomatonError::UnknownNode(node))
        }
    }

    fn extend<I>(&mut self, start: NodeId, steps: I) -> NodeId
    where
        I: IntoIterator<Item = (S, Fallback)>,
    {
        let mut current = start;
        for (symbol, fallback) in steps {
            current = match self.nodes[current].edges.get(&symbol) {
                Some(&existing) => {
                    if fallback == Fallback::Itself {
                        self.nodes[existing].fallback = Fallback::Itself;
                    }
                    existing
                }
                None => {
                    let id = self.nodes.len();
                    self.nodes.push(Node::new(fallback));
                    self.nodes[current].edges.insert(symbol, id);
                    id
                }
            };
        }
        current
    }
}

impl<S, T> Default for Automaton<S, T>
where
    S: Eq + Hash + Clone,
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(text: &str) -> Vec<(char, Fallback)> {
        text.chars().map(|c| (c, Fallback::Root)).collect()
    }

    #[test]
    fn test_new_automaton_has_root_only() {
        let automaton: Automaton<char, u8> = Automaton::new();
        assert!(automaton.is_empty());
        assert_eq!(automaton.len(), 1);
    }

    #[test]
    fn test_add_pattern_shares_prefixes() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        automaton.add_pattern(1, steps("abc"));
        automaton.add_pattern(2, steps("abd"));

        // root + a + b + c + d
        assert_eq!(automaton.len(), 5);
    }

    #[test]
    fn test_step_follows_edges_and_fallbacks() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        let end = automaton.add_pattern(1, vec![('a', Fallback::Root), ('b', Fallback::Itself)]);

        let a = automaton.step(ROOT, &'a');
        assert_ne!(a, ROOT);
        assert_eq!(automaton.step(a, &'z'), ROOT);
        assert_eq!(automaton.step(a, &'b'), end);
        assert_eq!(automaton.step(end, &'z'), end);
    }

    #[test]
    fn test_terminals_of_full_match() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        automaton.add_pattern(7, steps("abc"));

        let path: Vec<char> = "abc".chars().collect();
        assert!(automaton.terminals(&path).contains(&7));

        let partial: Vec<char> = "ab".chars().collect();
        assert!(automaton.terminals(&partial).is_empty());
    }

    #[test]
    fn test_match_short_circuits_on_reset() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        automaton.add_pattern(1, steps("abc"));

        // "x" resets to root immediately; later "abc" must not match
        let path: Vec<char> = "xabc".chars().collect();
        assert_eq!(automaton.match_from(ROOT, &path), ROOT);
    }

    #[test]
    fn test_existing_node_fallback_is_widened() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        let first = automaton.add_pattern(1, steps("ab"));
        assert_eq!(automaton.fallback(first), Some(Fallback::Root));

        automaton.add_pattern(2, vec![('a', Fallback::Root), ('b', Fallback::Itself)]);
        assert_eq!(automaton.fallback(first), Some(Fallback::Itself));

        automaton.add_pattern(3, steps("ab"));
        assert_eq!(automaton.fallback(first), Some(Fallback::Itself));
    }

    #[test]
    fn test_add_pattern_from_unknown_node_fails() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        let result = automaton.add_pattern_from(42, 1, steps("a"));
        assert_eq!(result, Err(AutomatonError::UnknownNode(42)));
        assert!(automaton.set_fallback(42, Fallback::Itself).is_err());
    }

    #[test]
    fn test_add_pattern_from_inner_node() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        let a = automaton.add_pattern(1, steps("a"));
        let end = automaton.add_pattern_from(a, 2, steps("b")).unwrap();

        let path: Vec<char> = "ab".chars().collect();
        assert_eq!(automaton.match_from(ROOT, &path), end);
    }

    #[test]
    fn test_accepts_latches_on_absorbing_terminal() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        automaton.add_pattern(1, vec![('a', Fallback::Root), ('b', Fallback::Itself)]);
        automaton.add_pattern(2, steps("abcd"));

        // walks past the absorbing terminal at "ab" into "abc" then fails
        let path: Vec<char> = "abcx".chars().collect();
        assert!(automaton.accepts(&path, &1));
        assert!(!automaton.accepts(&path, &2));
        assert!(automaton.terminals(&path).is_empty());
    }

    #[test]
    fn test_accepts_requires_end_for_anchored_terminal() {
        let mut automaton: Automaton<char, u8> = Automaton::new();
        automaton.add_pattern(1, steps("ab"));

        let exact: Vec<char> = "ab".chars().collect();
        let longer: Vec<char> = "abc".chars().collect();
        assert!(automaton.accepts(&exact, &1));
        assert!(!automaton.accepts(&longer, &1));
    }

    #[test]
    fn test_generic_over_symbols() {
        let mut automaton: Automaton<&str, &str> = Automaton::new();
        automaton.add_pattern(
            "greeting",
            vec![("hello", Fallback::Root), ("world", Fallback::Root)],
        );

        assert!(automaton.terminals(&["hello", "world"]).contains("greeting"));
        assert!(automaton.terminals(&["hello", "there"]).is_empty());
    }
}
