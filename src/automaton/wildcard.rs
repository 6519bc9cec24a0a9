//! Compiles `*`/`$` wildcard patterns into automaton paths
//!
//! A `*` contributes no edge; it turns the node before it into a self-loop so
//! any run of characters is absorbed there. A trailing `$` anchors the pattern
//! at the end of input. Without the anchor the final node also self-loops,
//! which gives plain prefix semantics.

use super::{Automaton, Fallback, NodeId};
use std::hash::Hash;

/// A wildcard pattern broken into automaton steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    steps: Vec<(char, Fallback)>,
    anchored: bool,
}

impl WildcardPattern {
    /// Parses a pattern; returns `None` when it contributes no literal characters
    ///
    /// ```
    /// use crawlgate::automaton::WildcardPattern;
    ///
    /// assert!(WildcardPattern::parse("/data/*").is_some());
    /// assert!(WildcardPattern::parse("*").is_none());
    /// assert!(WildcardPattern::parse("/daylight/$").unwrap().is_anchored());
    /// ```
    pub fn parse(pattern: &str) -> Option<Self> {
        let (body, anchored) = match pattern.strip_suffix('$') {
            Some(body) => (body, true),
            None => (pattern, false),
        };

        let chars: Vec<char> = body.chars().collect();
        let mut steps: Vec<(char, Fallback)> = Vec::with_capacity(chars.len());

        for (index, &c) in chars.iter().enumerate() {
            if c == '*' {
                // A leading star would turn the root into a self-loop and
                // unanchor every other pattern sharing it.
                if let Some(last) = steps.last_mut() {
                    last.1 = Fallback::Itself;
                }
                continue;
            }

            let fallback = if chars.get(index + 1) == Some(&'*') {
                Fallback::Itself
            } else {
                Fallback::Root
            };
            steps.push((c, fallback));
        }

        if !anchored {
            if let Some(last) = steps.last_mut() {
                last.1 = Fallback::Itself;
            }
        }

        if steps.is_empty() {
            None
        } else {
            Some(Self { steps, anchored })
        }
    }

    /// True if the pattern ended with `$`
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Number of literal characters, i.e. nodes this pattern may add
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; empty patterns are rejected by [`parse`](Self::parse)
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Inserts this pattern into an automaton, tagging the last node
    pub fn insert_into<T>(&self, automaton: &mut Automaton<char, T>, terminal: T) -> NodeId
    where
        T: Eq + Hash + Clone,
    {
        automaton.add_pattern(terminal, self.steps.iter().copied())
    }
}

/// Parses `pattern` and inserts it, returning the terminal node
pub fn compile_wildcard<T>(
    automaton: &mut Automaton<char, T>,
    pattern: &str,
    terminal: T,
) -> Option<NodeId>
where
    T: Eq + Hash + Clone,
{
    WildcardPattern::parse(pattern).map(|p| p.insert_into(automaton, terminal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked(automaton: &Automaton<char, bool>, path: &str) -> bool {
        let chars: Vec<char> = path.chars().collect();
        automaton.accepts(&chars, &true)
    }

    fn build(patterns: &[&str]) -> Automaton<char, bool> {
        let mut automaton = Automaton::new();
        for pattern in patterns {
            compile_wildcard(&mut automaton, pattern, true);
        }
        automaton
    }

    #[test]
    fn test_parse_marks_star_predecessor() {
        let pattern = WildcardPattern::parse("/h*ray").unwrap();
        assert_eq!(pattern.len(), 5);
        assert_eq!(pattern.steps[1], ('h', Fallback::Itself));
        assert_eq!(pattern.steps[2], ('r', Fallback::Root));
    }

    #[test]
    fn test_parse_unanchored_end_absorbs() {
        let pattern = WildcardPattern::parse("/jerk").unwrap();
        assert!(!pattern.is_anchored());
        assert_eq!(pattern.steps.last(), Some(&('k', Fallback::Itself)));
    }

    #[test]
    fn test_parse_anchored_end_resets() {
        let pattern = WildcardPattern::parse("/daylight/$").unwrap();
        assert!(pattern.is_anchored());
        assert_eq!(pattern.steps.last(), Some(&('/', Fallback::Root)));
    }

    #[test]
    fn test_parse_empty_patterns() {
        assert!(WildcardPattern::parse("").is_none());
        assert!(WildcardPattern::parse("$").is_none());
        assert!(WildcardPattern::parse("**").is_none());
    }

    #[test]
    fn test_reference_pattern_set() {
        let automaton = build(&["/data/*", "/daylight/$", "/jerk", "/h*ray.html$"]);

        assert!(blocked(&automaton, "/data/hooray.html"));
        assert!(blocked(&automaton, "/hooray.html"));
        assert!(blocked(&automaton, "/jerk"));
        assert!(!blocked(&automaton, "/daylight/loafo.html"));
        assert!(blocked(&automaton, "/daylight/"));
        assert!(!blocked(&automaton, "/index.html"));
        assert!(!blocked(&automaton, "/"));
    }

    #[test]
    fn test_prefix_boundary() {
        let automaton = build(&["/data/"]);
        assert!(!blocked(&automaton, "/data"));
        assert!(blocked(&automaton, "/data/"));
        assert!(blocked(&automaton, "/data/x/y"));
    }

    #[test]
    fn test_anchored_wildcard_requires_exact_suffix() {
        let automaton = build(&["/h*ray.html$"]);
        assert!(blocked(&automaton, "/hray.html"));
        assert!(blocked(&automaton, "/hiphooray.html"));
        assert!(!blocked(&automaton, "/hooray.html.bak"));
    }

    #[test]
    fn test_prefix_rule_survives_longer_shared_pattern() {
        let automaton = build(&["/a", "/abc$"]);
        assert!(blocked(&automaton, "/abx"));
        assert!(blocked(&automaton, "/abc"));
        assert!(!blocked(&automaton, "/b"));
    }
}
