//! Protocol classification rules.
//!
//! # Responsibilities
//! - Recognise a protocol from the first bytes a client sends
//! - Report when more bytes are needed before deciding
//! - Order rules by priority, with one catch-all fallback last
//!
//! # Design Decisions
//! - Matchers are pure functions over a byte prefix; no I/O
//! - A `NeedMore` from a higher-priority rule defers lower-priority matches
//! - At the peek bound `NeedMore` is treated as `NoMatch`

/// Outcome of matching a byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Match,
    NoMatch,
    /// The prefix is consistent with this protocol but too short to decide.
    NeedMore,
}

/// Trait for matching connection prefixes against a protocol.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Classify the bytes received so far.
    fn matches(&self, prefix: &[u8]) -> MatchResult;

    /// Number of bytes needed to reach a definite answer.
    fn required_len(&self) -> usize;

    /// Whether this matcher accepts everything.
    fn is_catch_all(&self) -> bool {
        false
    }
}

/// Matches an exact leading byte sequence.
#[derive(Debug, Clone)]
pub struct PrefaceMatcher {
    preface: &'static [u8],
}

impl PrefaceMatcher {
    pub fn new(preface: &'static [u8]) -> Self {
        Self { preface }
    }
}

impl Matcher for PrefaceMatcher {
    fn matches(&self, prefix: &[u8]) -> MatchResult {
        match_literal(self.preface, prefix)
    }

    fn required_len(&self) -> usize {
        self.preface.len()
    }
}

/// Matches every connection. Used as the fallback rule.
#[derive(Debug, Clone, Default)]
pub struct AnyMatcher;

impl Matcher for AnyMatcher {
    fn matches(&self, _prefix: &[u8]) -> MatchResult {
        MatchResult::Match
    }

    fn required_len(&self) -> usize {
        0
    }

    fn is_catch_all(&self) -> bool {
        true
    }
}

fn match_literal(expected: &[u8], prefix: &[u8]) -> MatchResult {
    let n = expected.len().min(prefix.len());
    if expected[..n] != prefix[..n] {
        MatchResult::NoMatch
    } else if prefix.len() >= expected.len() {
        MatchResult::Match
    } else {
        MatchResult::NeedMore
    }
}

/// A named classification rule.
#[derive(Debug)]
pub struct Rule {
    name: &'static str,
    matcher: Box<dyn Matcher>,
}

impl Rule {
    pub fn new(name: &'static str, matcher: impl Matcher + 'static) -> Self {
        Self {
            name,
            matcher: Box::new(matcher),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn matcher(&self) -> &dyn Matcher {
        self.matcher.as_ref()
    }
}

/// Pick the rule for `prefix`, or `None` if more bytes are needed.
///
/// `exhausted` means no more bytes will be read, so pending rules are skipped.
pub fn classify(rules: &[Rule], prefix: &[u8], exhausted: bool) -> Option<usize> {
    for (index, rule) in rules.iter().enumerate() {
        match rule.matcher.matches(prefix) {
            MatchResult::Match => return Some(index),
            MatchResult::NeedMore if !exhausted => return None,
            MatchResult::NeedMore | MatchResult::NoMatch => {}
        }
    }
    None
}
