//! Interning of colon separated event names.
//!
//! Every distinct prefix of a registered name (`a`, `a:b`, `a:b:c`) owns a
//! [`Token`]. Tokens form a tree mirroring the names, and a branch is
//! reclaimed as soon as no listener remains anywhere under it, so one-off
//! dynamic names do not accumulate.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use std::collections::HashMap;

use backbone_core::{Error, InvalidName};

/// The only segment value reserved for the wildcard.
pub const WILDCARD: &str = "*";

const SEPARATOR: char = ':';

/// Interned identifier of one namespace path.
///
/// Tokens are never reused: a path reclaimed and registered again gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u64);

impl Token {
    /// The root wildcard token, matching every emission.
    pub const WILDCARD: Self = Self(0);

    /// Returns `true` for [`Token::WILDCARD`].
    #[must_use]
    pub const fn is_wildcard(self) -> bool {
        self.0 == 0
    }
}

/// A validated event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventName(String);

impl EventName {
    /// Validates and normalizes `raw`.
    ///
    /// Surrounding whitespace is trimmed. The name must be non-empty, contain
    /// no whitespace and no empty segment, and may only be `*` as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEventName`] describing the first violation found.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let name = raw.trim();
        let reason = if name.is_empty() {
            Some(InvalidName::Empty)
        } else if name.chars().any(char::is_whitespace) {
            Some(InvalidName::Whitespace)
        } else if name == WILDCARD {
            None
        } else if name.split(SEPARATOR).any(str::is_empty) {
            Some(InvalidName::EmptySegment)
        } else if name.split(SEPARATOR).any(|segment| segment == WILDCARD) {
            Some(InvalidName::MisplacedWildcard)
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::invalid_name(raw, reason)),
            None => Ok(Self(name.to_string())),
        }
    }

    /// The normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` when the name is the lone wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD
    }

    /// Iterates the segments, none for the wildcard.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        let name = if self.is_wildcard() { "" } else { self.0.as_str() };
        name.split(SEPARATOR).filter(|segment| !segment.is_empty())
    }

    fn depth(&self) -> usize {
        self.segments().count()
    }
}

impl core::fmt::Display for EventName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct Entry {
    segment: String,
    parent: Option<Token>,
    children: HashMap<String, Token>,
}

/// The interning tree of namespace tokens.
#[derive(Debug)]
pub struct NamespaceRegistry {
    entries: HashMap<Token, Entry>,
    roots: HashMap<String, Token>,
    next: u64,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceRegistry {
    /// Creates a registry holding only the wildcard token.
    #[must_use]
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            Token::WILDCARD,
            Entry {
                segment: WILDCARD.to_string(),
                parent: None,
                children: HashMap::new(),
            },
        );
        Self {
            entries,
            roots: HashMap::new(),
            next: 1,
        }
    }

    /// Number of live tokens, the wildcard included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when only the wildcard token exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    fn child(&self, parent: Option<Token>, segment: &str) -> Option<Token> {
        match parent {
            None => self.roots.get(segment).copied(),
            Some(parent) => self
                .entries
                .get(&parent)
                .and_then(|entry| entry.children.get(segment).copied()),
        }
    }

    /// Walks `name` through existing tokens only.
    ///
    /// Returns the tokens of every existing prefix, most specific first,
    /// followed by the wildcard. The walk stops at the first missing prefix.
    #[must_use]
    pub fn resolve_existing(&self, name: &EventName) -> Vec<Token> {
        let mut chain = Vec::new();
        let mut parent = None;
        for segment in name.segments() {
            match self.child(parent, segment) {
                Some(token) => {
                    chain.push(token);
                    parent = Some(token);
                }
                None => break,
            }
        }
        chain.reverse();
        chain.push(Token::WILDCARD);
        chain
    }

    /// Walks `name`, creating every missing prefix token on the way.
    ///
    /// The returned chain has the same shape as [`Self::resolve_existing`]
    /// and always covers the full name.
    pub fn resolve_or_create(&mut self, name: &EventName) -> Vec<Token> {
        let mut chain = Vec::new();
        let mut parent = None;
        for segment in name.segments() {
            let token = match self.child(parent, segment) {
                Some(token) => token,
                None => self.insert(parent, segment),
            };
            chain.push(token);
            parent = Some(token);
        }
        chain.reverse();
        chain.push(Token::WILDCARD);
        chain
    }

    fn insert(&mut self, parent: Option<Token>, segment: &str) -> Token {
        let token = Token(self.next);
        self.next += 1;
        self.entries.insert(
            token,
            Entry {
                segment: segment.to_string(),
                parent,
                children: HashMap::new(),
            },
        );
        match parent {
            None => {
                self.roots.insert(segment.to_string(), token);
            }
            Some(parent) => {
                if let Some(entry) = self.entries.get_mut(&parent) {
                    entry.children.insert(segment.to_string(), token);
                }
            }
        }
        tracing::trace!(?token, segment, "namespace token created");
        token
    }

    /// The token of exactly `name`, if it exists.
    #[must_use]
    pub fn lookup(&self, name: &EventName) -> Option<Token> {
        if name.is_wildcard() {
            return Some(Token::WILDCARD);
        }
        let chain = self.resolve_existing(name);
        (chain.len() == name.depth() + 1).then(|| chain[0])
    }

    /// Tokens an emission of `name` reaches: the exact token when it exists,
    /// then the wildcard.
    ///
    /// Listeners on a shorter prefix are not matched.
    #[must_use]
    pub fn matching(&self, name: &EventName) -> Vec<Token> {
        match self.lookup(name) {
            Some(token) if !token.is_wildcard() => alloc::vec![token, Token::WILDCARD],
            _ => alloc::vec![Token::WILDCARD],
        }
    }

    /// Reconstructs the full name of `token`, `"*"` for the wildcard.
    #[must_use]
    pub fn path_of(&self, token: Token) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = Some(token);
        while let Some(token) = current {
            let entry = self.entries.get(&token)?;
            segments.push(entry.segment.as_str());
            current = entry.parent;
        }
        segments.reverse();
        Some(segments.join(":"))
    }

    /// Returns `true` when `token` is still live.
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        self.entries.contains_key(&token)
    }

    /// Discards `token` and then its ancestors for as long as they have
    /// neither children nor listeners according to `in_use`.
    ///
    /// Returns the number of tokens discarded. The wildcard is never discarded.
    pub fn reclaim(&mut self, token: Token, in_use: impl Fn(Token) -> bool) -> usize {
        let mut discarded = 0;
        let mut current = Some(token);
        while let Some(token) = current {
            if token.is_wildcard() || in_use(token) {
                break;
            }
            match self.entries.get(&token) {
                Some(entry) if entry.children.is_empty() => {}
                _ => break,
            }
            let Some(entry) = self.entries.remove(&token) else {
                break;
            };
            match entry.parent {
                None => {
                    self.roots.remove(&entry.segment);
                }
                Some(parent) => {
                    if let Some(parent) = self.entries.get_mut(&parent) {
                        parent.children.remove(&entry.segment);
                    }
                }
            }
            tracing::trace!(?token, segment = %entry.segment, "namespace token reclaimed");
            discarded += 1;
            current = entry.parent;
        }
        discarded
    }

    /// Drops every token except the wildcard.
    pub fn clear(&mut self) {
        *self = Self {
            next: self.next,
            ..Self::new()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> EventName {
        EventName::parse(raw).unwrap()
    }

    #[test]
    fn rejects_malformed_names() {
        let reason = |raw: &str| match EventName::parse(raw) {
            Err(Error::InvalidEventName { reason, .. }) => Some(reason),
            _ => None,
        };
        assert_eq!(reason("   "), Some(InvalidName::Empty));
        assert_eq!(reason("a::b"), Some(InvalidName::EmptySegment));
        assert_eq!(reason(":a"), Some(InvalidName::EmptySegment));
        assert_eq!(reason("a:"), Some(InvalidName::EmptySegment));
        assert_eq!(reason("a b"), Some(InvalidName::Whitespace));
        assert_eq!(reason("a:*"), Some(InvalidName::MisplacedWildcard));
        assert_eq!(reason("*:a"), Some(InvalidName::MisplacedWildcard));
        assert_eq!(reason("  a:b  "), None);
        assert_eq!(reason("*"), None);
    }

    #[test]
    fn tokens_are_interned_per_prefix() {
        let mut registry = NamespaceRegistry::new();
        let abc = registry.resolve_or_create(&name("a:b:c"));
        assert_eq!(abc.len(), 4);
        assert_eq!(abc[3], Token::WILDCARD);

        let ab = registry.resolve_or_create(&name("a:b"));
        assert_eq!(ab, abc[1..].to_vec());
        assert_eq!(registry.len(), 4);

        let abd = registry.resolve_or_create(&name("a:b:d"));
        assert_ne!(abd[0], abc[0]);
        assert_eq!(abd[1], abc[1]);
    }

    #[test]
    fn resolve_existing_stops_at_first_missing_prefix() {
        let mut registry = NamespaceRegistry::new();
        let ab = registry.resolve_or_create(&name("a:b"));
        let chain = registry.resolve_existing(&name("a:b:c:d"));
        assert_eq!(chain, ab);
        assert_eq!(registry.resolve_existing(&name("x:a")), [Token::WILDCARD]);
        assert_eq!(registry.lookup(&name("a:b:c")), None);
        assert_eq!(registry.lookup(&name("a:b")), Some(ab[0]));
    }

    #[test]
    fn matching_only_includes_exact_token_and_wildcard() {
        let mut registry = NamespaceRegistry::new();
        let ab = registry.resolve_or_create(&name("a:b"));
        assert_eq!(registry.matching(&name("a:b:c")), [Token::WILDCARD]);
        assert_eq!(registry.matching(&name("a:b")), [ab[0], Token::WILDCARD]);
        assert_eq!(registry.matching(&name("*")), [Token::WILDCARD]);
    }

    #[test]
    fn path_of_rebuilds_full_name() {
        let mut registry = NamespaceRegistry::new();
        let chain = registry.resolve_or_create(&name("chat:message:sent"));
        assert_eq!(registry.path_of(chain[0]).as_deref(), Some("chat:message:sent"));
        assert_eq!(registry.path_of(chain[2]).as_deref(), Some("chat"));
        assert_eq!(registry.path_of(Token::WILDCARD).as_deref(), Some("*"));
    }

    #[test]
    fn reclaim_walks_up_until_a_used_ancestor() {
        let mut registry = NamespaceRegistry::new();
        let abc = registry.resolve_or_create(&name("a:b:c"));
        let ab_token = abc[1];

        let discarded = registry.reclaim(abc[0], |token| token == ab_token);
        assert_eq!(discarded, 1);
        assert!(registry.contains(ab_token));
        assert_eq!(registry.lookup(&name("a:b:c")), None);

        let discarded = registry.reclaim(ab_token, |_| false);
        assert_eq!(discarded, 2);
        assert!(registry.is_empty());
        assert_eq!(registry.resolve_existing(&name("a:b:c")), [Token::WILDCARD]);
    }

    #[test]
    fn reclaim_keeps_branches_with_children() {
        let mut registry = NamespaceRegistry::new();
        let abc = registry.resolve_or_create(&name("a:b:c"));
        assert_eq!(registry.reclaim(abc[1], |_| false), 0);
        assert!(registry.contains(abc[1]));
    }

    #[test]
    fn tokens_are_not_reused_after_reclaim() {
        let mut registry = NamespaceRegistry::new();
        let first = registry.resolve_or_create(&name("a"))[0];
        registry.reclaim(first, |_| false);
        let second = registry.resolve_or_create(&name("a"))[0];
        assert_ne!(first, second);
    }
}
