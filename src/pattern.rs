// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wildcard invalidation patterns.
//!
//! `*` matches any run of characters (including none), `?` exactly one.
//! Everything else is literal. Matching is anchored to the whole key, so
//! `clients:list:*` never touches `admin:clients:list:A`.
//!
//! The same pattern is rendered as an escaped Redis glob for `SCAN MATCH`.
//! Redis globs match bytes, so a pattern with `?` scans wider and the Redis
//! tier filters the hits through [`InvalidationPattern::is_match`]; both tiers
//! invalidate the same key set either way.
//!
//! ```
//! use resilient_cache::InvalidationPattern;
//!
//! let pattern = InvalidationPattern::new("clients:list:*").unwrap();
//! assert!(pattern.is_match("clients:list:A"));
//! assert!(!pattern.is_match("clients:detail:1"));
//! assert!(!pattern.is_match("admin:clients:list:A"));
//! ```

use regex::Regex;

use crate::error::CacheError;

/// Separator between the namespace and identifier segments of a key.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Namespace segment of a key: everything before the first `:`. `None` for
/// keys without a separator.
#[must_use]
pub fn namespace_of(key: &str) -> Option<&str> {
    key.split_once(NAMESPACE_SEPARATOR).map(|(namespace, _)| namespace)
}

/// A compiled, anchored glob pattern.
#[derive(Debug, Clone)]
pub struct InvalidationPattern {
    raw: String,
    matcher: Regex,
}

impl InvalidationPattern {
    pub fn new(pattern: &str) -> Result<Self, CacheError> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern {
                pattern: String::new(),
                reason: "pattern is empty".into(),
            });
        }

        let mut body = String::with_capacity(pattern.len() * 2);
        for ch in pattern.chars() {
            match ch {
                '*' => body.push_str(".*"),
                '?' => body.push('.'),
                other => body.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }

        // (?s) so wildcards also cover newlines in keys
        let matcher = Regex::new(&format!("^(?s:{body})$")).map_err(|e| {
            CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            matcher,
        })
    }

    /// Pattern matching every key.
    #[must_use]
    pub fn all() -> Self {
        Self {
            raw: "*".into(),
            matcher: Regex::new("^(?s:.*)$").expect("static pattern compiles"),
        }
    }

    /// Pattern matching every key of a namespace (`namespace:*`).
    ///
    /// The namespace is literal; one containing `*` or `?` is rejected since
    /// the glob dialect has no escape for them.
    pub fn namespace(namespace: &str) -> Result<Self, CacheError> {
        if namespace.contains(&['*', '?'][..]) {
            return Err(CacheError::InvalidPattern {
                pattern: namespace.to_string(),
                reason: "namespace must not contain wildcards".into(),
            });
        }
        Self::new(&format!("{namespace}{NAMESPACE_SEPARATOR}*"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn is_match(&self, key: &str) -> bool {
        self.matcher.is_match(key)
    }

    /// True if the pattern contains no wildcard at all.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        !self.raw.contains(&['*', '?'][..])
    }

    /// Render as a Redis glob for `SCAN MATCH`. Characters Redis treats
    /// specially but we treat literally (`[`, `]`, `\`) are escaped.
    ///
    /// Redis matches `?` against one byte, not one character, so `?` is
    /// widened to `*`. The glob then covers a superset of [`is_match`]; unless
    /// [`glob_is_exact`] holds, hits must be narrowed with [`is_match`].
    ///
    /// [`is_match`]: Self::is_match
    /// [`glob_is_exact`]: Self::glob_is_exact
    #[must_use]
    pub fn to_redis_glob(&self) -> String {
        let mut glob = String::with_capacity(self.raw.len());
        for ch in self.raw.chars() {
            match ch {
                '?' => glob.push('*'),
                '[' | ']' | '\\' => {
                    glob.push('\\');
                    glob.push(ch);
                }
                _ => glob.push(ch),
            }
        }
        glob
    }

    /// True if [`to_redis_glob`](Self::to_redis_glob) matches exactly the
    /// keys [`is_match`](Self::is_match) accepts.
    #[must_use]
    pub fn glob_is_exact(&self) -> bool {
        !self.raw.contains('?')
    }
}

impl std::fmt::Display for InvalidationPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Escape a literal string for use as a Redis glob prefix.
#[must_use]
pub fn escape_redis_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_matches_namespace() {
        let pattern = InvalidationPattern::new("clients:list:*").unwrap();
        assert!(pattern.is_match("clients:list:A"));
        assert!(pattern.is_match("clients:list:B"));
        assert!(pattern.is_match("clients:list:"));
        assert!(!pattern.is_match("clients:detail:1"));
    }

    #[test]
    fn test_anchored_both_ends() {
        let pattern = InvalidationPattern::new("list:*").unwrap();
        assert!(!pattern.is_match("clients:list:A"));

        let pattern = InvalidationPattern::new("clients:list").unwrap();
        assert!(pattern.is_match("clients:list"));
        assert!(!pattern.is_match("clients:list:A"));
        assert!(!pattern.is_match("xclients:list"));
    }

    #[test]
    fn test_question_mark_is_single_char() {
        let pattern = InvalidationPattern::new("user:?").unwrap();
        assert!(pattern.is_match("user:1"));
        assert!(!pattern.is_match("user:12"));
        assert!(!pattern.is_match("user:"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = InvalidationPattern::new("report.(2024)+[a]*").unwrap();
        assert!(pattern.is_match("report.(2024)+[a]"));
        assert!(pattern.is_match("report.(2024)+[a]-final"));
        assert!(!pattern.is_match("reportX(2024)+[a]"));
        assert!(!pattern.is_match("report.(20244)[a]"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(matches!(
            InvalidationPattern::new(""),
            Err(CacheError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_all_matches_everything() {
        let all = InvalidationPattern::all();
        assert!(all.is_match(""));
        assert!(all.is_match("anything:at:all"));
        assert!(all.is_match("multi\nline"));
    }

    #[test]
    fn test_namespace_pattern() {
        let pattern = InvalidationPattern::namespace("clients").unwrap();
        assert_eq!(pattern.as_str(), "clients:*");
        assert!(pattern.is_match("clients:list:A"));
        assert!(!pattern.is_match("clientsX:list"));
    }

    #[test]
    fn test_namespace_with_wildcard_is_rejected() {
        assert!(InvalidationPattern::namespace("a*b").is_err());
        assert!(InvalidationPattern::namespace("a?b").is_err());
        // Other glob metacharacters stay literal
        let pattern = InvalidationPattern::namespace("tags[a]").unwrap();
        assert!(pattern.is_match("tags[a]:1"));
        assert!(!pattern.is_match("tagsa:1"));
    }

    #[test]
    fn test_redis_glob_escaping() {
        let pattern = InvalidationPattern::new("a[b]\\c:*").unwrap();
        assert_eq!(pattern.to_redis_glob(), "a\\[b\\]\\\\c:*");
        assert_eq!(escape_redis_glob("app*:"), "app\\*:");
    }

    #[test]
    fn test_question_mark_widens_redis_glob() {
        let pattern = InvalidationPattern::new("user:?").unwrap();
        assert_eq!(pattern.to_redis_glob(), "user:*");
        assert!(!pattern.glob_is_exact());
        assert!(pattern.is_match("user:é"));
        assert!(!pattern.is_match("user:éé"));

        assert!(InvalidationPattern::new("user:*").unwrap().glob_is_exact());
    }

    #[test]
    fn test_is_literal() {
        assert!(InvalidationPattern::new("clients:list:A").unwrap().is_literal());
        assert!(!InvalidationPattern::new("clients:*").unwrap().is_literal());
    }

    #[test]
    fn test_namespace_of() {
        assert_eq!(namespace_of("clients:list:ADMIN"), Some("clients"));
        assert_eq!(namespace_of("plain"), None);
        assert_eq!(namespace_of(":leading"), Some(""));
    }
}
