//! Pattern matching for table selection and ordering
//!
//! Compiled, case-insensitive matching over qualified table names. Supports
//! glob syntax (`*`, `?`) converted to anchored regular expressions, and raw
//! regex syntax for connector configurations that carry regex lists.

use regex::Regex;

/// Pattern syntax type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatternSyntax {
    /// Glob syntax: `*` matches any chars, `?` matches a single char
    #[default]
    Glob,
    /// Regular expression syntax
    Regex,
}

/// Error type for pattern operations
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("empty pattern")]
    EmptyPattern,
}

/// A compiled pattern matcher
///
/// Pre-compiles the pattern once for repeated matching against table names.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pattern: String,
    regex: Regex,
    is_wildcard: bool,
}

impl PatternMatcher {
    /// Create a matcher from a glob pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        Self::with_syntax(pattern, PatternSyntax::Glob)
    }

    /// Create a matcher with explicit syntax.
    pub fn with_syntax(pattern: &str, syntax: PatternSyntax) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }

        let is_wildcard = pattern == "*" || pattern == ".*" || pattern == "^.*$";

        let regex_pattern = match syntax {
            PatternSyntax::Glob => glob_to_regex(pattern),
            PatternSyntax::Regex => pattern.to_string(),
        };

        let regex = regex::RegexBuilder::new(&regex_pattern)
            .case_insensitive(true)
            .build()?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            is_wildcard,
        })
    }

    /// Check if text matches the pattern.
    #[inline]
    pub fn matches(&self, text: &str) -> bool {
        if self.is_wildcard {
            return true;
        }
        self.regex.is_match(text)
    }

    /// Check if a qualified name matches the pattern.
    ///
    /// Matches against the full qualified name and against the bare table
    /// name, so unqualified patterns keep working.
    pub fn matches_qualified(&self, qualified: &str, table: &str) -> bool {
        if self.is_wildcard {
            return true;
        }
        self.regex.is_match(qualified) || self.regex.is_match(table)
    }

    /// Get the original pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check if this is a wildcard pattern.
    pub fn is_wildcard(&self) -> bool {
        self.is_wildcard
    }
}

/// A set of patterns for batch matching
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<PatternMatcher>,
    has_wildcard: bool,
}

impl PatternSet {
    /// Create an empty pattern set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pattern set from a list of glob patterns.
    pub fn from_patterns(patterns: &[String]) -> Result<Self, PatternError> {
        let mut set = Self::new();
        for pattern in patterns {
            set.add(pattern)?;
        }
        Ok(set)
    }

    /// Add a glob pattern to the set.
    pub fn add(&mut self, pattern: &str) -> Result<(), PatternError> {
        let matcher = PatternMatcher::new(pattern)?;
        if matcher.is_wildcard {
            self.has_wildcard = true;
        }
        self.patterns.push(matcher);
        Ok(())
    }

    /// Check if text matches any pattern in the set.
    #[inline]
    pub fn matches(&self, text: &str) -> bool {
        if self.has_wildcard {
            return true;
        }
        self.patterns.iter().any(|p| p.matches(text))
    }

    /// Check if a qualified name matches any pattern in the set.
    pub fn matches_qualified(&self, qualified: &str, table: &str) -> bool {
        if self.has_wildcard {
            return true;
        }
        self.patterns
            .iter()
            .any(|p| p.matches_qualified(qualified, table))
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Get the number of patterns in the set.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Iterate over the patterns.
    pub fn iter(&self) -> impl Iterator<Item = &PatternMatcher> {
        self.patterns.iter()
    }
}

/// Convert a glob pattern to an anchored regex.
///
/// Escapes special regex characters and converts `*` to `.*`, `?` to `.`.
fn glob_to_regex(pattern: &str) -> String {
    let escaped = regex::escape(pattern);
    let regex_pattern = escaped.replace(r"\*", ".*").replace(r"\?", ".");
    format!("^{}$", regex_pattern)
}
