//! Route path patterns.
//!
//! A pattern is a sequence of segments, each either a literal or a `{name}` placeholder:
//!
//! | Pattern               | Example match          | Captured            |
//! |-----------------------|------------------------|---------------------|
//! | `/api/odd`            | `/api/odd`             | *(none)*            |
//! | `/api/path/{pathVar}` | `/api/path/hello`      | `pathVar → "hello"` |
//!
//! Empty segments are dropped on both sides, so `/api//odd/` and `api/odd` are the
//! same path. A placeholder matches exactly one non-empty segment. Literals compare
//! against the percent-decoded request segment, so `/api/%6Fdd` reaches `/api/odd`.

use std::fmt;

use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Reasons a pattern string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("segment `{0}` has unbalanced or misplaced braces")]
    MalformedSegment(String),

    #[error("placeholder `{{}}` has no name")]
    EmptyPlaceholder,

    #[error("placeholder `{{{0}}}` appears more than once")]
    DuplicatePlaceholder(String),
}

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A compiled route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a pattern string.
    ///
    /// # Errors
    ///
    /// - [`PatternError::MalformedSegment`]: a segment has a brace that is not the
    ///   opening or closing brace of a whole-segment placeholder.
    /// - [`PatternError::EmptyPlaceholder`]: a segment is exactly `{}`.
    /// - [`PatternError::DuplicatePlaceholder`]: two placeholders share a name.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();

        for raw in split_path(pattern) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some("") => return Err(PatternError::EmptyPlaceholder),
                Some(name) if !name.contains(['{', '}']) => {
                    if segments
                        .iter()
                        .any(|s| matches!(s, Segment::Placeholder(n) if n == name))
                    {
                        return Err(PatternError::DuplicatePlaceholder(name.to_owned()));
                    }
                    Segment::Placeholder(name.to_owned())
                }
                _ if raw.contains(['{', '}']) => {
                    return Err(PatternError::MalformedSegment(raw.to_owned()));
                }
                _ => Segment::Literal(raw.to_owned()),
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Compiles the concatenation of a base path and a handler path.
    ///
    /// # Errors
    ///
    /// See [`PathPattern::parse`].
    pub fn join(base: &str, path: &str) -> Result<Self, PatternError> {
        Self::parse(&format!("{base}/{path}"))
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns `true` if the pattern declares a placeholder called `name`.
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(n) if n == name))
    }

    /// Matches already-split request segments, returning the raw (still encoded)
    /// placeholder captures on success.
    pub fn matches<'p, 'r>(&'p self, path: &[&'r str]) -> Option<Vec<(&'p str, &'r str)>> {
        if self.segments.len() != path.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (segment, actual) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) => {
                    if !literal_matches(literal, actual) {
                        return None;
                    }
                }
                Segment::Placeholder(name) => captures.push((name.as_str(), *actual)),
            }
        }

        Some(captures)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => write!(f, "/{s}")?,
                Segment::Placeholder(name) => write!(f, "/{{{name}}}")?,
            }
        }
        Ok(())
    }
}

fn literal_matches(literal: &str, actual: &str) -> bool {
    if literal == actual {
        return true;
    }
    actual.contains('%')
        && percent_decode_str(actual)
            .decode_utf8()
            .is_ok_and(|decoded| decoded == literal)
}

/// Splits a request path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
