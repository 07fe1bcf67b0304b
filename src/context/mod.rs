//! Per-request handler arguments.
//!
//! The dispatcher binds every declared parameter of a route, in declaration order, into
//! an [`Args`] set and hands it to the handler. Handlers read their inputs back by name
//! through the typed accessors, which fail with an [`ArgError`] on a name or type
//! mismatch.

use std::fmt;

use thiserror::Error;

use crate::json::JsonValue;

/// Errors raised when a handler reads an argument it was not given.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgError {
    #[error("no argument named `{name}`")]
    Missing { name: String },

    #[error("argument `{name}` is {found}, not {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// One bound argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Double(f64),
    Bool(bool),
    Text(String),
    Json(JsonValue),
}

impl Arg {
    /// Returns the name of the value's type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
            Self::Json(v) => v.fmt(f),
        }
    }
}

/// Named arguments bound for one handler invocation, in declaration order.
///
/// # Examples
///
/// ```
/// use getjson::context::{Arg, Args};
///
/// let args = Args::new()
///     .with("n", Arg::Int(3))
///     .with("text", Arg::Text("PA".into()));
///
/// assert_eq!(args.int("n").unwrap(), 3);
/// assert_eq!(args.text("text").unwrap(), "PA");
/// assert!(args.bool("n").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    entries: Vec<(String, Arg)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, arg: Arg) -> Self {
        self.insert(name, arg);
        self
    }

    /// Appends an argument. A later argument never shadows an earlier one of the same
    /// name.
    pub fn insert(&mut self, name: impl Into<String>, arg: Arg) {
        self.entries.push((name.into(), arg));
    }

    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, arg)| arg)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.entries.iter().map(|(n, arg)| (n.as_str(), arg))
    }

    fn require(&self, name: &str) -> Result<&Arg, ArgError> {
        self.get(name).ok_or_else(|| ArgError::Missing {
            name: name.to_owned(),
        })
    }

    fn mismatch(name: &str, expected: &'static str, found: &Arg) -> ArgError {
        ArgError::WrongType {
            name: name.to_owned(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ArgError> {
        match self.require(name)? {
            Arg::Int(i) => Ok(*i),
            other => Err(Self::mismatch(name, "int", other)),
        }
    }

    pub fn double(&self, name: &str) -> Result<f64, ArgError> {
        match self.require(name)? {
            Arg::Double(d) => Ok(*d),
            other => Err(Self::mismatch(name, "double", other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, ArgError> {
        match self.require(name)? {
            Arg::Bool(b) => Ok(*b),
            other => Err(Self::mismatch(name, "bool", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, ArgError> {
        match self.require(name)? {
            Arg::Text(s) => Ok(s),
            other => Err(Self::mismatch(name, "text", other)),
        }
    }

    /// Returns a parsed request body argument.
    pub fn json(&self, name: &str) -> Result<&JsonValue, ArgError> {
        match self.require(name)? {
            Arg::Json(v) => Ok(v),
            other => Err(Self::mismatch(name, "json", other)),
        }
    }
}
