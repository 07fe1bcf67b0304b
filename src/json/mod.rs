//! The JSON value model.
//!
//! A [`JsonValue`] is exactly one of six node kinds. Container nodes own their children,
//! so a tree is acyclic by construction. Every node renders to a canonical text form via
//! [`JsonValue::to_text`]:
//!
//! | Kind      | Example text                |
//! |-----------|-----------------------------|
//! | `Null`    | `null`                      |
//! | `Boolean` | `true`                      |
//! | `Number`  | `42`, `0.5`                 |
//! | `String`  | `"say \"hi\""`              |
//! | `Array`   | `[1, "a", null]`            |
//! | `Object`  | `{"a": 1, "b": [true]}`     |
//!
//! Only the quote character is escaped inside strings and keys.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

pub mod infer;
pub mod mapper;
pub mod parse;
pub mod visitor;

pub use infer::{IntoSource, Source, accept_inferred, infer, infer_with};
pub use mapper::{IdentityMapper, Mapper, SuffixMapper};
pub use parse::parse_body;
pub use visitor::Visitor;

/// Errors raised while building or inferring JSON trees.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsonError {
    #[error("duplicate object key `{key}`")]
    DuplicateKey { key: String },

    #[error("number is not finite: {value}")]
    NonFiniteNumber { value: f64 },

    #[error("object keys must be text, found {found}")]
    InvalidKeyType { found: &'static str },

    #[error("unsupported type for JSON conversion: {type_name}")]
    UnsupportedType { type_name: &'static str },
}

/// A node in the JSON model.
///
/// # Examples
///
/// ```
/// use getjson::json::{JsonArray, JsonValue};
///
/// let array = JsonArray::new(vec![JsonValue::from(1), JsonValue::from("a"), JsonValue::Null]);
/// assert_eq!(JsonValue::from(array).to_text(), r#"[1, "a", null]"#);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Boolean(bool),
    Number(JsonNumber),
    String(JsonString),
    Array(JsonArray),
    Object(JsonObject),
}

impl JsonValue {
    /// Serializes this value to its canonical JSON text.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Walks this tree in pre-order, calling the visitor once per node.
    ///
    /// Containers are visited before their children; children are visited in container
    /// order.
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            Self::Null => visitor.visit_null(),
            Self::Boolean(b) => visitor.visit_boolean(*b),
            Self::Number(n) => visitor.visit_number(n),
            Self::String(s) => visitor.visit_string(s),
            Self::Array(array) => {
                visitor.visit_array(array);
                for element in array.iter() {
                    element.accept(visitor);
                }
            }
            Self::Object(object) => {
                visitor.visit_object(object);
                for value in object.values() {
                    value.accept(visitor);
                }
            }
        }
    }

    /// Returns the node kind name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&JsonNumber> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&JsonArray> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => n.fmt(f),
            Self::String(s) => s.fmt(f),
            Self::Array(array) => array.fmt(f),
            Self::Object(object) => object.fmt(f),
        }
    }
}

impl From<bool> for JsonValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for JsonValue {
    fn from(value: i32) -> Self {
        Self::Number(JsonNumber::from(i64::from(value)))
    }
}

impl From<i64> for JsonValue {
    fn from(value: i64) -> Self {
        Self::Number(JsonNumber::from(value))
    }
}

impl From<&str> for JsonValue {
    fn from(value: &str) -> Self {
        Self::String(JsonString::new(value))
    }
}

impl From<String> for JsonValue {
    fn from(value: String) -> Self {
        Self::String(JsonString::new(value))
    }
}

impl From<JsonNumber> for JsonValue {
    fn from(value: JsonNumber) -> Self {
        Self::Number(value)
    }
}

impl From<JsonString> for JsonValue {
    fn from(value: JsonString) -> Self {
        Self::String(value)
    }
}

impl From<JsonArray> for JsonValue {
    fn from(value: JsonArray) -> Self {
        Self::Array(value)
    }
}

impl From<JsonObject> for JsonValue {
    fn from(value: JsonObject) -> Self {
        Self::Object(value)
    }
}

// Integers keep full 64-bit precision; everything else is a finite double.
#[derive(Debug, Clone, Copy)]
enum Repr {
    Int(i64),
    Float(f64),
}

/// A finite JSON number.
///
/// Integral values render without a fractional part (`4.0` renders as `4`); other values
/// render as plain decimals, never in scientific notation.
#[derive(Debug, Clone, Copy)]
pub struct JsonNumber(Repr);

impl JsonNumber {
    /// Creates a number from a double.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError::NonFiniteNumber`] for NaN and the infinities.
    pub fn from_f64(value: f64) -> Result<Self, JsonError> {
        if value.is_finite() {
            Ok(Self(Repr::Float(value)))
        } else {
            Err(JsonError::NonFiniteNumber { value })
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self.0 {
            Repr::Int(i) => i as f64,
            Repr::Float(f) => f,
        }
    }

    /// Returns the value as an `i64` when it has no fractional part and fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            Repr::Int(i) => Some(i),
            Repr::Float(f) if f.fract() == 0.0 && in_i64_range(f) => Some(f as i64),
            Repr::Float(_) => None,
        }
    }

    /// Truncates toward zero, saturating at the `i64` bounds.
    pub fn truncate(&self) -> i64 {
        match self.0 {
            Repr::Int(i) => i,
            Repr::Float(f) => f as i64,
        }
    }

    pub fn is_integral(&self) -> bool {
        match self.0 {
            Repr::Int(_) => true,
            Repr::Float(f) => f.fract() == 0.0,
        }
    }
}

fn in_i64_range(f: f64) -> bool {
    // 2^63 is exactly representable; i64::MAX is not.
    f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0
}

impl From<i64> for JsonNumber {
    fn from(value: i64) -> Self {
        Self(Repr::Int(value))
    }
}

impl From<i32> for JsonNumber {
    fn from(value: i32) -> Self {
        Self(Repr::Int(i64::from(value)))
    }
}

impl TryFrom<f64> for JsonNumber {
    type Error = JsonError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::from_f64(value)
    }
}

impl PartialEq for JsonNumber {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Repr::Int(a), Repr::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl fmt::Display for JsonNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Repr::Int(i) => write!(f, "{i}"),
            Repr::Float(d) if d.fract() == 0.0 && in_i64_range(d) => write!(f, "{}", d as i64),
            // `f64`'s Display never switches to exponent form.
            Repr::Float(d) => write!(f, "{d}"),
        }
    }
}

/// A JSON string node.
///
/// Text building is value-returning: [`append`](Self::append) and
/// [`repeat`](Self::repeat) produce new nodes and leave `self` untouched, so a tree
/// can be shared freely between requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JsonString(String);

impl JsonString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns a new string with `suffix` appended.
    #[must_use]
    pub fn append(&self, suffix: &str) -> Self {
        let mut value = String::with_capacity(self.0.len() + suffix.len());
        value.push_str(&self.0);
        value.push_str(suffix);
        Self(value)
    }

    /// Returns a new string holding this text repeated `times` times.
    #[must_use]
    pub fn repeat(&self, times: usize) -> Self {
        Self(self.0.repeat(times))
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for (i, part) in text.split('"').enumerate() {
        if i > 0 {
            f.write_str("\\\"")?;
        }
        f.write_str(part)?;
    }
    f.write_str("\"")
}

impl fmt::Display for JsonString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_quoted(f, &self.0)
    }
}

/// An ordered sequence of JSON values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonArray(Vec<JsonValue>);

impl JsonArray {
    pub fn new(elements: Vec<JsonValue>) -> Self {
        Self(elements)
    }

    pub fn elements(&self) -> &[JsonValue] {
        &self.0
    }

    pub fn into_elements(self) -> Vec<JsonValue> {
        self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JsonValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new array holding only the elements accepted by `predicate`.
    #[must_use]
    pub fn filter(&self, mut predicate: impl FnMut(&JsonValue) -> bool) -> Self {
        self.0.iter().filter(|v| predicate(v)).cloned().collect()
    }

    /// Returns a new array with `transform` applied to every element.
    #[must_use]
    pub fn map(&self, transform: impl FnMut(&JsonValue) -> JsonValue) -> Self {
        self.0.iter().map(transform).collect()
    }
}

impl FromIterator<JsonValue> for JsonArray {
    fn from_iter<I: IntoIterator<Item = JsonValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a JsonArray {
    type Item = &'a JsonValue;
    type IntoIter = std::slice::Iter<'a, JsonValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for JsonArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            element.fmt(f)?;
        }
        f.write_str("]")
    }
}

/// A JSON object: text keys mapped to values, kept in insertion order.
///
/// Keys are unique. Inserting a key that is already present is rejected with
/// [`JsonError::DuplicateKey`] rather than overwriting the earlier entry.
///
/// # Examples
///
/// ```
/// use getjson::json::{JsonError, JsonObject, JsonValue};
///
/// let mut object = JsonObject::new();
/// object.insert("a", JsonValue::from(1)).unwrap();
/// assert!(matches!(
///     object.insert("a", JsonValue::from(2)),
///     Err(JsonError::DuplicateKey { .. })
/// ));
/// assert_eq!(JsonValue::from(object).to_text(), r#"{"a": 1}"#);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObject {
    entries: Vec<(String, JsonValue)>,
    /// Key to position in `entries`.
    index: HashMap<String, usize>,
}

impl JsonObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an object from `(key, value)` pairs, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError::DuplicateKey`] if two pairs share a key.
    pub fn try_from_entries<K, I>(entries: I) -> Result<Self, JsonError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, JsonValue)>,
    {
        let mut object = Self::new();
        for (key, value) in entries {
            object.insert(key, value)?;
        }
        Ok(object)
    }

    /// Rebuilds an object from entries already known to carry unique keys.
    pub(crate) fn from_unique(entries: Vec<(String, JsonValue)>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
        Self { entries, index }
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`JsonError::DuplicateKey`] if `key` is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) -> Result<(), JsonError> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(JsonError::DuplicateKey { key });
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &JsonValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn into_entries(self) -> Vec<(String, JsonValue)> {
        self.entries
    }

    /// Returns a new object holding only the entries accepted by `predicate`.
    #[must_use]
    pub fn filter(&self, mut predicate: impl FnMut(&str, &JsonValue) -> bool) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .cloned()
            .collect();
        Self::from_unique(entries)
    }
}

impl PartialEq for JsonObject {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Display for JsonObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_quoted(f, key)?;
            f.write_str(": ")?;
            value.fmt(f)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(entries: Vec<(&str, JsonValue)>) -> JsonValue {
        JsonValue::from(JsonObject::try_from_entries(entries).unwrap())
    }

    #[test]
    fn null_and_boolean_text() {
        assert_eq!(JsonValue::Null.to_text(), "null");
        assert_eq!(JsonValue::from(true).to_text(), "true");
        assert_eq!(JsonValue::from(false).to_text(), "false");
    }

    #[test]
    fn integer_number_text() {
        assert_eq!(JsonValue::from(123).to_text(), "123");
        assert_eq!(JsonValue::from(-7_i64).to_text(), "-7");
    }

    #[test]
    fn integral_double_renders_without_fraction() {
        let n = JsonNumber::from_f64(4.0).unwrap();
        assert_eq!(n.to_string(), "4");
        assert_eq!(n.as_i64(), Some(4));
    }

    #[test]
    fn fractional_double_renders_as_decimal() {
        assert_eq!(JsonNumber::from_f64(0.2).unwrap().to_string(), "0.2");
        assert_eq!(JsonNumber::from_f64(-5.75).unwrap().to_string(), "-5.75");
        assert_eq!(JsonNumber::from_f64(0.000001).unwrap().to_string(), "0.000001");
    }

    #[test]
    fn huge_double_has_no_exponent() {
        let text = JsonNumber::from_f64(1e21).unwrap().to_string();
        assert!(!text.contains('e'));
        assert_eq!(text, "1000000000000000000000");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert!(matches!(
            JsonNumber::from_f64(f64::NAN),
            Err(JsonError::NonFiniteNumber { .. })
        ));
        assert!(JsonNumber::try_from(f64::INFINITY).is_err());
        assert!(JsonNumber::try_from(f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(JsonNumber::from(4_i64), JsonNumber::from_f64(4.0).unwrap());
        assert_ne!(JsonNumber::from(4_i64), JsonNumber::from_f64(4.5).unwrap());
    }

    #[test]
    fn truncate_drops_fraction() {
        assert_eq!(JsonNumber::from_f64(5.7).unwrap().truncate(), 5);
        assert_eq!(JsonNumber::from_f64(-2.9).unwrap().truncate(), -2);
    }

    #[test]
    fn string_text_is_quoted() {
        assert_eq!(JsonValue::from("Hello").to_text(), "\"Hello\"");
    }

    #[test]
    fn string_escapes_quotes_only() {
        let s = JsonValue::from("He said \"Hello\"");
        assert_eq!(s.to_text(), "\"He said \\\"Hello\\\"\"");

        let raw = JsonValue::from("a\\b\nc");
        assert_eq!(raw.to_text(), "\"a\\b\nc\"");
    }

    #[test]
    fn string_append_and_repeat_are_pure() {
        let base = JsonString::new("PA");
        assert_eq!(base.append("!").as_str(), "PA!");
        assert_eq!(base.repeat(3).as_str(), "PAPAPA");
        assert_eq!(base.repeat(0).as_str(), "");
        assert_eq!(base.as_str(), "PA");
    }

    #[test]
    fn array_text_uses_comma_space() {
        let array: JsonArray = vec![JsonValue::from("a"), JsonValue::from(1), JsonValue::from(true)]
            .into_iter()
            .collect();
        assert_eq!(JsonValue::from(array).to_text(), r#"["a", 1, true]"#);
        assert_eq!(JsonValue::from(JsonArray::default()).to_text(), "[]");
    }

    #[test]
    fn array_filter_and_map_return_new_arrays() {
        let array = JsonArray::new((1..=5).map(JsonValue::from).collect());
        let even = array.filter(|v| v.as_number().and_then(JsonNumber::as_i64).is_some_and(|i| i % 2 == 0));
        assert_eq!(JsonValue::from(even).to_text(), "[2, 4]");

        let negated = array.map(|v| JsonValue::from(-v.as_number().unwrap().truncate()));
        assert_eq!(JsonValue::from(negated).to_text(), "[-1, -2, -3, -4, -5]");
        assert_eq!(array.len(), 5);
    }

    #[test]
    fn object_text_preserves_insertion_order() {
        let value = object(vec![
            ("z", JsonValue::from(1)),
            ("a", JsonValue::from("x")),
            ("m", JsonValue::Null),
        ]);
        assert_eq!(value.to_text(), r#"{"z": 1, "a": "x", "m": null}"#);
        assert_eq!(JsonValue::from(JsonObject::new()).to_text(), "{}");
    }

    #[test]
    fn object_key_quotes_are_escaped() {
        let value = object(vec![("say \"x\"", JsonValue::from(1))]);
        assert_eq!(value.to_text(), r#"{"say \"x\"": 1}"#);
    }

    #[test]
    fn duplicate_object_keys_are_rejected() {
        let err = JsonObject::try_from_entries(vec![
            ("dup", JsonValue::from(1)),
            ("dup", JsonValue::from(2)),
        ])
        .unwrap_err();
        assert_eq!(err, JsonError::DuplicateKey { key: "dup".into() });
    }

    #[test]
    fn object_filter_keeps_matching_entries() {
        let value = object(vec![
            ("keep", JsonValue::from(1)),
            ("drop", JsonValue::from(2)),
        ]);
        let filtered = value.as_object().unwrap().filter(|k, _| k == "keep");
        assert_eq!(filtered.get("keep"), Some(&JsonValue::from(1)));
        assert!(!filtered.contains_key("drop"));
        assert_eq!(JsonValue::from(filtered).to_text(), r#"{"keep": 1}"#);
    }

    #[test]
    fn object_lookup_follows_insertion() {
        let mut object = JsonObject::new();
        for i in 0..1_000_i64 {
            object.insert(format!("k{i}"), JsonValue::from(i)).unwrap();
        }
        assert_eq!(object.get("k0"), Some(&JsonValue::from(0)));
        assert_eq!(object.get("k999"), Some(&JsonValue::from(999)));
        assert_eq!(object.keys().nth(500), Some("k500"));
        assert!(object.insert("k42", JsonValue::Null).is_err());
        assert_eq!(object.len(), 1_000);
    }

    #[test]
    fn nested_tree_text() {
        let value = object(vec![
            ("num", JsonValue::from(10)),
            ("arr", JsonValue::from(JsonArray::new(vec![JsonValue::from(1), JsonValue::from(2)]))),
            ("obj", object(vec![("key", JsonValue::from(false))])),
        ]);
        assert_eq!(
            value.to_text(),
            r#"{"num": 10, "arr": [1, 2], "obj": {"key": false}}"#
        );
    }
}
