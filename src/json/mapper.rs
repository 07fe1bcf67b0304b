//! Bottom-up, structure-preserving rewrites of a [`JsonValue`] tree.
//!
//! [`Mapper::map`] rebuilds containers from their already-mapped children and only then
//! calls the container hook, so an object or array hook always observes transformed
//! children. Every hook defaults to the identity; implementors override just the kinds
//! they care about and the recursion in [`Mapper::map`] carries the override into every
//! nested container.
//!
//! ```
//! use getjson::json::{JsonString, JsonValue, Mapper};
//!
//! struct Shout;
//!
//! impl Mapper for Shout {
//!     fn transform_string(&self, string: JsonString) -> JsonString {
//!         JsonString::new(string.as_str().to_uppercase())
//!     }
//! }
//!
//! let value = JsonValue::from(getjson::json::JsonArray::new(vec![JsonValue::from("hi")]));
//! assert_eq!(Shout.map(value).to_text(), r#"["HI"]"#);
//! ```

use super::{JsonArray, JsonNumber, JsonObject, JsonString, JsonValue};

/// Per-kind rewrite hooks plus the recursive driver that applies them.
pub trait Mapper {
    /// Rewrites `value` bottom-up.
    ///
    /// Not meant to be overridden: the container recursion lives here so that hooks
    /// compose.
    fn map(&self, value: JsonValue) -> JsonValue {
        match value {
            JsonValue::Object(object) => {
                let entries = object
                    .into_entries()
                    .into_iter()
                    .map(|(key, value)| (key, self.map(value)))
                    .collect();
                JsonValue::Object(self.transform_object(JsonObject::from_unique(entries)))
            }
            JsonValue::Array(array) => {
                let elements = array
                    .into_elements()
                    .into_iter()
                    .map(|element| self.map(element))
                    .collect();
                JsonValue::Array(self.transform_array(elements))
            }
            JsonValue::String(string) => JsonValue::String(self.transform_string(string)),
            JsonValue::Number(number) => JsonValue::Number(self.transform_number(number)),
            JsonValue::Boolean(value) => JsonValue::Boolean(self.transform_boolean(value)),
            JsonValue::Null => self.transform_null(),
        }
    }

    fn transform_object(&self, object: JsonObject) -> JsonObject {
        object
    }

    fn transform_array(&self, array: JsonArray) -> JsonArray {
        array
    }

    fn transform_string(&self, string: JsonString) -> JsonString {
        string
    }

    fn transform_number(&self, number: JsonNumber) -> JsonNumber {
        number
    }

    fn transform_boolean(&self, value: bool) -> bool {
        value
    }

    /// Null may be replaced by any node, e.g. a default value.
    fn transform_null(&self) -> JsonValue {
        JsonValue::Null
    }
}

/// The mapper with every hook left at its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl Mapper for IdentityMapper {}

/// Appends a fixed suffix to every string node, at any depth.
///
/// Object keys are not touched.
#[derive(Debug, Clone)]
pub struct SuffixMapper {
    suffix: String,
}

impl SuffixMapper {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Mapper for SuffixMapper {
    fn transform_string(&self, string: JsonString) -> JsonString {
        string.append(&self.suffix)
    }
}
