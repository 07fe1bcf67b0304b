//! Double-dispatch traversal over a [`JsonValue`](super::JsonValue) tree.
//!
//! [`JsonValue::accept`](super::JsonValue::accept) drives the walk in pre-order: a
//! container is handed to the visitor before any of its children. Implementors supply
//! all six handlers; a handler with an empty body is how a visitor targets a subset of
//! kinds.

use super::{JsonArray, JsonNumber, JsonObject, JsonString};

/// Per-kind callbacks invoked during a tree walk.
pub trait Visitor {
    fn visit_object(&mut self, object: &JsonObject);

    fn visit_array(&mut self, array: &JsonArray);

    fn visit_string(&mut self, string: &JsonString);

    fn visit_number(&mut self, number: &JsonNumber);

    fn visit_boolean(&mut self, value: bool);

    fn visit_null(&mut self);
}
