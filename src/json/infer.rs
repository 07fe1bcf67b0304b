//! Converting in-memory values into [`JsonValue`] trees.
//!
//! Inference works on a closed set of source shapes, captured by [`Source`]. A type
//! opts in by implementing [`IntoSource`]; primitives, options, vectors, maps and the
//! JSON node types are covered here, and plain records and enumerations get an impl from
//! [`impl_record!`](crate::impl_record) and [`impl_enum!`](crate::impl_enum).
//!
//! ```
//! use getjson::{impl_enum, impl_record, json::infer};
//!
//! enum Kind { Test, Project }
//! impl_enum!(Kind { Test, Project });
//!
//! struct Item { name: String, weight: f64, kind: Option<Kind> }
//! impl_record!(Item { name, weight, kind });
//!
//! let item = Item { name: "project".into(), weight: 0.8, kind: Some(Kind::Project) };
//! assert_eq!(
//!     infer(item).unwrap().to_text(),
//!     r#"{"name": "project", "weight": 0.8, "kind": "Project"}"#
//! );
//! ```

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use bytes::Bytes;

use super::{
    IdentityMapper, JsonArray, JsonError, JsonNumber, JsonObject, JsonString, JsonValue, Mapper,
    Visitor,
};

/// The shapes inference understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// An absent value.
    Null,
    /// A tree that is already JSON; passed through as-is.
    Json(JsonValue),
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// An enumeration value, carried by its symbolic name.
    Enum(&'static str),
    Seq(Vec<Source>),
    /// Key/value pairs. Every key must be [`Source::Text`].
    Map(Vec<(Source, Source)>),
    /// A plain record: named fields in declaration order.
    Record {
        type_name: &'static str,
        fields: Vec<(&'static str, Source)>,
    },
    /// A value with no JSON representation.
    Opaque { type_name: &'static str },
}

impl Source {
    /// Marks a value of type `T` as having no JSON representation.
    pub fn opaque<T: ?Sized>() -> Self {
        Self::Opaque {
            type_name: std::any::type_name::<T>(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Json(value) => value.kind(),
            Self::Text(_) => "text",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "boolean",
            Self::Enum(_) => "enum",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "map",
            Self::Record { type_name, .. } | Self::Opaque { type_name } => *type_name,
        }
    }
}

/// Conversion into the [`Source`] shape consumed by [`infer`].
pub trait IntoSource {
    fn into_source(self) -> Source;
}

/// Infers a JSON tree from `value` with the identity mapper.
///
/// # Errors
///
/// See [`infer_with`].
pub fn infer<T: IntoSource>(value: T) -> Result<JsonValue, JsonError> {
    infer_with(value, &IdentityMapper)
}

/// Infers a JSON tree from `value`, then rewrites it once with `mapper`.
///
/// The mapper runs over the finished tree, never per element during construction.
///
/// # Errors
///
/// - [`JsonError::InvalidKeyType`]: a map key is not text.
/// - [`JsonError::UnsupportedType`]: an opaque value was reached.
/// - [`JsonError::NonFiniteNumber`]: a float is NaN or infinite.
/// - [`JsonError::DuplicateKey`]: two map entries share a key.
pub fn infer_with<T, M>(value: T, mapper: &M) -> Result<JsonValue, JsonError>
where
    T: IntoSource,
    M: Mapper + ?Sized,
{
    let raw = build(value.into_source())?;
    Ok(mapper.map(raw))
}

/// Infers a JSON tree from `value` and walks it with `visitor`.
///
/// # Errors
///
/// See [`infer_with`].
pub fn accept_inferred<T, V, M>(value: T, visitor: &mut V, mapper: &M) -> Result<(), JsonError>
where
    T: IntoSource,
    V: Visitor + ?Sized,
    M: Mapper + ?Sized,
{
    infer_with(value, mapper)?.accept(visitor);
    Ok(())
}

fn build(source: Source) -> Result<JsonValue, JsonError> {
    Ok(match source {
        Source::Null => JsonValue::Null,
        Source::Json(value) => value,
        Source::Text(text) => JsonValue::String(JsonString::new(text)),
        Source::Int(i) => JsonValue::Number(JsonNumber::from(i)),
        Source::Float(f) => JsonValue::Number(JsonNumber::from_f64(f)?),
        Source::Bool(b) => JsonValue::Boolean(b),
        Source::Enum(name) => JsonValue::String(JsonString::new(name)),
        Source::Seq(items) => JsonValue::Array(
            items
                .into_iter()
                .map(build)
                .collect::<Result<JsonArray, _>>()?,
        ),
        Source::Map(entries) => {
            let mut object = JsonObject::new();
            for (key, value) in entries {
                let Source::Text(key) = key else {
                    return Err(JsonError::InvalidKeyType { found: key.kind() });
                };
                object.insert(key, build(value)?)?;
            }
            JsonValue::Object(object)
        }
        Source::Record { fields, .. } => {
            let mut object = JsonObject::new();
            for (name, value) in fields {
                object.insert(name, build(value)?)?;
            }
            JsonValue::Object(object)
        }
        Source::Opaque { type_name } => return Err(JsonError::UnsupportedType { type_name }),
    })
}

/// Implements [`IntoSource`] for a plain struct, listing its fields in declaration
/// order.
///
/// ```
/// use getjson::impl_record;
///
/// struct Point { x: i32, y: i32 }
/// impl_record!(Point { x, y });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::json::IntoSource for $ty {
            fn into_source(self) -> $crate::json::Source {
                $crate::json::Source::Record {
                    type_name: ::std::stringify!($ty),
                    fields: ::std::vec![
                        $((
                            ::std::stringify!($field),
                            $crate::json::IntoSource::into_source(self.$field),
                        )),*
                    ],
                }
            }
        }
    };
}

/// Implements [`IntoSource`] for a fieldless enum; each value infers to its variant
/// name.
///
/// ```
/// use getjson::impl_enum;
///
/// enum Color { Red, Green }
/// impl_enum!(Color { Red, Green });
/// ```
#[macro_export]
macro_rules! impl_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::json::IntoSource for $ty {
            fn into_source(self) -> $crate::json::Source {
                match self {
                    $($ty::$variant => $crate::json::Source::Enum(::std::stringify!($variant)),)+
                }
            }
        }
    };
}

impl IntoSource for Source {
    fn into_source(self) -> Source {
        self
    }
}

impl IntoSource for () {
    fn into_source(self) -> Source {
        Source::Null
    }
}

impl IntoSource for JsonValue {
    fn into_source(self) -> Source {
        Source::Json(self)
    }
}

macro_rules! json_node_source {
    ($($node:ty),+) => {
        $(impl IntoSource for $node {
            fn into_source(self) -> Source {
                Source::Json(JsonValue::from(self))
            }
        })+
    };
}

json_node_source!(JsonNumber, JsonString, JsonArray, JsonObject);

impl IntoSource for String {
    fn into_source(self) -> Source {
        Source::Text(self)
    }
}

impl IntoSource for &str {
    fn into_source(self) -> Source {
        Source::Text(self.to_owned())
    }
}

impl IntoSource for bool {
    fn into_source(self) -> Source {
        Source::Bool(self)
    }
}

macro_rules! int_source {
    ($($int:ty),+) => {
        $(impl IntoSource for $int {
            fn into_source(self) -> Source {
                Source::Int(i64::from(self))
            }
        })+
    };
}

int_source!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_source {
    ($($int:ty),+) => {
        $(impl IntoSource for $int {
            fn into_source(self) -> Source {
                i64::try_from(self).map_or(Source::Float(self as f64), Source::Int)
            }
        })+
    };
}

wide_int_source!(u64, usize, isize);

impl IntoSource for f32 {
    fn into_source(self) -> Source {
        Source::Float(f64::from(self))
    }
}

impl IntoSource for f64 {
    fn into_source(self) -> Source {
        Source::Float(self)
    }
}

impl<T: IntoSource> IntoSource for Option<T> {
    fn into_source(self) -> Source {
        self.map_or(Source::Null, IntoSource::into_source)
    }
}

impl<T: IntoSource> IntoSource for Vec<T> {
    fn into_source(self) -> Source {
        Source::Seq(self.into_iter().map(IntoSource::into_source).collect())
    }
}

impl<K: IntoSource, V: IntoSource, S: BuildHasher> IntoSource for HashMap<K, V, S> {
    fn into_source(self) -> Source {
        Source::Map(
            self.into_iter()
                .map(|(k, v)| (k.into_source(), v.into_source()))
                .collect(),
        )
    }
}

impl<K: IntoSource, V: IntoSource> IntoSource for BTreeMap<K, V> {
    fn into_source(self) -> Source {
        Source::Map(
            self.into_iter()
                .map(|(k, v)| (k.into_source(), v.into_source()))
                .collect(),
        )
    }
}

impl IntoSource for Bytes {
    fn into_source(self) -> Source {
        Source::opaque::<Bytes>()
    }
}
