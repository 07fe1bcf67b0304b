//! Reference controller mounted under `/api`.
//!
//! | Route                      | Input                      | Output                              |
//! |----------------------------|----------------------------|-------------------------------------|
//! | `POST /api/odd`            | body: JSON array           | odd integers, truncated             |
//! | `POST /api/ints`           | body: JSON array           | every number, truncated             |
//! | `POST /api/pair`           | none                       | `{"first": "one", "second": "two"}` |
//! | `POST /api/path/{pathVar}` | path: text                 | the text with `!` appended          |
//! | `POST /api/args`           | query: `n` int, `text`     | `{text: text repeated n times}`     |
//!
//! Non-numeric array elements are skipped by both array endpoints.

use thiserror::Error;

use crate::context::Args;
use crate::impl_record;
use crate::json::{JsonArray, JsonNumber, JsonObject, JsonString, JsonValue};
use crate::router::{Controller, HandlerError, Mapping, ParamType};
use crate::server::MAX_REQUEST_SIZE;

/// Largest text `/api/args` will build, in bytes.
pub const MAX_REPEAT_BYTES: usize = MAX_REQUEST_SIZE;

/// Input a handler cannot work with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("expected a JSON array in the request body, got {found}")]
    NotAnArray { found: &'static str },

    #[error("repeat count must not be negative, got {0}")]
    NegativeCount(i64),

    #[error("repeating {len} bytes {times} times exceeds {MAX_REPEAT_BYTES} bytes")]
    RepeatTooLarge { len: usize, times: usize },
}

/// Two labelled values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub first: String,
    pub second: String,
}

impl_record!(Pair { first, second });

#[derive(Debug, Default)]
pub struct ApiController;

impl ApiController {
    pub fn odd(&self, args: &Args) -> Result<JsonArray, HandlerError> {
        let input = numbers(args.json("input")?)?;
        Ok(input
            .filter(|n| n.truncate() % 2 != 0)
            .map(|n| JsonValue::from(n.truncate()))
            .collect())
    }

    pub fn ints(&self, args: &Args) -> Result<JsonArray, HandlerError> {
        let input = numbers(args.json("input")?)?;
        Ok(input.map(|n| JsonValue::from(n.truncate())).collect())
    }

    pub fn pair(&self, _args: &Args) -> Result<Pair, HandlerError> {
        Ok(Pair {
            first: "one".into(),
            second: "two".into(),
        })
    }

    pub fn path(&self, args: &Args) -> Result<JsonString, HandlerError> {
        Ok(JsonString::new(args.text("pathVar")?).append("!"))
    }

    pub fn args(&self, args: &Args) -> Result<JsonValue, HandlerError> {
        let n = args.int("n")?;
        if n < 0 {
            return Err(ApiError::NegativeCount(n).into());
        }
        let times = usize::try_from(n).unwrap_or(usize::MAX);
        let text = args.text("text")?;
        match text.len().checked_mul(times) {
            Some(total) if total <= MAX_REPEAT_BYTES => {}
            _ => {
                return Err(ApiError::RepeatTooLarge {
                    len: text.len(),
                    times,
                }
                .into());
            }
        }

        let mut object = JsonObject::new();
        object.insert(text, JsonString::new(text).repeat(times).into())?;
        Ok(object.into())
    }
}

impl Controller for ApiController {
    const BASE_PATH: &'static str = "api";

    fn mappings() -> Vec<Mapping<Self>> {
        vec![
            Mapping::post("odd", Self::odd).body("input"),
            Mapping::post("ints", Self::ints).body("input"),
            Mapping::post("pair", Self::pair),
            Mapping::post("path/{pathVar}", Self::path).path_var("pathVar", ParamType::Text),
            Mapping::post("args", Self::args)
                .query("n", ParamType::Int)
                .query("text", ParamType::Text),
        ]
    }
}

/// The numeric elements of a JSON array body.
fn numbers(value: &JsonValue) -> Result<impl Iterator<Item = &JsonNumber>, ApiError> {
    let array = value.as_array().ok_or(ApiError::NotAnArray {
        found: value.kind(),
    })?;
    Ok(array.iter().filter_map(JsonValue::as_number))
}
