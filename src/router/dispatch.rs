//! Request dispatch: match, bind, invoke, serialize.
//!
//! [`Dispatcher::handle`] runs one request through a fixed sequence of steps:
//!
//! 1. split the path into segments and decode the query string (first key wins);
//! 2. pick the first route, in registration order, whose pattern matches the segments;
//! 3. check the route's method against the request method, ignoring case;
//! 4. bind every declared parameter from its path placeholder, query key or the body;
//! 5. invoke the handler;
//! 6. infer JSON from the result and render it as the response body.
//!
//! All state is request-local. The dispatcher only reads the frozen [`Registry`], so a
//! single instance can serve any number of concurrent requests.
//!
//! | Failure                                   | Status |
//! |-------------------------------------------|--------|
//! | no path match                             | 404    |
//! | method mismatch                           | 405    |
//! | anything during binding, handler, output  | 500    |
//!
//! Error responses carry no body.

use std::panic::{self, AssertUnwindSafe};

use percent_encoding::percent_decode_str;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::pattern::split_path;
use super::{HandlerError, ParamType, Registry, Role, Route};
use crate::context::{Arg, Args};
use crate::http::request::{QueryParams, Request};
use crate::json::{JsonError, JsonValue, infer, parse_body};
use crate::{Response, StatusCode};

/// Content type of every successful response.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Reasons a request does not produce a `200`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route matches {path}")]
    NotFound { path: String },

    #[error("method {method} not allowed for {route}")]
    MethodNotAllowed { method: String, route: String },

    #[error("missing query parameter `{name}`")]
    MissingParameter { name: String },

    #[error("invalid value {value:?} for `{name}`: expected {expected}")]
    InvalidArgument {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("malformed request body: {0}")]
    MalformedBody(#[source] serde_json::Error),

    #[error("handler result cannot be represented as JSON: {0}")]
    Inference(#[from] JsonError),

    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    /// Maps the failure to its response status.
    ///
    /// Binding failures are reported as `500`, like every other failure past the
    /// method check.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::MethodNotAllowed { .. } => StatusCode::MethodNotAllowed,
            Self::MissingParameter { .. }
            | Self::InvalidArgument { .. }
            | Self::MalformedBody(_)
            | Self::Inference(_)
            | Self::Handler(_)
            | Self::Panicked(_) => StatusCode::InternalServerError,
        }
    }
}

/// Routes requests against a frozen [`Registry`].
///
/// # Examples
///
/// ```
/// use getjson::controllers::ApiController;
/// use getjson::router::{Dispatcher, Registry};
///
/// let registry = Registry::builder().controller::<ApiController>().build().unwrap();
/// let dispatcher = Dispatcher::new(registry);
///
/// let response = dispatcher.handle("POST", "/api/odd", None, b"[1,2,3,4,5]");
/// assert_eq!(response.status().as_u16(), 200);
/// assert_eq!(response.content(), b"[1, 3, 5]");
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    registry: Registry,
}

impl Dispatcher {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatches a parsed HTTP request.
    pub fn dispatch(&self, request: &Request) -> Response {
        self.handle(
            request.method().as_str(),
            request.path(),
            request.query_string(),
            request.body(),
        )
    }

    /// Dispatches one request and renders the outcome as a response.
    ///
    /// `query` is the raw query string without the leading `?`.
    pub fn handle(&self, method: &str, path: &str, query: Option<&str>, body: &[u8]) -> Response {
        match self.resolve(method, path, query, body) {
            Ok(value) => Response::new(StatusCode::Ok)
                .header("Content-Type", JSON_CONTENT_TYPE)
                .body(value.to_text()),
            Err(e) => {
                let status = e.status();
                match &e {
                    DispatchError::NotFound { .. } | DispatchError::MethodNotAllowed { .. } => {
                        debug!(%method, %path, status = status.as_u16(), error = %e, "request rejected");
                    }
                    _ => {
                        error!(%method, %path, status = status.as_u16(), error = %e, "request failed");
                    }
                }
                Response::new(status)
            }
        }
    }

    /// Runs the dispatch steps and returns the JSON tree to send.
    ///
    /// # Errors
    ///
    /// Every [`DispatchError`] variant; see [`DispatchError::status`] for how each maps
    /// to a response.
    pub fn resolve(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        body: &[u8],
    ) -> Result<JsonValue, DispatchError> {
        let segments = split_path(path);
        let query = query.map(QueryParams::parse).unwrap_or_default();

        let (route, captures) = self
            .registry
            .routes()
            .iter()
            .find_map(|route| route.pattern().matches(&segments).map(|c| (route, c)))
            .ok_or_else(|| DispatchError::NotFound {
                path: path.to_owned(),
            })?;

        if !route.method().matches(method) {
            return Err(DispatchError::MethodNotAllowed {
                method: method.to_owned(),
                route: route.to_string(),
            });
        }

        let args = bind_args(route, &captures, &query, body)?;
        debug!(route = %route, args = args.len(), "invoking handler");

        let result = match panic::catch_unwind(AssertUnwindSafe(|| route.invoke(&args))) {
            Ok(result) => result.map_err(DispatchError::Handler)?,
            Err(payload) => return Err(DispatchError::Panicked(panic_message(payload.as_ref()))),
        };

        Ok(infer(result)?)
    }
}

fn bind_args(
    route: &Route,
    captures: &[(&str, &str)],
    query: &QueryParams,
    body: &[u8],
) -> Result<Args, DispatchError> {
    let mut args = Args::with_capacity(route.params().len());

    for param in route.params() {
        let arg = match param.role {
            Role::Path => {
                let raw = captures
                    .iter()
                    .find(|(name, _)| *name == param.name)
                    .map(|(_, raw)| *raw)
                    .ok_or_else(|| DispatchError::MissingParameter {
                        name: param.name.to_owned(),
                    })?;
                let decoded = percent_decode_str(raw).decode_utf8().map_err(|_| {
                    DispatchError::InvalidArgument {
                        name: param.name.to_owned(),
                        value: raw.to_owned(),
                        expected: "UTF-8 text",
                    }
                })?;
                coerce(param.name, &decoded, param.ty)?
            }
            Role::Query => {
                let raw = query
                    .get(param.name)
                    .ok_or_else(|| DispatchError::MissingParameter {
                        name: param.name.to_owned(),
                    })?;
                coerce(param.name, raw, param.ty)?
            }
            Role::Body => Arg::Json(parse_body(body).map_err(|e| {
                warn!(param = param.name, error = %e, "request body rejected");
                DispatchError::MalformedBody(e)
            })?),
        };
        args.insert(param.name, arg);
    }

    Ok(args)
}

fn coerce(name: &str, raw: &str, ty: ParamType) -> Result<Arg, DispatchError> {
    let invalid = || DispatchError::InvalidArgument {
        name: name.to_owned(),
        value: raw.to_owned(),
        expected: ty.name(),
    };

    match ty {
        ParamType::Int => raw.parse().map(Arg::Int).map_err(|_| invalid()),
        ParamType::Double => raw
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite())
            .map(Arg::Double)
            .ok_or_else(invalid),
        ParamType::Bool => {
            if raw.eq_ignore_ascii_case("true") {
                Ok(Arg::Bool(true))
            } else if raw.eq_ignore_ascii_case("false") {
                Ok(Arg::Bool(false))
            } else {
                Err(invalid())
            }
        }
        ParamType::Text => Ok(Arg::Text(raw.to_owned())),
        // Rejected at registration for path and query roles.
        ParamType::Json => Err(invalid()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::ApiController;
    use crate::router::{Controller, Mapping};

    fn api() -> Dispatcher {
        Dispatcher::new(
            Registry::builder()
                .controller::<ApiController>()
                .build()
                .unwrap(),
        )
    }

    fn body_text(response: &Response) -> &str {
        std::str::from_utf8(response.content()).unwrap()
    }

    // Registers `/api/odd` before `/api/{x}`.
    #[derive(Default)]
    struct LiteralFirst;

    impl LiteralFirst {
        fn literal(&self, _args: &Args) -> Result<&'static str, HandlerError> {
            Ok("literal")
        }

        fn placeholder(&self, args: &Args) -> Result<String, HandlerError> {
            Ok(format!("placeholder {}", args.text("x")?))
        }
    }

    impl Controller for LiteralFirst {
        const BASE_PATH: &'static str = "api";

        fn mappings() -> Vec<Mapping<Self>> {
            vec![
                Mapping::post("odd", Self::literal),
                Mapping::post("{x}", Self::placeholder).path_var("x", ParamType::Text),
            ]
        }
    }

    // Same routes, opposite order.
    #[derive(Default)]
    struct PlaceholderFirst;

    impl Controller for PlaceholderFirst {
        const BASE_PATH: &'static str = "api";

        fn mappings() -> Vec<Mapping<Self>> {
            vec![
                Mapping::post("{x}", |_: &Self, args: &Args| {
                    LiteralFirst.placeholder(args)
                })
                .path_var("x", ParamType::Text),
                Mapping::post("odd", |_: &Self, args: &Args| LiteralFirst.literal(args)),
            ]
        }
    }

    #[derive(Default)]
    struct Typed;

    impl Typed {
        fn echo(&self, args: &Args) -> Result<Vec<String>, HandlerError> {
            Ok(args.iter().map(|(name, arg)| format!("{name}={arg}")).collect())
        }

        fn panics(&self, _args: &Args) -> Result<(), HandlerError> {
            panic!("boom")
        }

        fn fails(&self, _args: &Args) -> Result<(), HandlerError> {
            Err("expected a JSON array".into())
        }

        fn opaque(&self, _args: &Args) -> Result<bytes::Bytes, HandlerError> {
            Ok(bytes::Bytes::from_static(b"blob"))
        }
    }

    impl Controller for Typed {
        const BASE_PATH: &'static str = "t";

        fn mappings() -> Vec<Mapping<Self>> {
            vec![
                Mapping::get("echo/{i}/{d}/{b}", Self::echo)
                    .path_var("i", ParamType::Int)
                    .path_var("d", ParamType::Double)
                    .path_var("b", ParamType::Bool)
                    .query("s", ParamType::Text),
                Mapping::get("panics", Self::panics),
                Mapping::get("fails", Self::fails),
                Mapping::get("opaque", Self::opaque),
            ]
        }
    }

    fn typed() -> Dispatcher {
        Dispatcher::new(Registry::builder().controller::<Typed>().build().unwrap())
    }

    #[test]
    fn odd_filter() {
        let response = api().handle("POST", "/api/odd", None, b"[1,2,3,4,5]");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(body_text(&response), "[1, 3, 5]");
        assert_eq!(
            response.headers().get("content-type"),
            Some(JSON_CONTENT_TYPE)
        );
    }

    #[test]
    fn path_variable() {
        let response = api().handle("POST", "/api/path/hello", None, b"");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(body_text(&response), "\"hello!\"");
    }

    #[test]
    fn path_variable_is_percent_decoded() {
        let response = api().handle("POST", "/api/path/a%20%22b%22", None, b"");
        assert_eq!(body_text(&response), r#""a \"b\"!""#);
    }

    #[test]
    fn query_and_repeat() {
        let response = api().handle("POST", "/api/args", Some("n=3&text=PA"), b"");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(body_text(&response), r#"{"PA": "PAPAPA"}"#);
    }

    #[test]
    fn repeated_query_key_keeps_first() {
        let response = api().handle("POST", "/api/args", Some("n=2&text=ab&n=5"), b"");
        assert_eq!(body_text(&response), r#"{"ab": "abab"}"#);
    }

    #[test]
    fn oversized_repeat_is_internal_error() {
        let dispatcher = api();
        let response = dispatcher.handle("POST", "/api/args", Some("n=100000000000&text=PA"), b"");
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(response.content().is_empty());
        assert!(matches!(
            dispatcher.resolve("POST", "/api/args", Some("n=9223372036854775807&text=PA"), b""),
            Err(DispatchError::Handler(_))
        ));
    }

    #[test]
    fn encoded_literal_segment_routes() {
        let response = api().handle("POST", "/api/%6Fdd", None, b"[7, 8]");
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(body_text(&response), "[7]");
    }

    #[test]
    fn wrong_method() {
        let response = api().handle("GET", "/api/odd", None, b"");
        assert_eq!(response.status(), StatusCode::MethodNotAllowed);
        assert!(response.content().is_empty());
    }

    #[test]
    fn method_check_ignores_case() {
        let response = api().handle("post", "/api/path/x", None, b"");
        assert_eq!(response.status(), StatusCode::Ok);
    }

    #[test]
    fn unknown_path() {
        let response = api().handle("GET", "/api/nope", None, b"");
        assert_eq!(response.status(), StatusCode::NotFound);
        assert!(response.content().is_empty());
    }

    #[test]
    fn segment_count_mismatch_is_not_found() {
        let dispatcher = api();
        assert_eq!(
            dispatcher.handle("POST", "/api/path", None, b"").status(),
            StatusCode::NotFound
        );
        assert_eq!(
            dispatcher.handle("POST", "/api/path/a/b", None, b"").status(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn first_registered_route_wins() {
        let literal_first = Dispatcher::new(
            Registry::builder().controller::<LiteralFirst>().build().unwrap(),
        );
        let placeholder_first = Dispatcher::new(
            Registry::builder()
                .controller::<PlaceholderFirst>()
                .build()
                .unwrap(),
        );

        assert_eq!(
            literal_first.resolve("POST", "/api/odd", None, b"").unwrap(),
            JsonValue::from("literal")
        );
        assert_eq!(
            placeholder_first.resolve("POST", "/api/odd", None, b"").unwrap(),
            JsonValue::from("placeholder odd")
        );
    }

    #[test]
    fn method_checked_only_against_first_match() {
        #[derive(Default)]
        struct Split;

        impl Controller for Split {
            const BASE_PATH: &'static str = "";

            fn mappings() -> Vec<Mapping<Self>> {
                vec![
                    Mapping::get("x", |_: &Self, _: &Args| Ok("get")),
                    Mapping::post("x", |_: &Self, _: &Args| Ok("post")),
                ]
            }
        }

        let dispatcher =
            Dispatcher::new(Registry::builder().controller::<Split>().build().unwrap());
        assert!(matches!(
            dispatcher.resolve("POST", "/x", None, b""),
            Err(DispatchError::MethodNotAllowed { .. })
        ));
    }

    #[test]
    fn arguments_coerced_by_declared_type() {
        let value = typed()
            .resolve("GET", "/t/echo/-4/2.5/TRUE", Some("s=a+b"), b"")
            .unwrap();
        assert_eq!(value.to_text(), r#"["i=-4", "d=2.5", "b=true", "s=a b"]"#);
    }

    #[test]
    fn invalid_int_is_internal_error() {
        let dispatcher = typed();
        let err = dispatcher
            .resolve("GET", "/t/echo/four/2.5/true", Some("s=x"), b"")
            .unwrap_err();
        assert!(matches!(
            &err,
            DispatchError::InvalidArgument { name, expected: "int", .. } if name == "i"
        ));
        assert_eq!(err.status(), StatusCode::InternalServerError);
        assert_eq!(
            dispatcher
                .handle("GET", "/t/echo/four/2.5/true", Some("s=x"), b"")
                .status(),
            StatusCode::InternalServerError
        );
    }

    #[test]
    fn invalid_bool_and_double() {
        let dispatcher = typed();
        assert!(matches!(
            dispatcher.resolve("GET", "/t/echo/1/2.5/yes", Some("s=x"), b""),
            Err(DispatchError::InvalidArgument { expected: "bool", .. })
        ));
        assert!(matches!(
            dispatcher.resolve("GET", "/t/echo/1/NaN/true", Some("s=x"), b""),
            Err(DispatchError::InvalidArgument { expected: "double", .. })
        ));
    }

    #[test]
    fn undecodable_path_segment() {
        let err = typed()
            .resolve("GET", "/t/echo/1/2.5/%FF", Some("s=x"), b"")
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument { .. }));
    }

    #[test]
    fn missing_query_parameter() {
        let dispatcher = api();
        let err = dispatcher
            .resolve("POST", "/api/args", Some("n=3"), b"")
            .unwrap_err();
        assert!(matches!(&err, DispatchError::MissingParameter { name } if name == "text"));

        let response = dispatcher.handle("POST", "/api/args", None, b"");
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(response.content().is_empty());
    }

    #[test]
    fn malformed_body() {
        let dispatcher = api();
        assert!(matches!(
            dispatcher.resolve("POST", "/api/odd", None, b"[1, 2"),
            Err(DispatchError::MalformedBody(_))
        ));
        assert!(matches!(
            dispatcher.resolve("POST", "/api/odd", None, b""),
            Err(DispatchError::MalformedBody(_))
        ));
        assert_eq!(
            dispatcher.handle("POST", "/api/odd", None, b"{").status(),
            StatusCode::InternalServerError
        );
    }

    #[test]
    fn handler_error_is_internal_error() {
        let err = api()
            .resolve("POST", "/api/odd", None, br#"{"not": "an array"}"#)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler(_)));
        assert_eq!(err.status(), StatusCode::InternalServerError);

        let err = typed().resolve("GET", "/t/fails", None, b"").unwrap_err();
        assert!(err.to_string().contains("expected a JSON array"));
    }

    #[test]
    fn handler_panic_is_internal_error() {
        let dispatcher = typed();
        let err = dispatcher.resolve("GET", "/t/panics", None, b"").unwrap_err();
        assert!(matches!(&err, DispatchError::Panicked(msg) if msg == "boom"));
        assert_eq!(
            dispatcher.handle("GET", "/t/panics", None, b"").status(),
            StatusCode::InternalServerError
        );
    }

    #[test]
    fn unsupported_result_is_internal_error() {
        let dispatcher = typed();
        assert!(matches!(
            dispatcher.resolve("GET", "/t/opaque", None, b""),
            Err(DispatchError::Inference(JsonError::UnsupportedType { .. }))
        ));
        assert_eq!(
            dispatcher.handle("GET", "/t/opaque", None, b"").status(),
            StatusCode::InternalServerError
        );
    }

    #[test]
    fn dispatch_parsed_request() {
        let raw = b"POST /api/args?text=x&n=2 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (request, _) = Request::parse(raw).unwrap();
        let response = api().dispatch(&request);
        assert_eq!(body_text(&response), r#"{"x": "xx"}"#);
    }

    #[test]
    fn concurrent_requests_share_one_dispatcher() {
        let dispatcher = std::sync::Arc::new(api());
        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let dispatcher = std::sync::Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    let query = format!("n={n}&text=a");
                    let response = dispatcher.handle("POST", "/api/args", Some(&query), b"");
                    (n, String::from_utf8(response.content().to_vec()).unwrap())
                })
            })
            .collect();

        for handle in handles {
            let (n, body) = handle.join().unwrap();
            assert_eq!(body, format!(r#"{{"a": "{}"}}"#, "a".repeat(n)));
        }
    }
}
