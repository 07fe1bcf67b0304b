//! # getjson
//!
//! A small JSON web framework: a JSON value model with visitors and mappers, inference
//! from plain Rust values, and a route registry that dispatches HTTP requests to
//! controller methods over a from-scratch async HTTP/1.1 server.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use getjson::context::Args;
//! use getjson::router::{Controller, Dispatcher, HandlerError, Mapping, ParamType, Registry};
//! use getjson::server::Server;
//!
//! #[derive(Default)]
//! struct Hello;
//!
//! impl Hello {
//!     fn greet(&self, args: &Args) -> Result<Vec<String>, HandlerError> {
//!         Ok(vec!["hello".into(), args.text("name")?.to_owned()])
//!     }
//! }
//!
//! impl Controller for Hello {
//!     const BASE_PATH: &'static str = "hello";
//!
//!     fn mappings() -> Vec<Mapping<Self>> {
//!         vec![Mapping::get("{name}", Self::greet).path_var("name", ParamType::Text)]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::builder().controller::<Hello>().build()?;
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     // GET /hello/world  ->  ["hello", "world"]
//!     server.serve(Arc::new(Dispatcher::new(registry))).await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod controllers;
pub mod http;
pub mod json;
pub mod router;
pub mod server;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use json::{JsonArray, JsonError, JsonNumber, JsonObject, JsonString, JsonValue};
pub use router::{Controller, Dispatcher, Registry};
pub use server::{Server, ServerError};
