//! Route registry: bind declared handler mappings to concrete routes.
//!
//! A handler-bearing type implements [`Controller`]: a base path plus a static list of
//! [`Mapping`]s, each naming a path suffix, an HTTP method, the handler function and the
//! role of every handler parameter. [`Registry::builder`] instantiates each controller
//! once, joins base and handler paths, validates the declarations and freezes the result
//! into an immutable list of [`Route`]s.
//!
//! Routes keep registration order. [`Dispatcher`] scans them in that order and the first
//! route whose path matches wins; there is no specificity ranking.
//!
//! ```
//! use getjson::context::Args;
//! use getjson::router::{Controller, HandlerError, Mapping, ParamType, Registry};
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! impl Greeter {
//!     fn hello(&self, args: &Args) -> Result<String, HandlerError> {
//!         Ok(format!("hello {}", args.text("name")?))
//!     }
//! }
//!
//! impl Controller for Greeter {
//!     const BASE_PATH: &'static str = "greet";
//!
//!     fn mappings() -> Vec<Mapping<Self>> {
//!         vec![Mapping::get("{name}", Self::hello).path_var("name", ParamType::Text)]
//!     }
//! }
//!
//! let registry = Registry::builder().controller::<Greeter>().build().unwrap();
//! assert_eq!(registry.len(), 1);
//! assert_eq!(registry.routes()[0].to_string(), "GET /greet/{name}");
//! ```

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::Method;
use crate::context::Args;
use crate::json::{IntoSource, Source};

pub mod dispatch;
pub mod pattern;

pub use dispatch::{DispatchError, Dispatcher};
pub use pattern::{PathPattern, PatternError, Segment};

/// Failure reported by a handler. Any error type converts into it with `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a bound handler returns: a value ready for JSON inference.
pub type HandlerResult = Result<Source, HandlerError>;

/// Type-erased handler with its receiver already bound.
///
/// Stored behind an `Arc` so routes can be shared across worker tasks without copying.
pub type Handler = Arc<dyn Fn(&Args) -> HandlerResult + Send + Sync + 'static>;

type UnboundHandler<C> = Box<dyn Fn(&C, &Args) -> HandlerResult + Send + Sync + 'static>;

/// Errors raised while building a [`Registry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid handler declaration {controller} {method} {path:?}: {reason}")]
    InvalidHandlerDeclaration {
        controller: &'static str,
        method: Method,
        path: String,
        reason: String,
    },
}

/// Where a handler parameter takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A `{name}` placeholder in the route path.
    Path,
    /// A key in the URL query string.
    Query,
    /// The request payload, parsed as JSON.
    Body,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Body => "body",
        })
    }
}

/// Declared type of a handler parameter; drives argument coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Double,
    Bool,
    Text,
    /// A parsed JSON tree. Only valid for [`Role::Body`].
    Json,
}

impl ParamType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// A declared handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub role: Role,
    pub ty: ParamType,
}

/// One handler declaration of a controller.
pub struct Mapping<C> {
    method: Method,
    path: &'static str,
    params: Vec<Param>,
    handler: UnboundHandler<C>,
}

impl<C: 'static> Mapping<C> {
    /// Declares `handler` for `method` requests to `path`, relative to the controller's
    /// base path.
    pub fn new<F, R>(method: Method, path: &'static str, handler: F) -> Self
    where
        F: Fn(&C, &Args) -> Result<R, HandlerError> + Send + Sync + 'static,
        R: IntoSource,
    {
        Self {
            method,
            path,
            params: Vec::new(),
            handler: Box::new(move |receiver: &C, args: &Args| {
                handler(receiver, args).map(IntoSource::into_source)
            }),
        }
    }

    pub fn get<F, R>(path: &'static str, handler: F) -> Self
    where
        F: Fn(&C, &Args) -> Result<R, HandlerError> + Send + Sync + 'static,
        R: IntoSource,
    {
        Self::new(Method::Get, path, handler)
    }

    pub fn post<F, R>(path: &'static str, handler: F) -> Self
    where
        F: Fn(&C, &Args) -> Result<R, HandlerError> + Send + Sync + 'static,
        R: IntoSource,
    {
        Self::new(Method::Post, path, handler)
    }

    pub fn put<F, R>(path: &'static str, handler: F) -> Self
    where
        F: Fn(&C, &Args) -> Result<R, HandlerError> + Send + Sync + 'static,
        R: IntoSource,
    {
        Self::new(Method::Put, path, handler)
    }

    pub fn delete<F, R>(path: &'static str, handler: F) -> Self
    where
        F: Fn(&C, &Args) -> Result<R, HandlerError> + Send + Sync + 'static,
        R: IntoSource,
    {
        Self::new(Method::Delete, path, handler)
    }

    /// Declares the next parameter as bound from the `{name}` path placeholder.
    #[must_use]
    pub fn path_var(self, name: &'static str, ty: ParamType) -> Self {
        self.param(name, Role::Path, ty)
    }

    /// Declares the next parameter as bound from the `name` query key.
    #[must_use]
    pub fn query(self, name: &'static str, ty: ParamType) -> Self {
        self.param(name, Role::Query, ty)
    }

    /// Declares the next parameter as the parsed request body.
    #[must_use]
    pub fn body(self, name: &'static str) -> Self {
        self.param(name, Role::Body, ParamType::Json)
    }

    #[must_use]
    pub fn param(mut self, name: &'static str, role: Role, ty: ParamType) -> Self {
        self.params.push(Param { name, role, ty });
        self
    }
}

/// A handler-bearing type.
///
/// The `Default` bound on [`RegistryBuilder::controller`] is what requires a
/// controller to be constructible with no external arguments.
pub trait Controller: Send + Sync + Sized + 'static {
    /// Path prefix shared by every mapping; may be empty.
    const BASE_PATH: &'static str;

    /// Handler declarations, in registration order.
    fn mappings() -> Vec<Mapping<Self>>;
}

/// An immutable binding of a path pattern and method to a handler.
pub struct Route {
    pattern: PathPattern,
    method: Method,
    params: Vec<Param>,
    handler: Handler,
    controller: &'static str,
}

impl Route {
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Handler parameters in declaration order, excluding the receiver.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Type name of the controller that declared this route.
    pub fn controller(&self) -> &'static str {
        self.controller
    }

    /// Calls the bound handler.
    pub fn invoke(&self, args: &Args) -> HandlerResult {
        (self.handler)(args)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.to_string())
            .field("params", &self.params)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

/// The frozen, ordered route list.
#[derive(Debug)]
pub struct Registry {
    routes: Vec<Route>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Routes in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Collects controllers, then validates them all in [`build`](Self::build).
#[derive(Default)]
pub struct RegistryBuilder {
    routes: Vec<Route>,
    errors: Vec<RegistryError>,
}

impl RegistryBuilder {
    /// Instantiates `C` with [`Default`] and registers its mappings.
    #[must_use]
    pub fn controller<C: Controller + Default>(self) -> Self {
        self.instance(C::default())
    }

    /// Registers the mappings of an already constructed controller.
    #[must_use]
    pub fn instance<C: Controller>(mut self, controller: C) -> Self {
        let receiver = Arc::new(controller);
        let name = std::any::type_name::<C>();

        for mapping in C::mappings() {
            match bind(name, C::BASE_PATH, mapping, Arc::clone(&receiver)) {
                Ok(route) => {
                    debug!(controller = name, route = %route, "route registered");
                    self.routes.push(route);
                }
                Err(e) => self.errors.push(e),
            }
        }

        self
    }

    /// Freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError::InvalidHandlerDeclaration`] if any
    /// declaration was invalid; no partial registry is produced.
    pub fn build(self) -> Result<Registry, RegistryError> {
        match self.errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(Registry {
                routes: self.routes,
            }),
        }
    }
}

fn bind<C: Controller>(
    controller: &'static str,
    base: &str,
    mapping: Mapping<C>,
    receiver: Arc<C>,
) -> Result<Route, RegistryError> {
    let Mapping {
        method,
        path,
        params,
        handler,
    } = mapping;

    let invalid = |reason: String| RegistryError::InvalidHandlerDeclaration {
        controller,
        method: method.clone(),
        path: format!("{base}/{path}"),
        reason,
    };

    let pattern = PathPattern::join(base, path).map_err(|e| invalid(e.to_string()))?;
    validate_params(&pattern, &params).map_err(invalid)?;

    Ok(Route {
        pattern,
        method,
        params,
        handler: Arc::new(move |args: &Args| handler(&*receiver, args)),
        controller,
    })
}

fn validate_params(pattern: &PathPattern, params: &[Param]) -> Result<(), String> {
    let mut has_body = false;

    for (i, param) in params.iter().enumerate() {
        if params[..i].iter().any(|p| p.name == param.name) {
            return Err(format!("parameter `{}` is declared twice", param.name));
        }

        match param.role {
            Role::Path if !pattern.has_placeholder(param.name) => {
                return Err(format!(
                    "path parameter `{}` has no matching placeholder",
                    param.name
                ));
            }
            Role::Body if has_body => {
                return Err(format!(
                    "parameter `{}` is a second body parameter",
                    param.name
                ));
            }
            Role::Body => has_body = true,
            Role::Path | Role::Query => {}
        }

        match (param.role, param.ty) {
            (Role::Body, ParamType::Json) => {}
            (Role::Body, ty) => {
                return Err(format!(
                    "body parameter `{}` must be json, not {}",
                    param.name,
                    ty.name()
                ));
            }
            (role, ParamType::Json) => {
                return Err(format!(
                    "{role} parameter `{}` cannot be json",
                    param.name
                ));
            }
            _ => {}
        }
    }

    Ok(())
}
