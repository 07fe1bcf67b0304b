//! HTTP/1.1 primitives the dispatcher and server exchange:
//! [`Method`], [`StatusCode`], [`Headers`], [`Request`], and [`Response`].

use std::fmt;

pub mod headers;
pub mod request;
pub mod response;

pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// Status codes the framework answers with.
///
/// # Examples
///
/// ```
/// use getjson::http::StatusCode;
///
/// let status = StatusCode::MethodNotAllowed;
/// assert_eq!(status.as_u16(), 405);
/// assert_eq!(status.to_string(), "405 Method Not Allowed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    MethodNotAllowed = 405,
    PayloadTooLarge = 413,
    InternalServerError = 500,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn canonical_reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Parsing is exact: `"get"` becomes `Custom("get")`. Route matching goes through
/// [`Method::matches`], which ignores case.
///
/// # Examples
///
/// ```
/// use getjson::http::Method;
///
/// let method: Method = "POST".parse().unwrap();
/// assert_eq!(method, Method::Post);
/// assert!(method.matches("post"));
/// assert!(!method.matches("GET"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Compares against a request method token, ignoring ASCII case.
    pub fn matches(&self, token: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(token)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            other => Self::Custom(other.to_owned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_method_round_trips() {
        let method: Method = "PURGE".parse().unwrap();
        assert_eq!(method, Method::Custom("PURGE".into()));
        assert_eq!(method.to_string(), "PURGE");
        assert!(method.matches("purge"));
    }

    #[test]
    fn lowercase_token_is_not_a_standard_method() {
        let method: Method = "get".parse().unwrap();
        assert_eq!(method, Method::Custom("get".into()));
        assert!(Method::Get.matches(method.as_str()));
    }

    #[test]
    fn status_line_parts() {
        assert_eq!(StatusCode::PayloadTooLarge.to_string(), "413 Payload Too Large");
        assert_eq!(u16::from(StatusCode::InternalServerError), 500);
    }
}
