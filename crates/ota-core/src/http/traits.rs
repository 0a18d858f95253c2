//! Device HTTP abstraction.
//!
//! Defines the `DeviceClient` trait used to talk to the device's update
//! endpoint, allowing different implementations (reqwest, mock).

use std::fmt;
use std::net::Ipv6Addr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Failed to build HTTP client: {0}")]
    ClientInit(String),

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16, body: String },

    #[error("Digest authentication with {url} failed: {message}")]
    Auth { url: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Get => write!(f, "GET"),
            RequestMethod::Post => write!(f, "POST"),
        }
    }
}

/// Response as received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            reason: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One field of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Multipart form body, independent of the HTTP backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&FormPart> {
        self.parts.iter().find(|p| p.name == name)
    }
}

/// Abstract client bound to one device address and one set of credentials.
///
/// Implementations return any response the device sends, including
/// non-2xx ones; judging the status is up to the caller.
pub trait DeviceClient: Send + Sync {
    /// Host the client talks to, as given by the operator or the resolver.
    fn host(&self) -> &str;

    /// Full URL of `path` on the device.
    fn url(&self, path: &str) -> String {
        device_url(self.host(), path)
    }

    /// Authenticated GET of `path`.
    fn get(&self, path: &str) -> Result<HttpResponse, HttpError>;

    /// Authenticated multipart POST of `form` to `path`.
    fn post_multipart(&self, path: &str, form: &MultipartForm) -> Result<HttpResponse, HttpError>;
}

impl<T: DeviceClient + ?Sized> DeviceClient for std::sync::Arc<T> {
    fn host(&self) -> &str {
        (**self).host()
    }

    fn url(&self, path: &str) -> String {
        (**self).url(path)
    }

    fn get(&self, path: &str) -> Result<HttpResponse, HttpError> {
        (**self).get(path)
    }

    fn post_multipart(&self, path: &str, form: &MultipartForm) -> Result<HttpResponse, HttpError> {
        (**self).post_multipart(path, form)
    }
}

/// `http://host/path`, bracketing bare IPv6 literals.
pub fn device_url(host: &str, path: &str) -> String {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("http://[{host}]{path}")
    } else {
        format!("http://{host}{path}")
    }
}
