//! HTTP transport abstraction.
//!
//! The host provides a [`Transport`]; the widgets only build [`Request`]s
//! and interpret [`Response`] status codes. Cancelling a request means
//! dropping the future returned by [`Transport::send`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::types::TransferProgress;

/// Callback invoked with upload progress while a request body is sent.
pub type ProgressCallback = Box<dyn Fn(TransferProgress) + Send + Sync>;

/// Future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + 'a>>;

/// HTTP methods the device endpoints understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file sent as one part of a `multipart/form-data` body.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<FilePart>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::Head,
            url: url.into(),
            body: None,
        }
    }

    /// A POST carrying a single multipart file part.
    pub fn post_file(url: impl Into<String>, part: FilePart) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(part),
        }
    }
}

/// A received response. Any status code counts as a response; only
/// connection-level failures are [`TransportError`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::new(status, String::new())
    }
}

/// Connection-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract HTTP transport implemented by the host.
pub trait Transport: Send + Sync {
    /// Sends a request and resolves once a response (of any status) arrives.
    ///
    /// When `progress` is given and the request has a body, the transport
    /// reports upload progress through it before resolving.
    fn send(&self, request: Request, progress: Option<ProgressCallback>) -> TransportFuture<'_>;
}
