//! `reqwest`-backed [`Transport`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tracing::{debug, trace};

use devpanel_protocol::{
    FilePart, Method, ProgressCallback, Request, Response, Transport, TransportError,
    TransportFuture,
};
use devpanel_transfer::{DEFAULT_CHUNK_SIZE, ProgressCounter};

use crate::HttpError;

/// Timeout applied to probes and scans; uploads only get a connect timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport for the embedded device endpoints.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request, progress: Option<ProgressCallback>) -> TransportFuture<'_> {
        Box::pin(async move {
            let Request { method, url, body } = request;
            debug!(%method, %url, "sending request");

            let builder = match method {
                Method::Get => self.client.get(&url),
                Method::Head => self.client.head(&url),
                Method::Post => self.client.post(&url),
            };
            let builder = match body {
                Some(part) => builder.multipart(file_form(part, progress)),
                None => builder.timeout(self.timeout),
            };

            let resp = builder.send().await.map_err(transport_error)?;
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?;
            debug!(%method, %url, status, "response received");
            Ok(Response::new(status, body))
        })
    }
}

/// Builds a single-part form whose body is streamed in chunks, reporting
/// progress as each chunk is handed to the connection.
fn file_form(part: FilePart, progress: Option<ProgressCallback>) -> Form {
    let FilePart {
        field,
        file_name,
        data,
    } = part;
    let total = data.len() as u64;
    let counter = Arc::new(ProgressCounter::new(Some(total), progress));

    let chunks = (0..data.len())
        .step_by(DEFAULT_CHUNK_SIZE)
        .map(move |start| {
            let end = (start + DEFAULT_CHUNK_SIZE).min(data.len());
            let chunk = data[start..end].to_vec();
            let sent = counter.advance(chunk.len() as u64);
            trace!(sent = sent.sent, total, "upload chunk");
            Ok::<_, std::io::Error>(chunk)
        });

    let body = Body::wrap_stream(stream::iter(chunks));
    let part = Part::stream_with_length(body, total).file_name(file_name);
    Form::new().part(field, part)
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(err.to_string())
    } else {
        TransportError::Connect(err.to_string())
    }
}
