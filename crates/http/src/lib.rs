//! Host implementations of the widget collaborators: an HTTP transport on
//! `reqwest` and a filesystem-backed file source.

mod files;
mod transport;

pub use files::{FsFileSource, file_ref_from_path};
pub use transport::{DEFAULT_REQUEST_TIMEOUT, HttpTransport};

use std::path::PathBuf;

/// Errors from setting up the host collaborators.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("cannot access {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),
}
