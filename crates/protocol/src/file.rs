//! Local file references and the byte-source abstraction.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Future returned by [`FileSource::read_all`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = std::io::Result<Vec<u8>>> + Send + 'a>>;

/// A locally chosen file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// Display name (the last path component).
    pub name: String,
    /// Declared size in bytes, sent as the `length` query parameter.
    pub size: u64,
    pub path: PathBuf,
}

impl FileRef {
    /// Creates a reference; the display name is taken from the path.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self { name, size, path }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Reads whole files on behalf of the widgets.
///
/// Dropping the returned future cancels the read.
pub trait FileSource: Send + Sync {
    fn read_all(&self, file: FileRef) -> ReadFuture<'_>;
}
