use std::path::Path;

use devpanel_protocol::{FileRef, FileSource, ReadFuture};
use tracing::trace;

use crate::HttpError;

/// Reads files from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFileSource;

impl FileSource for FsFileSource {
    fn read_all(&self, file: FileRef) -> ReadFuture<'_> {
        Box::pin(async move {
            let data = tokio::fs::read(&file.path).await?;
            trace!(path = %file.path.display(), len = data.len(), "file read");
            Ok(data)
        })
    }
}

/// Builds a [`FileRef`] from on-disk metadata.
pub async fn file_ref_from_path(path: impl AsRef<Path>) -> Result<FileRef, HttpError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| HttpError::File {
            path: path.to_path_buf(),
            source,
        })?;
    if !meta.is_file() {
        return Err(HttpError::NotAFile(path.to_path_buf()));
    }
    Ok(FileRef::new(path, meta.len()))
}
