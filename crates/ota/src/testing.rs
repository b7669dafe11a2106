//! Scripted collaborators for manager tests.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use devpanel_protocol::{
    FileRef, FileSource, Method, ProgressCallback, ReadFuture, Request, Response,
    TransferProgress, Transport, TransportError, TransportFuture,
};

/// What the scripted transport does with one request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Respond(Response),
    Fail(String),
    /// Never resolves; only cancellation ends it.
    Hang,
}

/// Transport answering from per-method scripts and logging every request.
///
/// Unscripted requests hang. Bodies of answered requests are reported as
/// two progress steps before the response.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<Vec<(Method, Reply)>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub(crate) fn on(&self, method: Method, reply: Reply) {
        self.script.lock().unwrap().push((method, reply));
    }

    pub(crate) fn respond(&self, method: Method, status: u16) {
        self.on(method, Reply::Respond(Response::empty(status)));
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn next_reply(&self, method: Method) -> Reply {
        let mut script = self.script.lock().unwrap();
        match script.iter().position(|(m, _)| *m == method) {
            Some(idx) => script.remove(idx).1,
            None => Reply::Hang,
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: Request, progress: Option<ProgressCallback>) -> TransportFuture<'_> {
        let reply = self.next_reply(request.method);
        let body_len = request.body.as_ref().map(|b| b.data.len() as u64);
        self.requests.lock().unwrap().push(request);

        Box::pin(async move {
            match reply {
                Reply::Respond(resp) => {
                    if let (Some(total), Some(cb)) = (body_len, progress) {
                        cb(TransferProgress {
                            sent: total / 2,
                            total: Some(total),
                        });
                        cb(TransferProgress {
                            sent: total,
                            total: Some(total),
                        });
                    }
                    Ok(resp)
                }
                Reply::Fail(detail) => Err(TransportError::Connect(detail)),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

/// In-memory file store keyed by path.
#[derive(Default)]
pub(crate) struct MemoryFiles {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFiles {
    pub(crate) fn insert(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files.lock().unwrap().insert(path.into(), data);
    }

    /// Inserts `data` and returns a matching reference.
    pub(crate) fn file(&self, path: &str, data: &[u8]) -> FileRef {
        self.insert(path, data.to_vec());
        FileRef::new(path, data.len() as u64)
    }
}

impl FileSource for MemoryFiles {
    fn read_all(&self, file: FileRef) -> ReadFuture<'_> {
        Box::pin(async move {
            self.files
                .lock()
                .unwrap()
                .get(&file.path)
                .cloned()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no such file: {}", file.path.display()),
                    )
                })
        })
    }
}
