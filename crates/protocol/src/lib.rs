//! Wire contract and collaborator traits shared by the device widgets.
//!
//! The widgets never talk to the network or the filesystem directly. They
//! consume a [`Transport`] and a [`FileSource`] supplied by the host, and
//! this crate pins down the request shapes and status codes the embedded
//! endpoint speaks.

pub mod constants;
pub mod file;
pub mod transport;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{force_scan_url, upload_url};
pub use file::{FileRef, FileSource, ReadFuture};
pub use transport::{
    FilePart, Method, ProgressCallback, Request, Response, Transport, TransportError,
    TransportFuture,
};
pub use types::{AccessPoint, OpFailure, RadioInfo, ScanReport, TransferProgress};
