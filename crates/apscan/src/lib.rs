//! Access-point scan poller.
//!
//! Polls the device scan endpoint with GET. While the device reports a scan
//! in progress (204) it polls fast; once results arrive (200), or anything
//! goes wrong, it falls back to the slow interval.

mod poller;
mod service;

pub use poller::{PollMode, ScanConfig, ScanEvent, ScanPoller};
pub use service::{ScanError, ScanHandle, spawn};
