//! File fingerprinting, upload progress accounting and single-flight
//! operation slots shared by the device widgets.
//!
//! The OTA endpoint verifies uploads against an MD5 digest supplied in the
//! query string, so the selected file is hashed client-side before upload.

mod digest;
mod progress;
mod slot;

pub use digest::{DigestFactory, StreamingDigest, checksum_bytes, hash_bytes, md5, sha256};
pub use progress::{ProgressCounter, UploadProgress};
pub use slot::{OpSlot, spawn_op};

/// Size of the slices fed to a digest or streamed into a request body: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

