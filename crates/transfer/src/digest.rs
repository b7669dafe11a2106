use md5::{Digest, Md5};
use sha2::Sha256;

use crate::DEFAULT_CHUNK_SIZE;

/// Streaming digest: incremental updates, then a final hex string.
pub trait StreamingDigest: Send {
    fn update(&mut self, data: &[u8]);

    fn finish_hex(self: Box<Self>) -> String;
}

impl<D> StreamingDigest for D
where
    D: Digest + Send,
{
    fn update(&mut self, data: &[u8]) {
        Digest::update(self, data);
    }

    fn finish_hex(self: Box<Self>) -> String {
        let digest = *self;
        hex::encode(digest.finalize())
    }
}

/// Creates a fresh digest accumulator.
pub type DigestFactory = fn() -> Box<dyn StreamingDigest>;

/// MD5, the digest the OTA endpoint verifies against.
pub fn md5() -> Box<dyn StreamingDigest> {
    Box::new(Md5::new())
}

/// SHA-256, for hosts whose firmware endpoint expects it.
pub fn sha256() -> Box<dyn StreamingDigest> {
    Box::new(Sha256::new())
}

/// Streams `data` through a digest in [`DEFAULT_CHUNK_SIZE`] slices.
pub fn hash_bytes(factory: DigestFactory, data: &[u8]) -> String {
    let mut digest = factory();
    for chunk in data.chunks(DEFAULT_CHUNK_SIZE) {
        digest.update(chunk);
    }
    digest.finish_hex()
}

/// Computes MD5 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    hash_bytes(md5, data)
}
