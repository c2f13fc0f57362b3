//! Pluggable content digests.
//!
//! The store never hardcodes a hash function: the [`DigestAlgorithm`] is
//! supplied through [`Config`](crate::Config) and every record carries the
//! algorithm name next to the hex value (`sha256:9f86...`).

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

/// A hash function used for content and metadata digests.
pub trait DigestAlgorithm: Send + Sync + fmt::Debug {
    /// Short lowercase name written before the hex value, e.g. `sha256`.
    fn name(&self) -> &str;

    /// Starts a fresh incremental hash.
    fn start(&self) -> Box<dyn DigestState>;
}

/// Incremental hash state.
pub trait DigestState: Send {
    /// Feeds more bytes.
    fn update(&mut self, data: &[u8]);

    /// Finishes the hash and returns the raw digest bytes.
    fn finish(self: Box<Self>) -> Vec<u8>;
}

struct Sha2State<D>(D);

impl<D: Digest + Send> DigestState for Sha2State<D> {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

/// SHA-256, the default digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl DigestAlgorithm for Sha256Digest {
    fn name(&self) -> &str {
        "sha256"
    }

    fn start(&self) -> Box<dyn DigestState> {
        Box::new(Sha2State(Sha256::new()))
    }
}

/// SHA-512.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha512Digest;

impl DigestAlgorithm for Sha512Digest {
    fn name(&self) -> &str {
        "sha512"
    }

    fn start(&self) -> Box<dyn DigestState> {
        Box::new(Sha2State(Sha512::new()))
    }
}

/// Resolves a built-in algorithm by name (`sha256`, `SHA-256`, `sha512`, ...).
#[must_use]
pub fn digest_by_name(name: &str) -> Option<Arc<dyn DigestAlgorithm>> {
    match name.to_ascii_lowercase().replace('-', "").as_str() {
        "sha256" => Some(Arc::new(Sha256Digest)),
        "sha512" => Some(Arc::new(Sha512Digest)),
        _ => None,
    }
}

/// Lowercase hex encoding.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Formats a digest as `<name>:<hex>`.
#[must_use]
pub fn format_digest(algorithm: &dyn DigestAlgorithm, raw: &[u8]) -> String {
    format!("{}:{}", algorithm.name(), to_hex(raw))
}

/// Splits `<name>:<hex>` into its parts.
#[must_use]
pub fn split_digest(value: &str) -> Option<(&str, &str)> {
    value
        .split_once(':')
        .filter(|(name, hex)| !name.is_empty() && !hex.is_empty())
}

/// Digests a byte slice in one call.
#[must_use]
pub fn digest_bytes(algorithm: &dyn DigestAlgorithm, data: &[u8]) -> String {
    let mut state = algorithm.start();
    state.update(data);
    format_digest(algorithm, &state.finish())
}

/// A reader that hashes and counts every byte passing through it.
pub struct DigestingReader<R> {
    inner: R,
    state: Box<dyn DigestState>,
    count: u64,
}

impl<R: Read> DigestingReader<R> {
    /// Wraps `inner`, hashing with `algorithm`.
    pub fn new(inner: R, algorithm: &dyn DigestAlgorithm) -> Self {
        Self {
            inner,
            state: algorithm.start(),
            count: 0,
        }
    }

    /// Bytes read so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Finishes the hash, returning `(byte_count, raw_digest)`.
    #[must_use]
    pub fn finish(self) -> (u64, Vec<u8>) {
        (self.count, self.state.finish())
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.state.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            digest_bytes(&Sha256Digest, b"hello"),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(digest_by_name("SHA-256").unwrap().name(), "sha256");
        assert_eq!(digest_by_name("sha512").unwrap().name(), "sha512");
        assert!(digest_by_name("md5").is_none());
    }

    #[test]
    fn split() {
        assert_eq!(split_digest("sha256:abcd"), Some(("sha256", "abcd")));
        assert_eq!(split_digest("sha256:"), None);
        assert_eq!(split_digest("abcd"), None);
    }

    proptest! {
        #[test]
        fn streaming_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut reader = DigestingReader::new(&data[..], &Sha512Digest);
            io::copy(&mut reader, &mut io::sink()).unwrap();
            let (count, raw) = reader.finish();
            prop_assert_eq!(count, data.len() as u64);
            prop_assert_eq!(format_digest(&Sha512Digest, &raw), digest_bytes(&Sha512Digest, &data));
        }
    }
}
