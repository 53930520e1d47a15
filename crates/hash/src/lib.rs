#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! SHA-1 content identities for dopamine
//!
//! Recipe revisions, profile digests and build ids are all SHA-1 based.
//! This crate wraps the primitive so callers feed bytes through a
//! [`Digester`] and read back a [`Checksum`].

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use dop_errors::{Error, StateError};

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024;

/// A SHA-1 checksum value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum {
    bytes: [u8; 20],
}

impl Checksum {
    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.bytes
    }

    /// Full lowercase hex form (40 characters)
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Hex of the first 8 bytes (16 characters), used for recipe revisions
    #[must_use]
    pub fn to_short_hex(&self) -> String {
        hex::encode(&self.bytes[..8])
    }

    /// Parse from a 40-character hex string
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex of exactly 20 bytes.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|e| StateError::InvalidState {
            path: String::new(),
            message: format!("invalid hex: {e}"),
        })?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| StateError::InvalidState {
            path: String::new(),
            message: "checksum must be 20 bytes".to_string(),
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Checksum of a byte slice
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        let mut digester = Digester::new();
        digester.feed(data);
        digester.finish()
    }

    /// Checksum of a file's contents
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn hash_file(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;

        let mut digester = Digester::new();
        let mut buffer = vec![0; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            digester.feed(&buffer[..n]);
        }
        Ok(digester.finish())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-1 computation
///
/// Components that participate in an identity expose a
/// `feed_digest(&mut Digester)` method and leave finishing to the caller.
#[derive(Default)]
pub struct Digester {
    inner: Sha1,
}

impl Digester {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: impl AsRef<[u8]>) {
        self.inner.update(bytes.as_ref());
    }

    /// Feed a string with a trailing separator byte
    ///
    /// The separator keeps adjacent fields from running together, so
    /// `("ab", "c")` and `("a", "bc")` digest differently.
    pub fn feed_field(&mut self, field: impl AsRef<str>) {
        self.inner.update(field.as_ref().as_bytes());
        self.inner.update([0u8]);
    }

    #[must_use]
    pub fn finish(self) -> Checksum {
        let digest = self.inner.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Checksum::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sha1() {
        // sha1("abc")
        let sum = Checksum::from_data(b"abc");
        assert_eq!(sum.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(sum.to_short_hex(), "a9993e364706816a");
    }

    #[test]
    fn hex_round_trip() {
        let sum = Checksum::from_data(b"hello");
        let parsed = Checksum::from_hex(&sum.to_hex()).unwrap();
        assert_eq!(sum, parsed);
    }

    #[test]
    fn field_separator_disambiguates() {
        let mut a = Digester::new();
        a.feed_field("ab");
        a.feed_field("c");
        let mut b = Digester::new();
        b.feed_field("a");
        b.feed_field("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[tokio::test]
    async fn file_hash_matches_data_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"contents").unwrap();
        let from_file = Checksum::hash_file(&path).await.unwrap();
        assert_eq!(from_file, Checksum::from_data(b"contents"));
    }
}
