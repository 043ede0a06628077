//! Persistent key-value storage and the byte <-> string codec.
//!
//! Game modules save and load raw byte blobs, but the storage contract only
//! carries string values (browser-style stores hold strings, nothing else).
//! The codec maps each byte to one character whose code point equals the byte
//! value (U+0000-U+00FF). Existing stores depend on this exact encoding, so
//! it must not be replaced with a denser one.

use crate::error::{BridgeError, Result};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

/// Chunk size used when building an encoded value.
///
/// The output is chunk-size invariant; 1024 is kept for parity with hosts
/// that assemble the string through bulk char-code calls with an argument cap.
pub const ENCODE_CHUNK: usize = 1024;

/// Encode a byte sequence as a string, one character per byte.
pub fn encode_value(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.chunks(ENCODE_CHUNK) {
        out.extend(chunk.iter().map(|&b| char::from(b)));
    }
    out
}

/// Decode a stored string back into bytes, one byte per character.
///
/// Characters above U+00FF can only come from a foreign writer; they are
/// truncated to their low byte rather than failing the read.
pub fn decode_value(text: &str) -> Vec<u8> {
    text.chars().map(|c| (c as u32) as u8).collect()
}

/// A string-keyed, string-valued storage backend.
///
/// `set` surfaces rejection (quota exceeded, backend unavailable) as an `Err`
/// value; it must never block on retries. Entries persist until the backend
/// is cleared externally; there is no delete in this contract.
pub trait StorageBackend {
    /// Look up the value stored under `key`.
    fn get(&self, key: &str) -> Option<&str>;

    /// Create or overwrite the entry under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

/// In-memory storage backend with an optional byte quota.
///
/// The quota counts encoded value bytes across all entries and makes the
/// quota-exceeded failure path reproducible in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Create an unbounded in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes once `bytes` of values are held.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            quota: Some(bytes),
        }
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            let held: usize = self
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            if held + value.len() > quota {
                return Err(BridgeError::Storage(format!(
                    "quota of {quota} bytes exceeded writing key {key:?}"
                )));
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed storage: a JSON object of key -> encoded value, written
/// through on every `set`.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileStorage {
    /// Open a store at `path`, loading existing entries if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader).map_err(|e| {
                BridgeError::Storage(format!("corrupt store file {}: {e}", path.display()))
            })?
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(&mut writer, &self.entries).map_err(|e| {
            BridgeError::Storage(format!("failed to write store {}: {e}", self.path.display()))
        })?;
        writer.flush()?;
        Ok(())
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn test_codec_round_trip_across_chunk_boundary() {
        for len in [0, 1, 1023, 1024, 1025, 4096] {
            let bytes = pattern(len);
            let encoded = encode_value(&bytes);
            assert_eq!(encoded.chars().count(), len);
            assert_eq!(decode_value(&encoded), bytes, "length {len}");
        }
    }

    #[test]
    fn test_codec_is_chunk_size_invariant() {
        let bytes = pattern(4096);
        let unchunked: String = bytes.iter().map(|&b| char::from(b)).collect();
        assert_eq!(encode_value(&bytes), unchunked);
    }

    #[test]
    fn test_codec_char_code_equals_byte_value() {
        let encoded = encode_value(&[0, 65, 128, 255]);
        let codes: Vec<u32> = encoded.chars().map(u32::from).collect();
        assert_eq!(codes, vec![0, 65, 128, 255]);
    }

    #[test]
    fn test_decode_truncates_foreign_characters() {
        // U+0141 came from a writer that did not use this codec; keep the
        // low byte instead of failing the whole read.
        assert_eq!(decode_value("\u{0141}A"), vec![0x41, 0x41]);
    }

    #[test]
    fn test_memory_storage_overwrites() {
        let mut store = MemoryStorage::new();
        store.set("slot", "one").unwrap();
        store.set("slot", "two").unwrap();
        assert_eq!(store.get("slot"), Some("two"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_storage_quota_rejects() {
        let mut store = MemoryStorage::with_quota(8);
        store.set("a", "12345678").unwrap();
        let err = store.set("b", "9").unwrap_err();
        assert!(matches!(err, BridgeError::Storage(_)));
        // Rewriting an existing key within quota still works.
        store.set("a", "1234").unwrap();
        assert_eq!(store.get("a"), Some("1234"));
        assert_eq!(store.get("b"), None);
    }

    #[test]
    fn test_file_storage_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "gamebridge-store-test-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let value = encode_value(&pattern(300));
        {
            let mut store = FileStorage::open(&path).unwrap();
            assert!(store.get("save0").is_none());
            store.set("save0", &value).unwrap();
        }
        {
            let store = FileStorage::open(&path).unwrap();
            assert_eq!(store.get("save0"), Some(value.as_str()));
            assert_eq!(decode_value(store.get("save0").unwrap()), pattern(300));
        }

        let _ = std::fs::remove_file(&path);
    }
}
