//! Capture context helpers: credential hashing and bounded byte buffers.

use sha2::{Digest, Sha256};

use codepromptu_types::limits::{API_KEY_HASH_LEN, MAX_CAPTURE_BYTES};

/// One-way, truncated hash of a client credential.
///
/// SHA-256 over the full credential, hex-encoded and cut to 16 chars:
/// enough for audit grouping, not enough to brute-force the key. The
/// plaintext credential never reaches persistent storage.
#[must_use]
pub fn hash_credential(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(API_KEY_HASH_LEN);
    hash
}

/// Byte buffer capped at the capture limit; overflow sets a flag and
/// truncates instead of growing.
#[derive(Debug)]
pub struct CaptureBuffer {
    buf: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new(MAX_CAPTURE_BYTES)
    }
}

impl CaptureBuffer {
    /// Buffer capped at `cap` bytes.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        CaptureBuffer {
            buf: Vec::new(),
            cap,
            truncated: false,
        }
    }

    /// Append bytes, keeping the cap; excess is dropped and flagged.
    pub fn extend(&mut self, bytes: &[u8]) {
        let room = self.cap.saturating_sub(self.buf.len());
        if bytes.len() > room {
            self.truncated = true;
        }
        let take = room.min(bytes.len());
        self.buf.extend_from_slice(&bytes[..take]);
    }

    /// Whether any append overflowed the cap.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Bytes captured so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
