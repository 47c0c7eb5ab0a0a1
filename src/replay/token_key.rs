//! Content addresses for `(token text, position)` pairs.
//!
//! A key is used to answer "is this the same token at the same position as one we
//! already have KV data for?" across a request boundary. The position disambiguates
//! repeated text; the hash only mixes in the text so two different tokens at one
//! position never compare equal.

use std::fmt;

use serde::{Serialize, Serializer};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Content address of a token at a position.
///
/// Displays as `hhhhhhhh:position` (8 lowercase hex digits of the text hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey {
    hash: u32,
    position: usize,
}

impl TokenKey {
    /// Derive the key for `text` at `position`. Never fails.
    pub fn new(text: &str, position: usize) -> Self {
        Self {
            hash: hash_text(text),
            position,
        }
    }

    /// Key for an optional token; missing text hashes as the empty string.
    pub fn for_token(text: Option<&str>, position: usize) -> Self {
        Self::new(text.unwrap_or_default(), position)
    }

    /// Key for `tokens[position]`, treating an out-of-range position as empty text.
    pub fn lookup(tokens: &[String], position: usize) -> Self {
        Self::for_token(tokens.get(position).map(String::as_str), position)
    }

    pub fn text_hash(&self) -> u32 {
        self.hash
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{}", self.hash, self.position)
    }
}

impl Serialize for TokenKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// FNV-1a over UTF-16 code units, so keys line up with the browser-side viewer.
fn hash_text(text: &str) -> u32 {
    text.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}
