//! Public entry identifiers.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of random bytes behind every slug (72 bits).
pub const SLUG_BYTES: usize = 9;

/// A random, URL-safe identifier for an entry.
///
/// Slugs carry no information about the content or the uploaded name.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Draw a fresh slug from the operating system's CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SLUG_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a slug, accepting only the unpadded base64url alphabet.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidSlug("empty slug".to_string()));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(crate::Error::InvalidSlug(format!(
                "unexpected character in slug: {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Recover the slug from a request name such as `AbCd.tar.gz`.
    ///
    /// Everything from the first `.` onward is cosmetic and discarded.
    pub fn from_request_name(name: &str) -> crate::Result<Self> {
        let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
        Self::parse(stem)
    }

    /// Get the slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slug({})", self.0)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}
