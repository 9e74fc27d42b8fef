//! API key shape checks.
//!
//! This only catches obvious typos before a network call is made; the
//! provider is the real authority on whether a key works.

use std::fmt;
use thiserror::Error;

const KEY_PREFIX: &str = "sk-";

/// Length of a legacy OpenAI secret key.
pub const STRICT_KEY_LEN: usize = 51;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no API key provided")]
    Missing,
    #[error("API key must start with \"sk-\"")]
    BadPrefix,
    #[error("API key must be {expected} characters long, got {actual}")]
    BadLength { expected: usize, actual: usize },
}

/// An API key that passed the shape check. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validate `raw`. `strict` additionally requires the legacy fixed length.
    pub fn parse(raw: &str, strict: bool) -> Result<Self, CredentialError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(CredentialError::Missing);
        }
        if !key.starts_with(KEY_PREFIX) {
            return Err(CredentialError::BadPrefix);
        }
        let len = key.chars().count();
        if strict && len != STRICT_KEY_LEN {
            return Err(CredentialError::BadLength {
                expected: STRICT_KEY_LEN,
                actual: len,
            });
        }
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let skip = self.0.chars().count().saturating_sub(4);
        let tail: String = self.0.chars().skip(skip).collect();
        write!(f, "ApiKey(sk-...{tail})")
    }
}
