//! API key handling.
//!
//! Keys are held in `secrecy` boxes so they never reach logs or debug output.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

/// A bearer key that won't be logged or displayed.
pub struct ApiKey(SecretBox<str>);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Expose the key. Only call this when building the request header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// `Authorization` header value.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.expose())
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let key = ApiKey::new("sk-very-secret");
        assert_eq!(format!("{:?}", key), "[REDACTED]");
        assert_eq!(key.expose(), "sk-very-secret");
        assert_eq!(key.bearer(), "Bearer sk-very-secret");
    }
}
