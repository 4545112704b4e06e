//! Basic authentication credentials
//!
//! Credentials are informational: a missing or malformed `Authorization`
//! header yields empty credentials instead of an error, leaving the decision
//! to the handler.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Username and password from a Basic `Authorization` header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    pub username: String,
    pub password: String,
}

impl AuthInfo {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse an `Authorization` header value
    pub fn parse(header: Option<&str>) -> Self {
        header.and_then(Self::decode).unwrap_or_default()
    }

    fn decode(header: &str) -> Option<Self> {
        let (scheme, token) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(token.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(Self::new(username, password))
    }

    /// Encode to an `Authorization` header value
    pub fn encode(&self) -> String {
        let combined = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(combined))
    }

    /// True when no credentials were supplied
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}
