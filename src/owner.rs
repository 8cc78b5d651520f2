//! Resolves the submitting user from an authentication token.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::OwnerError;

#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// Returns the owner id the token belongs to.
    async fn resolve(&self, token: &str) -> Result<String, OwnerError>;
}

/// Fixed token → owner table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticOwnerDirectory {
    tokens: HashMap<String, String>,
}

impl StaticOwnerDirectory {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn resolve(&self, token: &str) -> Result<String, OwnerError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(OwnerError::MissingToken);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(OwnerError::UnknownToken)
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, OwnerError> {
    let value = header.ok_or(OwnerError::MissingToken)?.trim();
    let (scheme, token) = value.split_once(' ').ok_or(OwnerError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(OwnerError::MissingToken);
    }
    Ok(token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticOwnerDirectory {
        StaticOwnerDirectory::new(HashMap::from([("tok-1".to_string(), "alice".to_string())]))
    }

    #[tokio::test]
    async fn resolves_known_token() {
        assert_eq!(directory().resolve("tok-1").await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn rejects_unknown_and_empty_tokens() {
        let dir = directory();
        assert_eq!(dir.resolve("nope").await.unwrap_err(), OwnerError::UnknownToken);
        assert_eq!(dir.resolve("  ").await.unwrap_err(), OwnerError::MissingToken);
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(Some("bearer   abc ")).unwrap(), "abc");
        assert_eq!(bearer_token(None).unwrap_err(), OwnerError::MissingToken);
        assert_eq!(bearer_token(Some("Basic abc")).unwrap_err(), OwnerError::MissingToken);
        assert_eq!(bearer_token(Some("Bearer")).unwrap_err(), OwnerError::MissingToken);
    }
}
