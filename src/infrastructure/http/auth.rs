//! Caller resolution from the `X-API-Key` header and the peer address.

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::domain::models::{ApiKeyConfig, Caller, IdentityParts, Tier, UserType};

use super::error::ApiError;
use super::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Configured API keys.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyRegistry {
    keys: Vec<ApiKeyConfig>,
}

impl ApiKeyRegistry {
    pub fn new(keys: Vec<ApiKeyConfig>) -> Self {
        Self { keys }
    }

    pub fn lookup(&self, presented: &str) -> Option<&ApiKeyConfig> {
        // Visit every entry so timing does not reveal the match position.
        self.keys.iter().fold(None, |found, entry| {
            let matches: bool = entry.key.as_bytes().ct_eq(presented.as_bytes()).into();
            found.or(matches.then_some(entry))
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The resolved caller plus the audience its key is registered for.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    pub caller: Caller,
    pub user_type: Option<UserType>,
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        let Some(header) = parts.headers.get(API_KEY_HEADER) else {
            return Ok(Self {
                caller: Caller::new(IdentityParts::new(None, ip_address), Tier::Free),
                user_type: None,
            });
        };

        // A key that was sent must be valid; never degrade to anonymous.
        let presented = header.to_str().map_err(|_| ApiError::InvalidApiKey)?;
        let entry = state
            .api_keys
            .lookup(presented)
            .ok_or(ApiError::InvalidApiKey)?;

        Ok(Self {
            caller: Caller::new(
                IdentityParts::new(entry.user_id.clone(), ip_address),
                entry.tier,
            ),
            user_type: Some(entry.user_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, tier: Tier) -> ApiKeyConfig {
        ApiKeyConfig {
            key: key.to_string(),
            user_id: Some(format!("user-{key}")),
            tier,
            user_type: UserType::JobSeeker,
        }
    }

    #[test]
    fn test_lookup() {
        let registry = ApiKeyRegistry::new(vec![entry("alpha", Tier::Basic), entry("beta", Tier::Admin)]);
        assert_eq!(registry.lookup("beta").unwrap().tier, Tier::Admin);
        assert_eq!(registry.lookup("alpha").unwrap().user_id.as_deref(), Some("user-alpha"));
        assert!(registry.lookup("alph").is_none());
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn test_lookup_rejects_prefix_and_extension() {
        let registry = ApiKeyRegistry::new(vec![entry("secret-key", Tier::Premium)]);
        assert!(registry.lookup("secret-key").is_some());
        assert!(registry.lookup("secret-kez").is_none());
        assert!(registry.lookup("secret-key2").is_none());
        assert!(registry.lookup("secret").is_none());
    }
}
