//! Rate-limit identities.
//!
//! Every request is attributed to exactly one identity. An authenticated
//! user always wins over the caller's network address, and requests that
//! carry neither share a single anonymous bucket.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw identifying facts about a caller, as extracted at the edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityParts {
    /// Authenticated user id, when the caller presented valid credentials.
    pub user_id: Option<String>,
    /// Remote network address.
    pub ip_address: Option<String>,
}

impl IdentityParts {
    pub fn new(user_id: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            user_id,
            ip_address,
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ip_address: None,
        }
    }

    pub fn ip(address: impl Into<String>) -> Self {
        Self {
            user_id: None,
            ip_address: Some(address.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Resolve the identity these parts are limited under.
    pub fn identity(&self) -> Identity {
        Identity::resolve(self.user_id.as_deref(), self.ip_address.as_deref())
    }
}

/// The key under which usage is counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Identity {
    User(String),
    Ip(String),
    Anonymous,
}

impl Identity {
    /// User id takes precedence over IP; blank values count as absent.
    pub fn resolve(user_id: Option<&str>, ip_address: Option<&str>) -> Self {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|s| !s.is_empty())
        }

        if let Some(id) = present(user_id) {
            Self::User(id.to_string())
        } else if let Some(ip) = present(ip_address) {
            Self::Ip(ip.to_string())
        } else {
            Self::Anonymous
        }
    }

    /// Storage key fragment, e.g. `user:42`, `ip:10.0.0.1` or `anonymous`.
    pub fn key(&self) -> String {
        match self {
            Self::User(id) => format!("user:{id}"),
            Self::Ip(ip) => format!("ip:{ip}"),
            Self::Anonymous => "anonymous".to_string(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
