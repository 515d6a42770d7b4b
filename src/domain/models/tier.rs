//! Service tiers and their quota tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named service level that selects a quota row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Basic,
    Premium,
    Admin,
}

impl Tier {
    pub const ALL: [Self; 4] = [Self::Free, Self::Basic, Self::Premium, Self::Admin];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Admin => "admin",
        }
    }

    /// Lenient lookup used at the edges: unknown names fall back to `Free`.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a tier name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// Quota row for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub tokens_per_minute: u64,
    /// Reported in usage stats; not enforced by the limiter.
    pub tokens_per_day: u64,
}

impl TierLimits {
    pub const fn new(
        requests_per_minute: u32,
        requests_per_day: u32,
        tokens_per_minute: u64,
        tokens_per_day: u64,
    ) -> Self {
        Self {
            requests_per_minute,
            requests_per_day,
            tokens_per_minute,
            tokens_per_day,
        }
    }

    pub const fn defaults_for(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self::new(5, 100, 1_000, 10_000),
            Tier::Basic => Self::new(15, 500, 5_000, 50_000),
            Tier::Premium => Self::new(30, 2_000, 15_000, 150_000),
            Tier::Admin => Self::new(100, 10_000, 50_000, 500_000),
        }
    }
}

fn default_free() -> TierLimits {
    TierLimits::defaults_for(Tier::Free)
}

fn default_basic() -> TierLimits {
    TierLimits::defaults_for(Tier::Basic)
}

fn default_premium() -> TierLimits {
    TierLimits::defaults_for(Tier::Premium)
}

fn default_admin() -> TierLimits {
    TierLimits::defaults_for(Tier::Admin)
}

/// Quota table for every tier. Individual rows can be overridden in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTable {
    #[serde(default = "default_free")]
    pub free: TierLimits,
    #[serde(default = "default_basic")]
    pub basic: TierLimits,
    #[serde(default = "default_premium")]
    pub premium: TierLimits,
    #[serde(default = "default_admin")]
    pub admin: TierLimits,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            free: default_free(),
            basic: default_basic(),
            premium: default_premium(),
            admin: default_admin(),
        }
    }
}

impl TierTable {
    pub const fn get(&self, tier: Tier) -> &TierLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Basic => &self.basic,
            Tier::Premium => &self.premium,
            Tier::Admin => &self.admin,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, &TierLimits)> {
        Tier::ALL.into_iter().map(|tier| (tier, self.get(tier)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tier_defaults_to_free() {
        assert_eq!(Tier::from_name("platinum"), Tier::Free);
        assert_eq!(Tier::from_name("PREMIUM"), Tier::Premium);
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn test_default_table_matches_published_quotas() {
        let table = TierTable::default();
        assert_eq!(table.get(Tier::Free), &TierLimits::new(5, 100, 1_000, 10_000));
        assert_eq!(table.get(Tier::Basic).requests_per_minute, 15);
        assert_eq!(table.get(Tier::Premium).tokens_per_minute, 15_000);
        assert_eq!(table.get(Tier::Admin).requests_per_day, 10_000);
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let yaml = "basic:\n  requests_per_minute: 20\n  requests_per_day: 600\n  tokens_per_minute: 6000\n  tokens_per_day: 60000\n";
        let table: TierTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.basic.requests_per_minute, 20);
        assert_eq!(table.free, TierLimits::defaults_for(Tier::Free));
    }
}
