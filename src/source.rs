// src/source.rs
//! Identifiers of the independent upstream feeds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four upstream feeds the dashboard polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Market,
    Risk,
    Opportunities,
    Signals,
}

impl SourceId {
    /// Every source, in the order the dashboard lists them.
    pub const ALL: [SourceId; 4] = [
        SourceId::Market,
        SourceId::Risk,
        SourceId::Opportunities,
        SourceId::Signals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::Market => "market",
            SourceId::Risk => "risk",
            SourceId::Opportunities => "opportunities",
            SourceId::Signals => "signals",
        }
    }

    /// Upper-case form used in environment variable names (`DASHBOARD_MARKET_ENDPOINT`).
    pub fn env_key(self) -> &'static str {
        match self {
            SourceId::Market => "MARKET",
            SourceId::Risk => "RISK",
            SourceId::Opportunities => "OPPORTUNITIES",
            SourceId::Signals => "SIGNALS",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown source '{0}'")]
pub struct UnknownSource(pub String);

impl FromStr for SourceId {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(SourceId::Market),
            "risk" => Ok(SourceId::Risk),
            "opportunities" | "opportunity" => Ok(SourceId::Opportunities),
            "signals" => Ok(SourceId::Signals),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}
