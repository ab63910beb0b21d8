// src/payload.rs
//! Canonical (alias-resolved) payload shapes, one per upstream source.
//!
//! Every field is always present; numbers default to `0`, lists to empty.
//! `Option` is used only where "no data yet" must stay distinguishable from
//! zero on screen (volatility, activity index, temperatures, dates).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::source::SourceId;

/// Normalized payload of one successful poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CanonicalPayload {
    Market(MarketPayload),
    Risk(ScorePayload),
    Opportunities(ScorePayload),
    Signals(SignalsPayload),
}

impl CanonicalPayload {
    /// Empty payload for a source; what a non-object document normalizes to.
    pub fn empty(source: SourceId) -> Self {
        match source {
            SourceId::Market => CanonicalPayload::Market(MarketPayload::default()),
            SourceId::Risk => CanonicalPayload::Risk(ScorePayload::default()),
            SourceId::Opportunities => CanonicalPayload::Opportunities(ScorePayload::default()),
            SourceId::Signals => CanonicalPayload::Signals(SignalsPayload::default()),
        }
    }

    pub fn source(&self) -> SourceId {
        match self {
            CanonicalPayload::Market(_) => SourceId::Market,
            CanonicalPayload::Risk(_) => SourceId::Risk,
            CanonicalPayload::Opportunities(_) => SourceId::Opportunities,
            CanonicalPayload::Signals(_) => SourceId::Signals,
        }
    }

    pub fn as_market(&self) -> Option<&MarketPayload> {
        match self {
            CanonicalPayload::Market(m) => Some(m),
            _ => None,
        }
    }

    /// Risk and opportunity feeds share the score shape.
    pub fn as_score(&self) -> Option<&ScorePayload> {
        match self {
            CanonicalPayload::Risk(s) | CanonicalPayload::Opportunities(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_signals(&self) -> Option<&SignalsPayload> {
        match self {
            CanonicalPayload::Signals(s) => Some(s),
            _ => None,
        }
    }
}

/// A single stock row, fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalStock {
    /// Never empty; `"UNKNOWN"` when no alias resolved.
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    /// Always `>= 0`.
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub volume: f64,
}

pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

impl Default for CanonicalStock {
    fn default() -> Self {
        Self {
            symbol: UNKNOWN_SYMBOL.to_string(),
            name: String::new(),
            price: 0.0,
            change: 0.0,
            change_percent: 0.0,
            volume: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketPayload {
    pub gainers: Vec<CanonicalStock>,
    pub losers: Vec<CanonicalStock>,
    pub prices: Vec<CanonicalStock>,
    /// Headline index value (ASPI) when the summary carries one.
    pub index: Option<f64>,
    pub status: Option<String>,
}

/// Score plus contributing factors; the shape of both the risk and the
/// opportunity feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorePayload {
    /// In `[0, 1]`.
    pub score: f64,
    pub factors: Vec<String>,
}

/// The risk feed's canonical state.
pub type RiskState = ScorePayload;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalsPayload {
    pub activity_index: Option<f64>,
    pub volatility_percent: Option<f64>,
    pub news: Vec<NewsItem>,
    pub weather: Vec<WeatherSummary>,
    pub weather_alerts: Vec<String>,
    pub traffic: Vec<TrafficReading>,
    /// Currency code -> local units per one unit of that currency.
    pub exchange_rates: BTreeMap<String, f64>,
    pub events: Vec<EventItem>,
    pub anomalies: Vec<Anomaly>,
    pub trends: Vec<TrendItem>,
    pub clusters: Vec<String>,
    pub market_anomaly: Option<MarketAnomaly>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub city: String,
    pub temp: Option<f64>,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficReading {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub congestion_percent: f64,
    pub incident_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventItem {
    pub name: String,
    pub date: Option<String>,
}

/// ML-reported anomaly. `severity` is the raw upstream string; the alert
/// aggregator maps it onto [`crate::alerts::Severity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub description: String,
    pub severity: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendItem {
    pub description: String,
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketAnomaly {
    pub detected: bool,
    pub score: f64,
}
