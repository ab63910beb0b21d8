// src/normalize/aliases.rs
//! The alias table: for every canonical field, the ordered list of key paths
//! upstream deployments have used for it.
//!
//! - Paths are dot-separated (`news.latest`) and resolved against a JSON object.
//! - Lookup order: configured overrides first, then the built-in list.
//! - The first path that yields a usable value wins.
//!
//! Adding an alias is a data change (built-in list or `[aliases]` in the
//! config file), never a code change in the consumers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Canonical fields that go through alias resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    // market
    MarketGainers,
    MarketLosers,
    MarketPrices,
    MarketIndex,
    MarketStatus,
    StockSymbol,
    StockName,
    StockPrice,
    StockChange,
    StockChangePercent,
    StockVolume,
    // risk / opportunities
    Score,
    Factors,
    FactorText,
    // signals
    ActivityIndex,
    VolatilityPercent,
    NewsList,
    NewsTitle,
    NewsSource,
    NewsUrl,
    NewsPublishedAt,
    WeatherList,
    WeatherAlerts,
    WeatherCity,
    WeatherTemp,
    WeatherCondition,
    TrafficList,
    TrafficCity,
    TrafficLat,
    TrafficLon,
    TrafficCongestion,
    TrafficIncidents,
    RatesMap,
    RateValue,
    EventsList,
    EventName,
    EventDate,
    AnomalyList,
    AnomalyDescription,
    AnomalySeverity,
    AnomalyType,
    TrendList,
    TrendDescription,
    TrendCount,
    ClusterList,
    ClusterLabel,
    MarketAnomalyDetected,
    MarketAnomalyScore,
}

impl FromStr for Field {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.trim().to_ascii_lowercase()))
    }
}

/// Built-in aliases, most preferred first.
const BUILTIN: &[(Field, &[&str])] = &[
    (Field::MarketGainers, &["gainers", "topGainers", "top_gainers"]),
    (Field::MarketLosers, &["losers", "topLosers", "top_losers"]),
    (Field::MarketPrices, &["prices", "stocks", "tradeSummary"]),
    (
        Field::MarketIndex,
        &[
            "summary.aspi",
            "summary.ASPI",
            "summary.marketIndex",
            "summary.index",
            "index",
        ],
    ),
    (
        Field::MarketStatus,
        &["status.status", "status.marketStatus", "status"],
    ),
    (Field::StockSymbol, &["symbol", "code"]),
    (Field::StockName, &["name", "securityName"]),
    (Field::StockPrice, &["price", "lastTradedPrice"]),
    (Field::StockChange, &["change", "changeAmount"]),
    (
        Field::StockChangePercent,
        &["changePercent", "percentageChange", "changePercentage"],
    ),
    (Field::StockVolume, &["volume", "shareVolume", "tradeVolume"]),
    (
        Field::Score,
        &["score", "risk_score", "riskScore", "opportunity_score"],
    ),
    (Field::Factors, &["factors", "reasons"]),
    (Field::FactorText, &["description", "title"]),
    (
        Field::ActivityIndex,
        &["national_activity_score", "activity_score", "activityIndex"],
    ),
    (
        Field::VolatilityPercent,
        &["market_volatility_percent", "volatility", "volatilityPercent"],
    ),
    (Field::NewsList, &["news.latest", "news"]),
    (Field::NewsTitle, &["title", "headline"]),
    (Field::NewsSource, &["source", "publisher"]),
    (Field::NewsUrl, &["url", "link"]),
    (Field::NewsPublishedAt, &["published_at", "publishedAt", "date"]),
    (Field::WeatherList, &["weather.summaries", "weather"]),
    (Field::WeatherAlerts, &["weather.alerts", "weather_alerts"]),
    (Field::WeatherCity, &["city", "name"]),
    (Field::WeatherTemp, &["temp", "temperature", "main.temp"]),
    (Field::WeatherCondition, &["condition", "main", "weather.0.main"]),
    (Field::TrafficList, &["traffic.raw", "traffic"]),
    (Field::TrafficCity, &["city", "name"]),
    (Field::TrafficLat, &["lat", "latitude"]),
    (Field::TrafficLon, &["lon", "lng", "longitude"]),
    (Field::TrafficCongestion, &["congestion_percent", "congestion"]),
    (Field::TrafficIncidents, &["incident_count", "incidents"]),
    (Field::RatesMap, &["cbsl.raw.rates", "cbsl.rates", "rates"]),
    (Field::RateValue, &["lkr_per_unit", "rate", "value"]),
    (Field::EventsList, &["events.upcoming", "events"]),
    (Field::EventName, &["name", "localName"]),
    (Field::EventDate, &["date"]),
    (Field::AnomalyList, &["anomalies", "ml_anomalies"]),
    (Field::AnomalyDescription, &["description", "message"]),
    (Field::AnomalySeverity, &["severity", "level"]),
    (Field::AnomalyType, &["type", "kind"]),
    (Field::TrendList, &["trends", "ml_trends"]),
    (Field::TrendDescription, &["description", "title"]),
    (Field::TrendCount, &["count"]),
    (Field::ClusterList, &["clusters", "ml_clusters"]),
    (Field::ClusterLabel, &["label", "name", "description"]),
    (Field::MarketAnomalyDetected, &["market_anomaly.detected"]),
    (Field::MarketAnomalyScore, &["market_anomaly.score"]),
];

/// Ordered alias paths per canonical field.
#[derive(Debug, Clone)]
pub struct AliasTable {
    paths: HashMap<Field, Vec<Vec<String>>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AliasTable {
    pub fn builtin() -> Self {
        let mut paths = HashMap::with_capacity(BUILTIN.len());
        for (field, aliases) in BUILTIN {
            paths.insert(*field, aliases.iter().map(|a| split_path(a)).collect());
        }
        Self { paths }
    }

    /// Built-in table with configured aliases placed in front.
    ///
    /// Keys are canonical field names (`stock_symbol`); unknown keys are
    /// skipped with a warning so a typo in config never stops the poller.
    pub fn with_overrides(overrides: &HashMap<String, Vec<String>>) -> Self {
        let mut table = Self::builtin();
        for (name, extra) in overrides {
            match name.parse::<Field>() {
                Ok(field) => table.prepend(field, extra),
                Err(_) => tracing::warn!(field = %name, "ignoring alias override for unknown field"),
            }
        }
        table
    }

    pub fn prepend(&mut self, field: Field, extra: &[String]) {
        let entry = self.paths.entry(field).or_default();
        let mut merged: Vec<Vec<String>> = extra
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(split_path)
            .collect();
        for existing in entry.drain(..) {
            if !merged.contains(&existing) {
                merged.push(existing);
            }
        }
        *entry = merged;
    }

    /// Alias paths for a field, most preferred first.
    pub fn paths(&self, field: Field) -> &[Vec<String>] {
        self.paths.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Walk the alias list and return the first value `extract` accepts.
    pub fn first<'a, T>(
        &self,
        field: Field,
        obj: &'a Value,
        extract: impl Fn(&'a Value) -> Option<T>,
    ) -> Option<T> {
        self.paths(field)
            .iter()
            .filter_map(|path| lookup(obj, path))
            .find_map(extract)
    }
}

fn split_path(p: &str) -> Vec<String> {
    p.split('.').map(str::to_string).collect()
}

/// Follow a key path; numeric segments index into arrays.
fn lookup<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path {
        cur = match cur {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if cur.is_null() {
        None
    } else {
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_field_has_builtin_aliases() {
        let table = AliasTable::builtin();
        for (field, _) in BUILTIN {
            assert!(!table.paths(*field).is_empty(), "{field:?} has no aliases");
        }
    }

    #[test]
    fn nested_paths_and_array_indices_resolve() {
        let table = AliasTable::builtin();
        let v = json!({ "weather": [{ "main": "Rain" }] });
        let got = table.first(Field::WeatherCondition, &v, Value::as_str);
        assert_eq!(got, Some("Rain"));
    }

    #[test]
    fn overrides_take_precedence_and_unknown_fields_are_ignored() {
        let mut overrides = HashMap::new();
        overrides.insert("stock_symbol".to_string(), vec!["ticker".to_string()]);
        overrides.insert("no_such_field".to_string(), vec!["x".to_string()]);
        let table = AliasTable::with_overrides(&overrides);

        let v = json!({ "ticker": "JKH", "symbol": "OLD" });
        assert_eq!(table.first(Field::StockSymbol, &v, Value::as_str), Some("JKH"));
        // built-ins still follow the override
        assert_eq!(table.paths(Field::StockSymbol).len(), 3);
    }

    #[test]
    fn null_values_fall_through_to_next_alias() {
        let table = AliasTable::builtin();
        let v = json!({ "symbol": null, "code": "COMB" });
        assert_eq!(table.first(Field::StockSymbol, &v, Value::as_str), Some("COMB"));
    }
}
