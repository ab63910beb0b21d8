// src/normalize/mod.rs
//! Field Normalizer: turns one raw upstream document into its canonical
//! payload.
//!
//! Normalization is total. Missing or renamed fields resolve through the
//! [`AliasTable`]; numbers that cannot be resolved become `0`; a document that
//! is not an object at all becomes the source's empty payload.

pub mod aliases;
pub mod text;

pub use aliases::{AliasTable, Field};
pub use text::clean_text;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::payload::{
    Anomaly, CanonicalPayload, CanonicalStock, EventItem, MarketAnomaly, MarketPayload, NewsItem,
    ScorePayload, SignalsPayload, TrafficReading, TrendItem, WeatherSummary, UNKNOWN_SYMBOL,
};
use crate::source::SourceId;

const UNKNOWN_LABEL: &str = "Unknown";

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(Normalizer::default);

/// Normalize with the built-in alias table.
pub fn normalize(source: SourceId, raw: &Value) -> CanonicalPayload {
    DEFAULT_NORMALIZER.normalize(source, raw)
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    aliases: AliasTable,
}

impl Normalizer {
    pub fn new(aliases: AliasTable) -> Self {
        Self { aliases }
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn normalize(&self, source: SourceId, raw: &Value) -> CanonicalPayload {
        let doc = unwrap_envelope(raw);
        if !doc.is_object() {
            return CanonicalPayload::empty(source);
        }
        match source {
            SourceId::Market => CanonicalPayload::Market(self.market(doc)),
            SourceId::Risk => CanonicalPayload::Risk(self.score(doc)),
            SourceId::Opportunities => CanonicalPayload::Opportunities(self.score(doc)),
            SourceId::Signals => CanonicalPayload::Signals(self.signals(doc)),
        }
    }

    /// One stock record; every field resolved or defaulted.
    pub fn stock(&self, v: &Value) -> CanonicalStock {
        let a = &self.aliases;
        CanonicalStock {
            symbol: a
                .first(Field::StockSymbol, v, text)
                .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string()),
            name: a.first(Field::StockName, v, text).unwrap_or_default(),
            price: a.first(Field::StockPrice, v, number).unwrap_or(0.0).max(0.0),
            change: a.first(Field::StockChange, v, number).unwrap_or(0.0),
            change_percent: a.first(Field::StockChangePercent, v, number).unwrap_or(0.0),
            volume: a.first(Field::StockVolume, v, number).unwrap_or(0.0).max(0.0),
        }
    }

    fn stocks(&self, field: Field, doc: &Value) -> Vec<CanonicalStock> {
        self.objects(field, doc).map(|v| self.stock(v)).collect()
    }

    fn market(&self, doc: &Value) -> MarketPayload {
        let a = &self.aliases;
        MarketPayload {
            gainers: self.stocks(Field::MarketGainers, doc),
            losers: self.stocks(Field::MarketLosers, doc),
            prices: self.stocks(Field::MarketPrices, doc),
            index: a.first(Field::MarketIndex, doc, number),
            status: a.first(Field::MarketStatus, doc, text),
        }
    }

    fn score(&self, doc: &Value) -> ScorePayload {
        let a = &self.aliases;
        let raw = a.first(Field::Score, doc, number).unwrap_or(0.0);
        // Some deployments report 0-100 instead of 0-1.
        let score = if raw > 1.0 { raw / 100.0 } else { raw };

        let factors = a
            .first(Field::Factors, doc, Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|it| match it {
                        Value::Object(_) => a.first(Field::FactorText, it, text),
                        other => text(other),
                    })
                    .collect()
            })
            .unwrap_or_default();

        ScorePayload {
            score: score.clamp(0.0, 1.0),
            factors,
        }
    }

    fn signals(&self, doc: &Value) -> SignalsPayload {
        let a = &self.aliases;

        let news = self
            .objects(Field::NewsList, doc)
            .filter_map(|v| {
                Some(NewsItem {
                    title: a.first(Field::NewsTitle, v, text)?,
                    source: a
                        .first(Field::NewsSource, v, text)
                        .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                    url: a.first(Field::NewsUrl, v, text),
                    published_at: a.first(Field::NewsPublishedAt, v, text),
                })
            })
            .collect();

        let weather = self
            .objects(Field::WeatherList, doc)
            .map(|v| WeatherSummary {
                city: a
                    .first(Field::WeatherCity, v, text)
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                temp: a.first(Field::WeatherTemp, v, number),
                condition: a
                    .first(Field::WeatherCondition, v, text)
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            })
            .collect();

        let weather_alerts = a
            .first(Field::WeatherAlerts, doc, Value::as_array)
            .map(|items| items.iter().filter_map(text).collect())
            .unwrap_or_default();

        let traffic = self
            .objects(Field::TrafficList, doc)
            .map(|v| TrafficReading {
                city: a
                    .first(Field::TrafficCity, v, text)
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                lat: a.first(Field::TrafficLat, v, number).unwrap_or(0.0),
                lon: a.first(Field::TrafficLon, v, number).unwrap_or(0.0),
                congestion_percent: a
                    .first(Field::TrafficCongestion, v, number)
                    .unwrap_or(0.0)
                    .clamp(0.0, 100.0),
                incident_count: a.first(Field::TrafficIncidents, v, count).unwrap_or(0),
            })
            .collect();

        let exchange_rates = a
            .first(Field::RatesMap, doc, Value::as_object)
            .map(|rates| {
                rates
                    .iter()
                    .filter_map(|(code, v)| {
                        let rate = match v {
                            Value::Object(_) => a.first(Field::RateValue, v, number),
                            other => number(other),
                        }?;
                        Some((code.trim().to_ascii_uppercase(), rate))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let events = self
            .objects(Field::EventsList, doc)
            .filter_map(|v| {
                Some(EventItem {
                    name: a.first(Field::EventName, v, text)?,
                    date: a.first(Field::EventDate, v, text),
                })
            })
            .collect();

        let anomalies = self
            .objects(Field::AnomalyList, doc)
            .filter_map(|v| {
                Some(Anomaly {
                    description: a.first(Field::AnomalyDescription, v, text)?,
                    severity: a
                        .first(Field::AnomalySeverity, v, text)
                        .map(|s| s.to_ascii_lowercase()),
                    kind: a.first(Field::AnomalyType, v, text),
                })
            })
            .collect();

        let trends = self
            .objects(Field::TrendList, doc)
            .filter_map(|v| {
                Some(TrendItem {
                    description: a.first(Field::TrendDescription, v, text)?,
                    count: a.first(Field::TrendCount, v, count),
                })
            })
            .collect();

        let clusters = a
            .first(Field::ClusterList, doc, Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|it| match it {
                        Value::Object(_) => a.first(Field::ClusterLabel, it, text),
                        other => text(other),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let market_anomaly = a
            .first(Field::MarketAnomalyDetected, doc, flag)
            .map(|detected| MarketAnomaly {
                detected,
                score: a.first(Field::MarketAnomalyScore, doc, number).unwrap_or(0.0),
            });

        SignalsPayload {
            activity_index: a.first(Field::ActivityIndex, doc, number),
            volatility_percent: a.first(Field::VolatilityPercent, doc, number),
            news,
            weather,
            weather_alerts,
            traffic,
            exchange_rates,
            events,
            anomalies,
            trends,
            clusters,
            market_anomaly,
        }
    }

    /// Object elements of the first alias that resolves to an array.
    fn objects<'a>(&self, field: Field, doc: &'a Value) -> impl Iterator<Item = &'a Value> + 'a {
        self.aliases
            .first(field, doc, Value::as_array)
            .into_iter()
            .flatten()
            .filter(|v| v.is_object())
    }
}

/// `{"data": {...}}` envelopes are unwrapped (some gateways add one).
fn unwrap_envelope(raw: &Value) -> &Value {
    match raw {
        Value::Object(map) if map.len() == 1 => match map.get("data") {
            Some(inner) if inner.is_object() => inner,
            _ => raw,
        },
        _ => raw,
    }
}

fn number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").trim_end_matches('%').parse().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn count(v: &Value) -> Option<u64> {
    number(v).map(|n| n.max(0.0).round() as u64)
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = clean_text(s);
            (!t.is_empty()).then_some(t)
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|x| x != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
