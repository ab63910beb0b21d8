// src/projection.rs
//! # View Projection
//! Pure mapping from an [`AggregateView`] to per-surface view models.
//!
//! Surfaces never see raw payloads or absent values: missing scalars are
//! `"-"`, missing lists are empty.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::alerts::{CanonicalAlert, Severity};
use crate::derived::{
    congestion_level, format_fixed, format_signed, format_signed_percent, price_direction,
    CongestionLevel, Direction, RiskBand, Trend, PLACEHOLDER,
};
use crate::payload::CanonicalStock;
use crate::source::SourceId;
use crate::store::{AggregateView, SourceStatus};

const MOVERS_PER_SIDE: usize = 3;
const MARKET_TABLE_ROWS: usize = 10;
const INSIGHT_TRENDS: usize = 3;
const INSIGHT_CLUSTERS: usize = 3;
const RECURRING_MARKER: &str = "(recurring; see schedule)";
const DATE_PLACEHOLDER: &str = "YYYY-MM-DD";

/// Currencies shown against LKR, in display order.
pub const DISPLAY_CURRENCIES: [(&str, &str); 5] = [
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("JPY", "Japanese Yen"),
    ("INR", "Indian Rupee"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Header,
    Stats,
    MarketMovers,
    MarketTable,
    Alerts,
    Insights,
    News,
    Weather,
    Events,
    ExchangeRates,
    Traffic,
    Sources,
}

impl Surface {
    pub const ALL: [Surface; 12] = [
        Surface::Header,
        Surface::Stats,
        Surface::MarketMovers,
        Surface::MarketTable,
        Surface::Alerts,
        Surface::Insights,
        Surface::News,
        Surface::Weather,
        Surface::Events,
        Surface::ExchangeRates,
        Surface::Traffic,
        Surface::Sources,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Header => "header",
            Surface::Stats => "stats",
            Surface::MarketMovers => "market_movers",
            Surface::MarketTable => "market_table",
            Surface::Alerts => "alerts",
            Surface::Insights => "insights",
            Surface::News => "news",
            Surface::Weather => "weather",
            Surface::Events => "events",
            Surface::ExchangeRates => "exchange_rates",
            Surface::Traffic => "traffic",
            Surface::Sources => "sources",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown surface '{0}'")]
pub struct UnknownSurface(pub String);

impl FromStr for Surface {
    type Err = UnknownSurface;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Surface::ALL
            .into_iter()
            .find(|sf| sf.as_str() == key)
            .ok_or_else(|| UnknownSurface(s.to_string()))
    }
}

// ---- view models ----

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderView {
    pub live: bool,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatCard {
    pub title: &'static str,
    pub value: String,
    pub description: &'static str,
    pub trend: Trend,
    pub trend_label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsView {
    pub cards: Vec<StatCard>,
    pub risk_band: RiskBand,
    pub risk_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockRow {
    pub symbol: String,
    pub name: String,
    pub price: String,
    pub change: String,
    pub change_percent: String,
    pub volume: String,
    pub direction: Direction,
}

impl From<&CanonicalStock> for StockRow {
    fn from(s: &CanonicalStock) -> Self {
        Self {
            symbol: s.symbol.clone(),
            name: s.name.clone(),
            price: format_fixed(s.price, 2),
            change: format_signed(s.change, 2),
            change_percent: format_signed_percent(s.change_percent, 2),
            volume: format_fixed(s.volume, 0),
            direction: price_direction(s.change_percent),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketMoversView {
    pub gainers: Vec<StockRow>,
    pub losers: Vec<StockRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketTableView {
    pub index: String,
    pub status: String,
    pub rows: Vec<StockRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRow {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub origin: SourceId,
    pub sequence: u64,
}

impl From<&CanonicalAlert> for AlertRow {
    fn from(a: &CanonicalAlert) -> Self {
        Self {
            title: a.title.clone(),
            description: a.description.clone(),
            severity: a.severity,
            origin: a.origin,
            sequence: a.sequence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertsView {
    pub alerts: Vec<AlertRow>,
    pub total_retained: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub description: String,
    pub count: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRow {
    pub description: String,
    pub severity: Severity,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsView {
    pub trends: Vec<TrendRow>,
    pub anomalies: Vec<AnomalyRow>,
    pub clusters: Vec<String>,
    pub market_anomaly_detected: bool,
    pub market_anomaly_score: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsRow {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsView {
    pub items: Vec<NewsRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherRow {
    pub city: String,
    pub temperature: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherView {
    pub cities: Vec<WeatherRow>,
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub name: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventsView {
    pub items: Vec<EventRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub code: &'static str,
    pub name: &'static str,
    pub rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeRatesView {
    pub rates: Vec<RateRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficPoint {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub congestion_percent: f64,
    pub level: CongestionLevel,
    pub incidents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficView {
    pub points: Vec<TrafficPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRow {
    pub source: SourceId,
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    pub last_success_at: String,
    pub last_error_at: String,
    pub last_error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcesView {
    pub sources: Vec<SourceRow>,
}

/// One surface's view model, tagged with the surface name when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "surface", rename_all = "snake_case")]
pub enum SurfaceView {
    Header(HeaderView),
    Stats(StatsView),
    MarketMovers(MarketMoversView),
    MarketTable(MarketTableView),
    Alerts(AlertsView),
    Insights(InsightsView),
    News(NewsView),
    Weather(WeatherView),
    Events(EventsView),
    ExchangeRates(ExchangeRatesView),
    Traffic(TrafficView),
    Sources(SourcesView),
}

pub fn project(view: &AggregateView, surface: Surface) -> SurfaceView {
    match surface {
        Surface::Header => SurfaceView::Header(header(view)),
        Surface::Stats => SurfaceView::Stats(stats(view)),
        Surface::MarketMovers => SurfaceView::MarketMovers(market_movers(view)),
        Surface::MarketTable => SurfaceView::MarketTable(market_table(view)),
        Surface::Alerts => SurfaceView::Alerts(alerts(view)),
        Surface::Insights => SurfaceView::Insights(insights(view)),
        Surface::News => SurfaceView::News(news(view)),
        Surface::Weather => SurfaceView::Weather(weather(view)),
        Surface::Events => SurfaceView::Events(events(view)),
        Surface::ExchangeRates => SurfaceView::ExchangeRates(exchange_rates(view)),
        Surface::Traffic => SurfaceView::Traffic(traffic(view)),
        Surface::Sources => SurfaceView::Sources(sources(view)),
    }
}

/// Every surface from the same snapshot.
pub fn project_all(view: &AggregateView) -> Vec<SurfaceView> {
    Surface::ALL.into_iter().map(|s| project(view, s)).collect()
}

fn header(view: &AggregateView) -> HeaderView {
    HeaderView {
        live: view.liveness,
        label: if view.liveness {
            "System Live"
        } else {
            "System Offline"
        },
    }
}

fn stats(view: &AggregateView) -> StatsView {
    let d = &view.derived;
    let risk_high = view.risk_band == RiskBand::High;
    StatsView {
        cards: vec![
            StatCard {
                title: "National Activity",
                value: d.activity_value.clone(),
                description: "Composite activity index",
                trend: view.activity_trend,
                trend_label: view.activity_trend.label(),
            },
            StatCard {
                title: "Risk Score",
                value: d.risk_percent.clone(),
                description: "Overall risk assessment",
                trend: if risk_high { Trend::Down } else { Trend::Neutral },
                trend_label: view.risk_band.label(),
            },
            StatCard {
                title: "Opportunity Score",
                value: d.opportunity_percent.clone(),
                description: "Market opportunity index",
                trend: Trend::Up,
                trend_label: Trend::Up.label(),
            },
            StatCard {
                title: "Market Volatility",
                value: d.volatility_label.clone(),
                description: "Probability of disruption",
                trend: Trend::Neutral,
                trend_label: Trend::Neutral.label(),
            },
        ],
        risk_band: view.risk_band,
        risk_color: d.risk_color.clone(),
    }
}

fn market_movers(view: &AggregateView) -> MarketMoversView {
    let (gainers, losers) = view
        .market()
        .map(|m| {
            (
                m.gainers.iter().take(MOVERS_PER_SIDE).map(StockRow::from).collect(),
                m.losers.iter().take(MOVERS_PER_SIDE).map(StockRow::from).collect(),
            )
        })
        .unwrap_or_default();
    MarketMoversView { gainers, losers }
}

fn market_table(view: &AggregateView) -> MarketTableView {
    let market = view.market();
    MarketTableView {
        index: market
            .and_then(|m| m.index)
            .map(|i| format_fixed(i, 2))
            .unwrap_or_else(placeholder),
        status: market
            .and_then(|m| m.status.clone())
            .unwrap_or_else(placeholder),
        rows: market
            .map(|m| m.prices.iter().take(MARKET_TABLE_ROWS).map(StockRow::from).collect())
            .unwrap_or_default(),
    }
}

fn alerts(view: &AggregateView) -> AlertsView {
    AlertsView {
        alerts: view.alerts.iter().map(AlertRow::from).collect(),
        total_retained: view.alerts_retained,
    }
}

fn insights(view: &AggregateView) -> InsightsView {
    let Some(s) = view.signals() else {
        return InsightsView {
            trends: Vec::new(),
            anomalies: Vec::new(),
            clusters: Vec::new(),
            market_anomaly_detected: false,
            market_anomaly_score: placeholder(),
        };
    };
    InsightsView {
        trends: s
            .trends
            .iter()
            .take(INSIGHT_TRENDS)
            .map(|t| TrendRow {
                description: t.description.clone(),
                count: t.count.map(|c| c.to_string()).unwrap_or_else(placeholder),
            })
            .collect(),
        anomalies: s
            .anomalies
            .iter()
            .map(|a| AnomalyRow {
                description: a.description.clone(),
                severity: Severity::from_upstream(a.severity.as_deref()),
                kind: a.kind.clone().unwrap_or_else(placeholder),
            })
            .collect(),
        clusters: s.clusters.iter().take(INSIGHT_CLUSTERS).cloned().collect(),
        market_anomaly_detected: s.market_anomaly.is_some_and(|m| m.detected),
        market_anomaly_score: s
            .market_anomaly
            .map(|m| format_fixed(m.score, 2))
            .unwrap_or_else(placeholder),
    }
}

fn news(view: &AggregateView) -> NewsView {
    NewsView {
        items: view
            .signals()
            .map(|s| {
                s.news
                    .iter()
                    .map(|n| NewsRow {
                        title: n.title.clone(),
                        source: if n.source.is_empty() {
                            placeholder()
                        } else {
                            n.source.clone()
                        },
                        url: n.url.clone().unwrap_or_else(placeholder),
                        published_at: n.published_at.clone().unwrap_or_else(placeholder),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn weather(view: &AggregateView) -> WeatherView {
    let Some(s) = view.signals() else {
        return WeatherView {
            cities: Vec::new(),
            alerts: Vec::new(),
        };
    };
    WeatherView {
        cities: s
            .weather
            .iter()
            .map(|w| WeatherRow {
                city: w.city.clone(),
                temperature: w
                    .temp
                    .map(|t| format!("{}°C", t.round()))
                    .unwrap_or_else(placeholder),
                condition: if w.condition.is_empty() {
                    placeholder()
                } else {
                    w.condition.clone()
                },
            })
            .collect(),
        alerts: s.weather_alerts.clone(),
    }
}

fn events(view: &AggregateView) -> EventsView {
    EventsView {
        items: view
            .signals()
            .map(|s| {
                s.events
                    .iter()
                    .map(|e| EventRow {
                        name: e.name.replace(RECURRING_MARKER, "").trim().to_string(),
                        date: e
                            .date
                            .clone()
                            .filter(|d| !d.is_empty() && d != DATE_PLACEHOLDER)
                            .unwrap_or_else(placeholder),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn exchange_rates(view: &AggregateView) -> ExchangeRatesView {
    let rates = view.signals().map(|s| &s.exchange_rates);
    ExchangeRatesView {
        rates: DISPLAY_CURRENCIES
            .iter()
            .map(|&(code, name)| {
                let rate = rates.and_then(|r| {
                    r.get(code).copied().or_else(|| {
                        r.iter()
                            .find(|(k, _)| k.eq_ignore_ascii_case(code))
                            .map(|(_, v)| *v)
                    })
                });
                RateRow {
                    code,
                    name,
                    rate: rate
                        .filter(|r| *r > 0.0)
                        .map(|r| format_fixed(r, 2))
                        .unwrap_or_else(placeholder),
                }
            })
            .collect(),
    }
}

fn traffic(view: &AggregateView) -> TrafficView {
    TrafficView {
        points: view
            .signals()
            .map(|s| {
                s.traffic
                    .iter()
                    .map(|t| TrafficPoint {
                        city: t.city.clone(),
                        lat: t.lat,
                        lon: t.lon,
                        congestion_percent: t.congestion_percent,
                        level: congestion_level(t.congestion_percent),
                        incidents: t.incident_count,
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

fn sources(view: &AggregateView) -> SourcesView {
    SourcesView {
        sources: SourceId::ALL
            .into_iter()
            .map(|id| {
                let state = view.source(id).cloned().unwrap_or_default();
                SourceRow {
                    source: id,
                    status: state.status,
                    consecutive_failures: state.consecutive_failures,
                    last_success_at: state
                        .last_success_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(placeholder),
                    last_error_at: state
                        .last_error_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(placeholder),
                    last_error: state.last_error.unwrap_or_else(placeholder),
                }
            })
            .collect(),
    }
}

fn placeholder() -> String {
    PLACEHOLDER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{
        CanonicalPayload, EventItem, MarketPayload, NewsItem, SignalsPayload, WeatherSummary,
    };
    use crate::store::AggregationStore;
    use chrono::{TimeZone, Utc};

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    fn stock(symbol: &str, pct: f64) -> CanonicalStock {
        CanonicalStock {
            symbol: symbol.into(),
            price: 100.0,
            change: pct,
            change_percent: pct,
            ..Default::default()
        }
    }

    #[test]
    fn empty_view_renders_placeholders_everywhere() {
        let v = AggregateView::initial();
        for view in project_all(&v) {
            match view {
                SurfaceView::Header(h) => assert_eq!(h.label, "System Offline"),
                SurfaceView::Stats(s) => assert!(s.cards.iter().all(|c| c.value == "-")),
                SurfaceView::MarketMovers(m) => assert!(m.gainers.is_empty() && m.losers.is_empty()),
                SurfaceView::MarketTable(t) => {
                    assert_eq!(t.index, "-");
                    assert!(t.rows.is_empty());
                }
                SurfaceView::ExchangeRates(r) => {
                    assert_eq!(r.rates.len(), 5);
                    assert!(r.rates.iter().all(|x| x.rate == "-"));
                }
                SurfaceView::Sources(s) => {
                    assert!(s.sources.iter().all(|r| r.status == SourceStatus::Uninitialized))
                }
                _ => {}
            }
        }
    }

    #[test]
    fn surface_names_parse() {
        assert_eq!("market-movers".parse::<Surface>(), Ok(Surface::MarketMovers));
        assert_eq!("Exchange_Rates".parse::<Surface>(), Ok(Surface::ExchangeRates));
        assert!("radar".parse::<Surface>().is_err());
    }

    #[test]
    fn movers_take_top_three_each_side() {
        let store = AggregationStore::default();
        let market = MarketPayload {
            gainers: (1..=5).map(|i| stock(&format!("G{i}"), i as f64)).collect(),
            losers: (1..=4).map(|i| stock(&format!("L{i}"), -(i as f64))).collect(),
            ..Default::default()
        };
        let v = store.ingest(SourceId::Market, CanonicalPayload::Market(market), at());
        let SurfaceView::MarketMovers(m) = project(&v, Surface::MarketMovers) else {
            panic!("wrong surface");
        };
        assert_eq!(m.gainers.len(), 3);
        assert_eq!(m.losers.len(), 3);
        assert_eq!(m.gainers[0].change_percent, "+1.00%");
        assert_eq!(m.losers[0].direction, Direction::Down);
    }

    #[test]
    fn signals_surfaces_clean_up_upstream_quirks() {
        let store = AggregationStore::default();
        let signals = SignalsPayload {
            weather: vec![WeatherSummary {
                city: "Kandy".into(),
                temp: Some(27.6),
                condition: "Rain".into(),
            }],
            events: vec![
                EventItem {
                    name: "Poya Day (recurring; see schedule)".into(),
                    date: Some("YYYY-MM-DD".into()),
                },
                EventItem {
                    name: "Budget speech".into(),
                    date: Some("2026-11-07".into()),
                },
            ],
            exchange_rates: [("usd".to_string(), 298.456)].into_iter().collect(),
            ..Default::default()
        };
        let v = store.ingest(SourceId::Signals, CanonicalPayload::Signals(signals), at());

        let SurfaceView::Weather(w) = project(&v, Surface::Weather) else {
            panic!("wrong surface");
        };
        assert_eq!(w.cities[0].temperature, "28°C");

        let SurfaceView::Events(e) = project(&v, Surface::Events) else {
            panic!("wrong surface");
        };
        assert_eq!(e.items[0].name, "Poya Day");
        assert_eq!(e.items[0].date, "-");
        assert_eq!(e.items[1].date, "2026-11-07");

        let SurfaceView::ExchangeRates(r) = project(&v, Surface::ExchangeRates) else {
            panic!("wrong surface");
        };
        assert_eq!(r.rates[0].rate, "298.46");
        assert_eq!(r.rates[1].rate, "-");

        let SurfaceView::Header(h) = project(&v, Surface::Header) else {
            panic!("wrong surface");
        };
        assert!(h.live);
    }

    fn assert_no_null(surface: &str, value: &serde_json::Value) {
        match value {
            serde_json::Value::Null => panic!("null reached the {surface} surface"),
            serde_json::Value::Array(items) => items.iter().for_each(|v| assert_no_null(surface, v)),
            serde_json::Value::Object(map) => map.values().for_each(|v| assert_no_null(surface, v)),
            _ => {}
        }
    }

    #[test]
    fn no_surface_serializes_null() {
        let store = AggregationStore::default();
        let signals = SignalsPayload {
            news: vec![NewsItem {
                title: "Port reopens".into(),
                source: "Daily".into(),
                url: None,
                published_at: None,
            }],
            events: vec![EventItem {
                name: "Poya".into(),
                date: Some("YYYY-MM-DD".into()),
            }],
            weather: vec![WeatherSummary {
                city: "Galle".into(),
                temp: None,
                condition: String::new(),
            }],
            ..Default::default()
        };
        store.ingest(SourceId::Signals, CanonicalPayload::Signals(signals), at());
        store.record_failure(SourceId::Market, &crate::error::PollError::Malformed("empty body".into()), at());
        let v = store.view();

        for view in project_all(&v).into_iter().chain(project_all(&AggregateView::initial())) {
            let json = serde_json::to_value(&view).unwrap();
            let surface = json["surface"].as_str().unwrap_or_default().to_string();
            assert_no_null(&surface, &json);
        }

        let SurfaceView::News(n) = project(&v, Surface::News) else {
            panic!("wrong surface");
        };
        assert_eq!(n.items[0].url, "-");
        assert_eq!(n.items[0].published_at, "-");
    }

    #[test]
    fn serialized_views_carry_surface_tag() {
        let json = serde_json::to_value(project(&AggregateView::initial(), Surface::Header)).unwrap();
        assert_eq!(json["surface"], "header");
        assert_eq!(json["live"], false);
    }
}
