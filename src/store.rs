// src/store.rs
//! # Aggregation Store
//! Owns every per-source [`SourceState`] and the derived [`AggregateView`].
//!
//! - Pollers never hold state; they submit results through [`AggregationStore::complete`]
//!   (or call [`AggregationStore::ingest`] / [`AggregationStore::record_failure`] directly).
//! - Each mutation recomputes the whole view under one lock and publishes it as
//!   an immutable `Arc` snapshot, so readers never see a mix of two passes.
//! - Poll tickets order completions per source: a response from a request
//!   older than the newest applied one is discarded, and `retire` voids all
//!   outstanding tickets when a poller stops.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::alerts::{AlertAggregator, AlertLog, CanonicalAlert};
use crate::derived::{
    activity_trend, format_fixed, risk_band, score_percent, volatility_label, RiskBand, Trend,
    PLACEHOLDER,
};
use crate::error::PollError;
use crate::payload::{CanonicalPayload, MarketPayload, ScorePayload, SignalsPayload};
use crate::source::SourceId;

pub const DEFAULT_STALE_AFTER_FAILURES: u32 = 2;
pub const DEFAULT_ALERT_DISPLAY_CAP: usize = 5;
pub const DEFAULT_ALERT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// No successful poll yet.
    #[default]
    Uninitialized,
    /// Last applied poll succeeded.
    Synced,
    /// Failure streak crossed the threshold; the last payload is retained.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollEvent {
    Success,
    Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    pub status: SourceStatus,
    pub last_payload: Option<CanonicalPayload>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_event: Option<PollEvent>,
    pub consecutive_failures: u32,
}

/// Presentation metrics cached alongside the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub risk_percent: String,
    pub risk_color: String,
    pub opportunity_percent: String,
    pub volatility_label: String,
    pub activity_value: String,
}

impl Default for DerivedMetrics {
    fn default() -> Self {
        Self {
            risk_percent: PLACEHOLDER.to_string(),
            risk_color: RiskBand::default().color().to_string(),
            opportunity_percent: PLACEHOLDER.to_string(),
            volatility_label: PLACEHOLDER.to_string(),
            activity_value: PLACEHOLDER.to_string(),
        }
    }
}

/// Composite read-only snapshot. Every field comes from the same pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateView {
    /// Strictly increasing per recomputation; `0` before the first one.
    pub revision: u64,
    pub computed_at: Option<DateTime<Utc>>,
    pub sources: BTreeMap<SourceId, SourceState>,
    pub liveness: bool,
    /// Most recent first, capped at the display cap.
    pub alerts: Vec<CanonicalAlert>,
    pub alerts_retained: usize,
    pub risk_band: RiskBand,
    pub activity_trend: Trend,
    pub derived: DerivedMetrics,
}

impl AggregateView {
    /// View before any source reported: everything placeholder.
    pub fn initial() -> Self {
        Self {
            revision: 0,
            computed_at: None,
            sources: SourceId::ALL
                .into_iter()
                .map(|id| (id, SourceState::default()))
                .collect(),
            liveness: false,
            alerts: Vec::new(),
            alerts_retained: 0,
            risk_band: RiskBand::default(),
            activity_trend: activity_trend(),
            derived: DerivedMetrics::default(),
        }
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceState> {
        self.sources.get(&id)
    }

    pub fn payload(&self, id: SourceId) -> Option<&CanonicalPayload> {
        self.source(id).and_then(|s| s.last_payload.as_ref())
    }

    pub fn market(&self) -> Option<&MarketPayload> {
        self.payload(SourceId::Market).and_then(CanonicalPayload::as_market)
    }

    pub fn risk(&self) -> Option<&ScorePayload> {
        self.payload(SourceId::Risk).and_then(CanonicalPayload::as_score)
    }

    pub fn opportunities(&self) -> Option<&ScorePayload> {
        self.payload(SourceId::Opportunities)
            .and_then(CanonicalPayload::as_score)
    }

    pub fn signals(&self) -> Option<&SignalsPayload> {
        self.payload(SourceId::Signals)
            .and_then(CanonicalPayload::as_signals)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub stale_after_failures: u32,
    pub alert_display_cap: usize,
    pub alert_retention: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            stale_after_failures: DEFAULT_STALE_AFTER_FAILURES,
            alert_display_cap: DEFAULT_ALERT_DISPLAY_CAP,
            alert_retention: DEFAULT_ALERT_RETENTION,
        }
    }
}

/// Handle for one poll request of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    pub source: SourceId,
    pub number: u64,
}

/// What happened to a poll completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// A newer request for the same source already completed.
    Superseded,
    /// The poller was stopped after the request was issued.
    Retired,
}

#[derive(Debug, Default, Clone, Copy)]
struct TicketBook {
    issued: u64,
    applied: u64,
    floor: u64,
}

#[derive(Debug)]
struct Inner {
    sources: BTreeMap<SourceId, SourceState>,
    tickets: BTreeMap<SourceId, TicketBook>,
    aggregator: AlertAggregator,
    log: AlertLog,
    revision: u64,
}

#[derive(Debug)]
pub struct AggregationStore {
    settings: StoreSettings,
    inner: Mutex<Inner>,
    tx: watch::Sender<Arc<AggregateView>>,
}

impl Default for AggregationStore {
    fn default() -> Self {
        Self::new(StoreSettings::default())
    }
}

impl AggregationStore {
    pub fn new(settings: StoreSettings) -> Self {
        let settings = StoreSettings {
            stale_after_failures: settings.stale_after_failures.max(1),
            alert_display_cap: settings.alert_display_cap.max(1),
            ..settings
        };
        let initial = AggregateView::initial();
        let (tx, _rx) = watch::channel(Arc::new(initial.clone()));
        Self {
            settings,
            inner: Mutex::new(Inner {
                sources: initial.sources,
                tickets: BTreeMap::new(),
                aggregator: AlertAggregator::new(),
                log: AlertLog::new(settings.alert_retention),
                revision: 0,
            }),
            tx,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Latest published view.
    pub fn view(&self) -> Arc<AggregateView> {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified after every recomputation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AggregateView>> {
        self.tx.subscribe()
    }

    pub fn source_state(&self, id: SourceId) -> SourceState {
        self.inner.lock().sources.get(&id).cloned().unwrap_or_default()
    }

    /// Every retained alert (not capped), most recent first.
    pub fn retained_alerts(&self) -> Vec<CanonicalAlert> {
        self.inner.lock().log.all()
    }

    /// Apply a successful payload and recompute the view before returning.
    pub fn ingest(
        &self,
        source: SourceId,
        payload: CanonicalPayload,
        at: DateTime<Utc>,
    ) -> Arc<AggregateView> {
        let mut inner = self.inner.lock();
        self.apply_success(&mut inner, source, payload, at);
        self.publish(&mut inner, at)
    }

    /// Apply a failed poll and recompute the view before returning.
    pub fn record_failure(
        &self,
        source: SourceId,
        error: &PollError,
        at: DateTime<Utc>,
    ) -> Arc<AggregateView> {
        let mut inner = self.inner.lock();
        self.apply_failure(&mut inner, source, error, at);
        self.publish(&mut inner, at)
    }

    pub fn issue_ticket(&self, source: SourceId) -> PollTicket {
        let mut inner = self.inner.lock();
        let book = inner.tickets.entry(source).or_default();
        book.issued += 1;
        PollTicket {
            source,
            number: book.issued,
        }
    }

    /// Apply a poll result unless a newer one already landed or the
    /// poller was stopped meanwhile.
    pub fn complete(
        &self,
        ticket: PollTicket,
        result: Result<CanonicalPayload, PollError>,
        at: DateTime<Utc>,
    ) -> Completion {
        let mut inner = self.inner.lock();
        let book = inner.tickets.entry(ticket.source).or_default();
        if ticket.number <= book.floor {
            debug!(source = %ticket.source, ticket = ticket.number, "discarding completion of retired poll");
            return Completion::Retired;
        }
        if ticket.number < book.applied {
            debug!(
                source = %ticket.source,
                ticket = ticket.number,
                applied = book.applied,
                "discarding superseded poll completion"
            );
            return Completion::Superseded;
        }
        book.applied = ticket.number;

        match result {
            Ok(payload) => self.apply_success(&mut inner, ticket.source, payload, at),
            Err(e) => self.apply_failure(&mut inner, ticket.source, &e, at),
        }
        self.publish(&mut inner, at);
        Completion::Applied
    }

    /// Void every ticket issued so far for `source`.
    pub fn retire(&self, source: SourceId) {
        let mut inner = self.inner.lock();
        let book = inner.tickets.entry(source).or_default();
        book.floor = book.issued;
    }

    fn apply_success(
        &self,
        inner: &mut Inner,
        source: SourceId,
        payload: CanonicalPayload,
        at: DateTime<Utc>,
    ) {
        if payload.source() != source {
            warn!(source = %source, payload = %payload.source(), "payload does not belong to source; ignored");
            return;
        }
        let state = inner.sources.entry(source).or_default();
        let previous = state.status;
        state.status = SourceStatus::Synced;
        state.last_payload = Some(payload);
        state.last_success_at = Some(at);
        state.last_event = Some(PollEvent::Success);
        state.consecutive_failures = 0;
        if previous != SourceStatus::Synced {
            info!(source = %source, from = ?previous, "source synced");
        }
        gauge!("dashboard_source_consecutive_failures", "source" => source.as_str()).set(0.0);

        // Alerts only change when one of their inputs changed.
        if matches!(
            source,
            SourceId::Risk | SourceId::Opportunities | SourceId::Signals
        ) {
            Self::remerge_alerts(inner, at);
        }
    }

    fn apply_failure(&self, inner: &mut Inner, source: SourceId, error: &PollError, at: DateTime<Utc>) {
        let state = inner.sources.entry(source).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error_at = Some(at);
        state.last_error = Some(error.to_string());
        state.last_event = Some(PollEvent::Failure);

        if state.status == SourceStatus::Synced
            && state.consecutive_failures >= self.settings.stale_after_failures
        {
            state.status = SourceStatus::Stale;
            warn!(
                source = %source,
                failures = state.consecutive_failures,
                "source went stale; keeping last payload"
            );
        }
        gauge!("dashboard_source_consecutive_failures", "source" => source.as_str())
            .set(state.consecutive_failures as f64);
    }

    fn remerge_alerts(inner: &mut Inner, at: DateTime<Utc>) {
        let risk = payload_of(&inner.sources, SourceId::Risk).and_then(CanonicalPayload::as_score);
        let opp = payload_of(&inner.sources, SourceId::Opportunities)
            .and_then(CanonicalPayload::as_score);
        let signals = payload_of(&inner.sources, SourceId::Signals)
            .and_then(CanonicalPayload::as_signals);

        let batch = inner.aggregator.merge(
            risk.map(|r| r.factors.as_slice()).unwrap_or(&[]),
            opp.map(|o| o.factors.as_slice()).unwrap_or(&[]),
            signals.map(|s| s.anomalies.as_slice()).unwrap_or(&[]),
            at,
        );
        inner.log.absorb(batch, at);
    }

    /// Build the next view from `inner` and publish it. Runs with the lock held.
    fn publish(&self, inner: &mut Inner, at: DateTime<Utc>) -> Arc<AggregateView> {
        inner.revision += 1;

        let risk = payload_of(&inner.sources, SourceId::Risk).and_then(CanonicalPayload::as_score);
        let opp = payload_of(&inner.sources, SourceId::Opportunities)
            .and_then(CanonicalPayload::as_score);
        let signals = payload_of(&inner.sources, SourceId::Signals)
            .and_then(CanonicalPayload::as_signals);

        let band = risk_band(risk.map(|r| r.score).unwrap_or(0.0));
        let derived = DerivedMetrics {
            risk_percent: risk
                .map(|r| score_percent(r.score))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            risk_color: band.color().to_string(),
            opportunity_percent: opp
                .map(|o| score_percent(o.score))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            volatility_label: volatility_label(signals.and_then(|s| s.volatility_percent)),
            activity_value: signals
                .and_then(|s| s.activity_index)
                .map(|a| format_fixed(a, 0))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
        };

        let liveness = inner
            .sources
            .get(&SourceId::Signals)
            .map(|s| s.status == SourceStatus::Synced && s.last_event == Some(PollEvent::Success))
            .unwrap_or(false);

        let view = Arc::new(AggregateView {
            revision: inner.revision,
            computed_at: Some(at),
            sources: inner.sources.clone(),
            liveness,
            alerts: inner.log.recent(self.settings.alert_display_cap),
            alerts_retained: inner.log.len(),
            risk_band: band,
            activity_trend: activity_trend(),
            derived,
        });

        gauge!("dashboard_live").set(if liveness { 1.0 } else { 0.0 });
        gauge!("dashboard_alerts_retained").set(inner.log.len() as f64);
        trace!(revision = inner.revision, liveness, "aggregate view recomputed");

        self.tx.send_replace(view.clone());
        view
    }
}

fn payload_of(
    sources: &BTreeMap<SourceId, SourceState>,
    id: SourceId,
) -> Option<&CanonicalPayload> {
    sources.get(&id).and_then(|s| s.last_payload.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Anomaly;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn signals(volatility: f64) -> CanonicalPayload {
        CanonicalPayload::Signals(SignalsPayload {
            volatility_percent: Some(volatility),
            ..Default::default()
        })
    }

    fn risk(score: f64, factors: &[&str]) -> CanonicalPayload {
        CanonicalPayload::Risk(ScorePayload {
            score,
            factors: factors.iter().map(|f| f.to_string()).collect(),
        })
    }

    fn down() -> PollError {
        PollError::Transport("connection refused".into())
    }

    #[test]
    fn initial_view_is_all_placeholders() {
        let store = AggregationStore::default();
        let v = store.view();
        assert_eq!(v.revision, 0);
        assert!(!v.liveness);
        assert_eq!(v.sources.len(), 4);
        assert!(v.sources.values().all(|s| s.status == SourceStatus::Uninitialized));
        assert_eq!(v.derived.volatility_label, "-");
        assert_eq!(v.derived.risk_percent, "-");
    }

    #[test]
    fn two_failures_after_success_turn_signals_stale() {
        let store = AggregationStore::default();
        let v = store.ingest(SourceId::Signals, signals(12.0), t(0));
        assert!(v.liveness);

        store.record_failure(SourceId::Signals, &down(), t(5));
        let v = store.record_failure(SourceId::Signals, &down(), t(10));

        let s = v.source(SourceId::Signals).unwrap();
        assert_eq!(s.status, SourceStatus::Stale);
        assert_eq!(s.last_payload, Some(signals(12.0)));
        assert_eq!(s.last_success_at, Some(t(0)));
        assert_eq!(s.consecutive_failures, 2);
        assert!(!v.liveness);
        // stale data still renders
        assert_eq!(v.derived.volatility_label, "12.0%");
    }

    #[test]
    fn single_failure_keeps_synced_but_drops_liveness() {
        let store = AggregationStore::default();
        store.ingest(SourceId::Signals, signals(1.0), t(0));
        let v = store.record_failure(SourceId::Signals, &down(), t(5));
        assert_eq!(v.source(SourceId::Signals).unwrap().status, SourceStatus::Synced);
        assert!(!v.liveness);

        let v = store.ingest(SourceId::Signals, signals(2.0), t(10));
        assert!(v.liveness);
        assert_eq!(v.source(SourceId::Signals).unwrap().consecutive_failures, 0);
    }

    #[test]
    fn failures_before_first_success_stay_uninitialized() {
        let store = AggregationStore::default();
        for i in 0..5 {
            store.record_failure(SourceId::Market, &PollError::Upstream { status: 502 }, t(i));
        }
        let s = store.source_state(SourceId::Market);
        assert_eq!(s.status, SourceStatus::Uninitialized);
        assert_eq!(s.consecutive_failures, 5);
        assert_eq!(s.last_error.as_deref(), Some("upstream returned status 502"));
    }

    #[test]
    fn market_outage_does_not_affect_liveness() {
        let store = AggregationStore::default();
        store.ingest(SourceId::Signals, signals(1.0), t(0));
        store.record_failure(SourceId::Market, &down(), t(1));
        let v = store.record_failure(SourceId::Market, &down(), t(2));
        assert!(v.liveness);
    }

    #[test]
    fn risk_band_and_alerts_follow_risk_payload() {
        let store = AggregationStore::default();
        let v = store.ingest(SourceId::Risk, risk(0.75, &["curfew"]), t(0));
        assert_eq!(v.risk_band, RiskBand::High);
        assert_eq!(v.derived.risk_percent, "75");
        assert_eq!(v.alerts.len(), 1);
        assert_eq!(v.alerts[0].description, "curfew");
    }

    #[test]
    fn display_cap_limits_view_but_not_retained_list() {
        let store = AggregationStore::new(StoreSettings {
            alert_display_cap: 5,
            ..Default::default()
        });
        let factors: Vec<String> = (0..7).map(|i| format!("f{i}")).collect();
        let refs: Vec<&str> = factors.iter().map(String::as_str).collect();
        let v = store.ingest(SourceId::Risk, risk(0.2, &refs), t(0));
        assert_eq!(v.alerts.len(), 5);
        assert_eq!(v.alerts_retained, 7);
        assert_eq!(store.retained_alerts().len(), 7);
        assert!(v.alerts.windows(2).all(|w| w[0].sequence > w[1].sequence));
    }

    #[test]
    fn each_repeated_risk_factor_is_its_own_alert() {
        let store = AggregationStore::default();
        let v = store.ingest(SourceId::Risk, risk(0.8, &["curfew", "curfew"]), t(0));
        assert_eq!(v.alerts.len(), 2);
        assert_eq!(v.alerts_retained, 2);

        let v = store.ingest(SourceId::Risk, risk(0.8, &["curfew", "curfew"]), t(5));
        assert_eq!(v.alerts_retained, 2);
    }

    #[test]
    fn anomalies_from_signals_become_alerts() {
        let store = AggregationStore::default();
        let payload = CanonicalPayload::Signals(SignalsPayload {
            anomalies: vec![Anomaly {
                description: "Index spike".into(),
                severity: Some("high".into()),
                kind: Some("market".into()),
            }],
            ..Default::default()
        });
        let v = store.ingest(SourceId::Signals, payload, t(0));
        assert_eq!(v.alerts[0].title, "Market Anomaly");
        assert_eq!(v.alerts[0].origin, SourceId::Signals);
    }

    #[test]
    fn superseded_completion_is_discarded() {
        let store = AggregationStore::default();
        let older = store.issue_ticket(SourceId::Signals);
        let newer = store.issue_ticket(SourceId::Signals);

        assert_eq!(store.complete(newer, Ok(signals(2.0)), t(1)), Completion::Applied);
        assert_eq!(store.complete(older, Ok(signals(1.0)), t(2)), Completion::Superseded);

        let s = store.source_state(SourceId::Signals);
        assert_eq!(s.last_payload, Some(signals(2.0)));
        assert_eq!(s.last_success_at, Some(t(1)));
    }

    #[test]
    fn in_order_completions_both_apply() {
        let store = AggregationStore::default();
        let a = store.issue_ticket(SourceId::Risk);
        let b = store.issue_ticket(SourceId::Risk);
        assert_eq!(store.complete(a, Err(down()), t(1)), Completion::Applied);
        assert_eq!(store.complete(b, Ok(risk(0.1, &[])), t(2)), Completion::Applied);
        assert_eq!(store.source_state(SourceId::Risk).status, SourceStatus::Synced);
    }

    #[test]
    fn retired_tickets_never_write() {
        let store = AggregationStore::default();
        let pending = store.issue_ticket(SourceId::Market);
        store.retire(SourceId::Market);
        let before = store.view().revision;
        assert_eq!(
            store.complete(pending, Ok(CanonicalPayload::empty(SourceId::Market)), t(1)),
            Completion::Retired
        );
        assert_eq!(store.view().revision, before);

        let fresh = store.issue_ticket(SourceId::Market);
        assert_eq!(
            store.complete(fresh, Ok(CanonicalPayload::empty(SourceId::Market)), t(2)),
            Completion::Applied
        );
    }

    #[test]
    fn mismatched_payload_is_ignored() {
        let store = AggregationStore::default();
        let v = store.ingest(SourceId::Market, signals(3.0), t(0));
        assert_eq!(v.source(SourceId::Market).unwrap().status, SourceStatus::Uninitialized);
    }

    #[tokio::test]
    async fn subscribers_are_notified_on_ingest() {
        let store = AggregationStore::default();
        let mut rx = store.subscribe();
        store.ingest(SourceId::Signals, signals(4.0), t(0));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().revision, 1);
    }
}
