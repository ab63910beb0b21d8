// tests/poller_http.rs
//
// Pollers against a fake upstream (wiremock): success, upstream errors,
// malformed bodies, transport errors, stop/cancellation and superseded
// responses.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use situational_awareness::poller::SourceFetcher;
use situational_awareness::{
    AggregationStore, HttpFetcher, Normalizer, PollError, PollerManager, SourceId, SourceState,
    SourceStatus,
};

fn manager() -> PollerManager {
    let store = Arc::new(AggregationStore::default());
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(3)).expect("http client"));
    PollerManager::new(store, fetcher, Normalizer::default())
}

/// Poll the store until `pred` holds or two seconds pass.
async fn wait_for(mgr: &PollerManager, source: SourceId, pred: impl Fn(&SourceState) -> bool) -> SourceState {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let s = mgr.store().source_state(source);
        if pred(&s) || tokio::time::Instant::now() > deadline {
            return s;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn successful_poll_normalizes_and_syncs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/signals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "national_activity_score": 70,
            "market_volatility_percent": 12.34
        })))
        .mount(&server)
        .await;

    let mgr = manager();
    mgr.start(
        SourceId::Signals,
        format!("{}/api/signals", server.uri()),
        Duration::from_millis(50),
    )
    .await;

    let s = wait_for(&mgr, SourceId::Signals, |s| s.status == SourceStatus::Synced).await;
    assert_eq!(s.status, SourceStatus::Synced);
    let v = mgr.store().view();
    assert!(v.liveness);
    assert_eq!(v.derived.volatility_label, "12.3%");
    assert_eq!(v.derived.activity_value, "70");

    mgr.stop_all().await;
}

#[tokio::test]
async fn upstream_errors_count_as_failures_without_blanking() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/risk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "score": 0.5 })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/risk"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mgr = manager();
    mgr.start(
        SourceId::Risk,
        format!("{}/api/risk", server.uri()),
        Duration::from_millis(50),
    )
    .await;

    let s = wait_for(&mgr, SourceId::Risk, |s| s.status == SourceStatus::Stale).await;
    mgr.stop_all().await;

    assert_eq!(s.status, SourceStatus::Stale);
    assert!(s.consecutive_failures >= 2);
    assert_eq!(s.last_error.as_deref(), Some("upstream returned status 500"));
    assert_eq!(s.last_payload.as_ref().and_then(|p| p.as_score()).map(|r| r.score), Some(0.5));
}

#[tokio::test]
async fn empty_and_null_bodies_are_upstream_errors() {
    let server = MockServer::start().await;
    Mock::given(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/null"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
    for p in ["/empty", "/null"] {
        let err = fetcher.fetch(&format!("{}{p}", server.uri())).await.unwrap_err();
        assert!(matches!(err, PollError::Malformed(_)), "{p}: {err:?}");
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error_and_stays_uninitialized() {
    let mgr = manager();
    // port 9 (discard) is closed on test hosts
    mgr.start(SourceId::Market, "http://127.0.0.1:9/api/market", Duration::from_millis(50))
        .await;

    let s = wait_for(&mgr, SourceId::Market, |s| s.consecutive_failures >= 3).await;
    mgr.stop_all().await;

    assert_eq!(s.status, SourceStatus::Uninitialized);
    assert!(s.consecutive_failures >= 3);
    assert!(s.last_error.unwrap_or_default().starts_with("transport error"));
}

#[tokio::test]
async fn stop_prevents_further_writes() {
    let server = MockServer::start().await;
    Mock::given(path("/api/opportunities"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "score": 0.2 }))
                .set_delay(Duration::from_millis(30)),
        )
        .mount(&server)
        .await;

    let mgr = manager();
    mgr.start(
        SourceId::Opportunities,
        format!("{}/api/opportunities", server.uri()),
        Duration::from_millis(20),
    )
    .await;
    wait_for(&mgr, SourceId::Opportunities, |s| s.status == SourceStatus::Synced).await;

    assert!(mgr.stop(SourceId::Opportunities).await);
    let revision = mgr.store().view().revision;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mgr.store().view().revision, revision);
    assert!(mgr.running().is_empty());
}

#[tokio::test]
async fn slow_older_response_is_discarded() {
    let server = MockServer::start().await;
    // first request hangs past the next tick
    Mock::given(path("/api/signals"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "market_volatility_percent": 1 }))
                .set_delay(Duration::from_millis(1500)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/signals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "market_volatility_percent": 2 })))
        .mount(&server)
        .await;

    let mgr = manager();
    mgr.start(
        SourceId::Signals,
        format!("{}/api/signals", server.uri()),
        Duration::from_secs(1),
    )
    .await;

    // tick 2 (t=1s) lands first; tick 1 returns at t=1.5s and must be dropped
    tokio::time::sleep(Duration::from_millis(1800)).await;
    let v = mgr.store().view();
    mgr.stop_all().await;

    let vol = v.signals().and_then(|s| s.volatility_percent);
    assert_eq!(vol, Some(2.0));
}
