// src/alerts.rs
//! Alert aggregation: risk factors, opportunity factors and ML anomalies
//! merged into one uniformly shaped, severity-tagged, sequenced list.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::payload::Anomaly;
use crate::source::SourceId;

/// Hard ceiling on retained alerts regardless of the retention window.
pub const MAX_RETAINED_ALERTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Map an upstream severity string; unknown or missing is `Medium`.
    pub fn from_upstream(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("high" | "critical" | "severe") => Severity::High,
            Some("low" | "info") => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAlert {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub origin: SourceId,
    /// Strictly increasing over the lifetime of the aggregator.
    pub sequence: u64,
    pub raised_at: DateTime<Utc>,
}

impl CanonicalAlert {
    fn same_content(&self, other: &CanonicalAlert) -> bool {
        self.origin == other.origin
            && self.severity == other.severity
            && self.title == other.title
            && self.description == other.description
    }
}

/// Assigns sequence numbers at merge time.
#[derive(Debug, Default)]
pub struct AlertAggregator {
    next_sequence: u64,
}

impl AlertAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Risk factors first (`high`), then opportunity factors (`low`), then
    /// anomalies with their own severity; upstream order kept within each.
    pub fn merge(
        &mut self,
        risk_factors: &[String],
        opportunity_factors: &[String],
        anomalies: &[Anomaly],
        at: DateTime<Utc>,
    ) -> Vec<CanonicalAlert> {
        let mut out =
            Vec::with_capacity(risk_factors.len() + opportunity_factors.len() + anomalies.len());

        for f in risk_factors {
            out.push(self.stamp("Risk Alert".to_string(), f, Severity::High, SourceId::Risk, at));
        }
        for f in opportunity_factors {
            out.push(self.stamp(
                "Opportunity".to_string(),
                f,
                Severity::Low,
                SourceId::Opportunities,
                at,
            ));
        }
        for a in anomalies {
            out.push(self.stamp(
                anomaly_title(a.kind.as_deref()),
                &a.description,
                Severity::from_upstream(a.severity.as_deref()),
                SourceId::Signals,
                at,
            ));
        }
        out
    }

    fn stamp(
        &mut self,
        title: String,
        description: &str,
        severity: Severity,
        origin: SourceId,
        at: DateTime<Utc>,
    ) -> CanonicalAlert {
        self.next_sequence += 1;
        CanonicalAlert {
            title,
            description: description.to_string(),
            severity,
            origin,
            sequence: self.next_sequence,
            raised_at: at,
        }
    }
}

fn anomaly_title(kind: Option<&str>) -> String {
    match kind.map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) => {
            let mut chars = k.chars();
            let head: String = chars.next().into_iter().flat_map(char::to_uppercase).collect();
            format!("{head}{} Anomaly", chars.as_str())
        }
        None => "Anomaly Detected".to_string(),
    }
}

/// Time-bounded log of merged alerts, ascending by sequence.
///
/// A batch replaces entries from earlier batches with identical content.
/// Repeats within one batch are all kept.
#[derive(Debug)]
pub struct AlertLog {
    entries: VecDeque<CanonicalAlert>,
    retention: ChronoDuration,
    cap: usize,
}

impl AlertLog {
    pub fn new(retention: std::time::Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            retention: ChronoDuration::from_std(retention)
                .unwrap_or_else(|_| ChronoDuration::days(36_500)),
            cap: MAX_RETAINED_ALERTS,
        }
    }

    pub fn absorb(&mut self, batch: Vec<CanonicalAlert>, now: DateTime<Utc>) {
        self.entries
            .retain(|e| !batch.iter().any(|alert| alert.same_content(e)));
        self.entries.extend(batch);
        self.trim(now);
    }

    fn trim(&mut self, now: DateTime<Utc>) {
        let cutoff = now.checked_sub_signed(self.retention);
        self.entries.retain(|e| cutoff.map_or(true, |c| e.raised_at >= c));
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    /// Newest `n` alerts, most recent first.
    pub fn recent(&self, n: usize) -> Vec<CanonicalAlert> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    /// Every retained alert, most recent first.
    pub fn all(&self) -> Vec<CanonicalAlert> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
