// src/derived.rs
//! # Derived metrics
//! Pure presentation metrics computed from canonical payloads.
//!
//! Nothing here has side effects; the store re-runs these on every ingest.

use serde::{Deserialize, Serialize};

/// Placeholder for "no data yet"; distinct from a real zero.
pub const PLACEHOLDER: &str = "-";

/// Risk band thresholds on the 0-1 scale. Fixed, not configurable.
pub const RISK_MEDIUM_FROM: f64 = 0.30;
pub const RISK_HIGH_FROM: f64 = 0.70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn label(self) -> &'static str {
        match self {
            RiskBand::Low => "Low",
            RiskBand::Medium => "Medium",
            RiskBand::High => "High",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            RiskBand::Low => "#22c55e",
            RiskBand::Medium => "#eab308",
            RiskBand::High => "#ef4444",
        }
    }
}

/// `low` below 0.30, `medium` up to (not including) 0.70, `high` from 0.70.
pub fn risk_band(score: f64) -> RiskBand {
    if score >= RISK_HIGH_FROM {
        RiskBand::High
    } else if score >= RISK_MEDIUM_FROM {
        RiskBand::Medium
    } else {
        RiskBand::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    #[default]
    Up,
    Down,
    Neutral,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Trend::Up => "Rising",
            Trend::Down => "Falling",
            Trend::Neutral => "Stable",
        }
    }
}

/// National activity trend.
///
/// The signals feed carries no historical baseline yet, so this is a fixed
/// `Up`. Replace the body once the feed exposes a previous activity value.
pub fn activity_trend() -> Trend {
    Trend::Up
}

/// One decimal place with a `%` suffix; `None` renders the placeholder.
pub fn volatility_label(percent: Option<f64>) -> String {
    match percent {
        Some(p) if p.is_finite() => format!("{p:.1}%"),
        _ => PLACEHOLDER.to_string(),
    }
}

/// 0-1 score as a whole percent (`0.42` -> `"42"`).
pub fn score_percent(score: f64) -> String {
    format!("{:.0}", (score * 100.0).clamp(0.0, 100.0))
}

pub fn format_fixed(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}")
}

/// Explicit sign for positive values (`+1.25`, `-0.40`, `0.00`).
pub fn format_signed(value: f64, decimals: usize) -> String {
    if value > 0.0 {
        format!("+{value:.decimals$}")
    } else {
        format!("{value:.decimals$}")
    }
}

pub fn format_signed_percent(value: f64, decimals: usize) -> String {
    format!("{}%", format_signed(value, decimals))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

pub fn price_direction(change_percent: f64) -> Direction {
    if change_percent > 0.0 {
        Direction::Up
    } else if change_percent < 0.0 {
        Direction::Down
    } else {
        Direction::Flat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    Light,
    Moderate,
    Heavy,
    Severe,
}

pub fn congestion_level(percent: f64) -> CongestionLevel {
    if percent > 75.0 {
        CongestionLevel::Severe
    } else if percent > 50.0 {
        CongestionLevel::Heavy
    } else if percent > 25.0 {
        CongestionLevel::Moderate
    } else {
        CongestionLevel::Light
    }
}
