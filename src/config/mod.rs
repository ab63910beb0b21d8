// src/config/mod.rs
pub mod dashboard;

pub use dashboard::{DashboardConfig, SourceConfig};
