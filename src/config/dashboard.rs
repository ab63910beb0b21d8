// src/config/dashboard.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::normalize::AliasTable;
use crate::source::SourceId;
use crate::store::StoreSettings;

pub const ENV_CONFIG_PATH: &str = "DASHBOARD_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/dashboard.toml";

const ENV_API_URL: &str = "DASHBOARD_API_URL";
const ENV_POLL_INTERVAL_MS: &str = "DASHBOARD_POLL_INTERVAL_MS";
const ENV_BIND_ADDR: &str = "DASHBOARD_BIND_ADDR";

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 4_000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Per-source polling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Full URL; `None` means `{api_base_url}/api/{source}`.
    pub endpoint: Option<String>,
    pub poll_interval_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_base_url: String,
    /// Keyed by source name (`market`, `risk`, `opportunities`, `signals`).
    pub sources: BTreeMap<String, SourceConfig>,
    pub stale_after_failures: u32,
    pub alert_display_cap: usize,
    pub alert_retention_secs: u64,
    pub request_timeout_ms: u64,
    pub bind_addr: String,
    /// Extra alias paths per canonical field, tried before the built-in ones.
    pub aliases: HashMap<String, Vec<String>>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sources: BTreeMap::new(),
            stale_after_failures: crate::store::DEFAULT_STALE_AFTER_FAILURES,
            alert_display_cap: crate::store::DEFAULT_ALERT_DISPLAY_CAP,
            alert_retention_secs: crate::store::DEFAULT_ALERT_RETENTION.as_secs(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            aliases: HashMap::new(),
        }
    }
}

impl DashboardConfig {
    /// Load from an explicit TOML file, then sanitize. No env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading dashboard config from {}", path.display()))?;
        let cfg: DashboardConfig = toml::from_str(&content)
            .with_context(|| format!("parsing dashboard config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $DASHBOARD_CONFIG_PATH (must exist when set)
    /// 2) config/dashboard.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        Ok(base.with_env_overrides().sanitized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_nonempty(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(addr) = env_nonempty(ENV_BIND_ADDR) {
            self.bind_addr = addr;
        }
        let interval = env_nonempty(ENV_POLL_INTERVAL_MS).and_then(|v| match v.parse::<u64>() {
            Ok(ms) => Some(ms),
            Err(e) => {
                tracing::warn!(value = %v, error = %e, "ignoring invalid {ENV_POLL_INTERVAL_MS}");
                None
            }
        });
        for id in SourceId::ALL {
            let key = format!("DASHBOARD_{}_ENDPOINT", id.env_key());
            let endpoint = env_nonempty(&key);
            if endpoint.is_none() && interval.is_none() {
                continue;
            }
            let entry = self.sources.entry(id.as_str().to_string()).or_default();
            if let Some(ep) = endpoint {
                entry.endpoint = Some(ep);
            }
            if let Some(ms) = interval {
                entry.poll_interval_ms = ms;
            }
        }
        self
    }

    /// Clamp values into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        self.stale_after_failures = self.stale_after_failures.max(1);
        self.alert_display_cap = self.alert_display_cap.max(1);
        self.request_timeout_ms = self.request_timeout_ms.max(1);
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        self.sources = std::mem::take(&mut self.sources)
            .into_iter()
            .filter_map(|(k, v)| match k.parse::<SourceId>() {
                Ok(id) => Some((id.as_str().to_string(), v)),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring settings for unknown source");
                    None
                }
            })
            .collect();
        for sc in self.sources.values_mut() {
            sc.poll_interval_ms = sc.poll_interval_ms.max(1);
            if sc.endpoint.as_deref().is_some_and(|e| e.trim().is_empty()) {
                sc.endpoint = None;
            }
        }
        self
    }

    pub fn source(&self, id: SourceId) -> SourceConfig {
        self.sources.get(id.as_str()).cloned().unwrap_or_default()
    }

    pub fn endpoint(&self, id: SourceId) -> String {
        match self.sources.get(id.as_str()).and_then(|s| s.endpoint.clone()) {
            Some(ep) => ep,
            None => format!("{}/api/{}", self.api_base_url, id.as_str()),
        }
    }

    pub fn poll_interval(&self, id: SourceId) -> Duration {
        Duration::from_millis(self.source(id).poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            stale_after_failures: self.stale_after_failures,
            alert_display_cap: self.alert_display_cap,
            alert_retention: Duration::from_secs(self.alert_retention_secs),
        }
    }

    pub fn alias_table(&self) -> AliasTable {
        AliasTable::with_overrides(&self.aliases)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    fn clear_env() {
        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_API_URL);
        env::remove_var(ENV_POLL_INTERVAL_MS);
        env::remove_var(ENV_BIND_ADDR);
        for id in SourceId::ALL {
            env::remove_var(format!("DASHBOARD_{}_ENDPOINT", id.env_key()));
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let c = DashboardConfig::default();
        assert_eq!(c.stale_after_failures, 2);
        assert_eq!(c.alert_display_cap, 5);
        assert_eq!(c.poll_interval(SourceId::Market), Duration::from_millis(5000));
        assert_eq!(c.endpoint(SourceId::Signals), "http://127.0.0.1:8000/api/signals");
    }

    #[test]
    fn parses_toml_and_sanitizes() {
        let toml = r#"
            api_base_url = "http://upstream:9000/"
            stale_after_failures = 0
            alert_display_cap = 0

            [sources.market]
            poll_interval_ms = 1000

            [sources.risk]
            endpoint = "http://risk.local/score"

            [aliases]
            stock_symbol = ["ticker"]
        "#;
        let c: DashboardConfig = toml::from_str(toml).unwrap();
        let c = c.sanitized();
        assert_eq!(c.stale_after_failures, 1);
        assert_eq!(c.alert_display_cap, 1);
        assert_eq!(c.poll_interval(SourceId::Market), Duration::from_millis(1000));
        assert_eq!(c.endpoint(SourceId::Market), "http://upstream:9000/api/market");
        assert_eq!(c.endpoint(SourceId::Risk), "http://risk.local/score");
        assert_eq!(c.aliases["stock_symbol"], vec!["ticker".to_string()]);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        // no file in cwd: defaults
        let c = DashboardConfig::load_default().unwrap();
        assert_eq!(c, DashboardConfig::default().sanitized());

        // config/dashboard.toml is picked up
        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(
            tmp.path().join("config/dashboard.toml"),
            "alert_display_cap = 9\n",
        )
        .unwrap();
        assert_eq!(DashboardConfig::load_default().unwrap().alert_display_cap, 9);

        // env path wins over the default file
        let p = tmp.path().join("other.toml");
        fs::write(&p, "alert_display_cap = 3\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        assert_eq!(DashboardConfig::load_default().unwrap().alert_display_cap, 3);

        // env path must exist
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
        assert!(DashboardConfig::load_default().is_err());

        clear_env();
        env::set_current_dir(&old).unwrap();
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_apply_after_file() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        clear_env();

        env::set_var(ENV_API_URL, "http://api.test");
        env::set_var("DASHBOARD_SIGNALS_ENDPOINT", "http://signals.test/feed");
        env::set_var(ENV_POLL_INTERVAL_MS, "250");
        env::set_var(ENV_BIND_ADDR, "127.0.0.1:9999");

        let c = DashboardConfig::load_default().unwrap();
        assert_eq!(c.endpoint(SourceId::Market), "http://api.test/api/market");
        assert_eq!(c.endpoint(SourceId::Signals), "http://signals.test/feed");
        assert_eq!(c.poll_interval(SourceId::Risk), Duration::from_millis(250));
        assert_eq!(c.bind_addr, "127.0.0.1:9999");

        clear_env();
        env::set_current_dir(&old).unwrap();
    }
}
