//! Configuration loading and validation
//!
//! All configuration is loaded once at startup from a TOML file with
//! optional environment overrides, validated, and handed to components as
//! strongly typed structs. The policy section is swappable between
//! requests via `arc-swap`; nothing reads configuration through globals.

use crate::builder::fee::FeeMode;
use crate::builder::selection::SelectionMode;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP surface configuration
    pub server: ServerConfig,

    /// UTXO indexer endpoint
    pub indexer: IndexerConfig,

    /// Telemetry summary endpoints and cache tuning
    pub telemetry: TelemetryConfig,

    /// Selection and fee policy
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP surface
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Base URL of the UTXO indexer
    pub base_url: String,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Receipts/confirmation summary endpoint; absent disables the source
    pub receipts_url: Option<String>,

    /// Scheduler summary endpoint; absent disables the source
    pub scheduler_url: Option<String>,

    /// Per-fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,

    /// Cache TTL in seconds; values younger than this are fresh
    pub ttl_secs: u64,

    /// Window past the TTL within which values degrade to soft-stale
    /// rather than hard-stale
    pub stale_soft_window_secs: u64,
}

/// Selection and fee policy, hot-swappable between requests
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    pub selection: SelectionConfig,
    pub fee: FeeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Candidate ordering strategy
    pub mode: SelectionMode,

    /// Hard ceiling on inputs per transaction
    pub max_inputs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub mode: FeeMode,

    /// Fee returned by `fixed` mode, in sompi
    pub fixed_fee: u64,

    /// Basis-point rate applied to the outputs total in `output_bps` mode
    pub output_bps: u64,

    /// Tuning table for `adaptive` mode
    pub adaptive: AdaptiveFeeConfig,
}

/// Tuning table for the adaptive fee, all amounts in sompi
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveFeeConfig {
    /// Flat starting component
    pub base_fee: u64,

    /// Cost charged per selected input
    pub per_input_fee: u64,

    /// Input count above which the fragmentation bonus applies
    pub fragmentation_threshold_inputs: usize,

    /// Flat bonus when the selection is more fragmented than the threshold
    pub fragmentation_bonus: u64,

    /// Flat bonus when selection was truncated by the input cap
    pub truncation_bonus: u64,

    /// Bonus at 100% congestion, scaled linearly by the congestion pct
    pub congestion_bonus_max: u64,

    /// Receipt-lag tier thresholds and bonus
    pub receipt_lag: LagTierConfig,

    /// Scheduler callback latency tier thresholds and bonus
    pub scheduler_lag: LagTierConfig,

    /// Discount applied to telemetry-derived components when the snapshot
    /// is soft-stale, in basis points (10_000 = no discount)
    pub stale_soft_factor_bps: u64,

    /// Discount applied when the snapshot is hard-stale, in basis points
    pub stale_hard_factor_bps: u64,
}

/// Three-tier latency bonus: zero below `high_ms`, half bonus between
/// `high_ms` and `critical_ms`, full bonus at or above `critical_ms`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LagTierConfig {
    pub high_ms: u64,
    pub critical_ms: u64,
    pub bonus: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:8080".to_string() }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self { base_url: "http://127.0.0.1:8575".to_string(), timeout_ms: 5_000 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            receipts_url: None,
            scheduler_url: None,
            fetch_timeout_ms: 2_000,
            ttl_secs: 30,
            stale_soft_window_secs: 300,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { mode: SelectionMode::Auto, max_inputs: 84 }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            mode: FeeMode::Adaptive,
            fixed_fee: 2_000,
            output_bps: 10,
            adaptive: AdaptiveFeeConfig::default(),
        }
    }
}

impl Default for AdaptiveFeeConfig {
    fn default() -> Self {
        Self {
            base_fee: 1_000,
            per_input_fee: 500,
            fragmentation_threshold_inputs: 16,
            fragmentation_bonus: 5_000,
            truncation_bonus: 10_000,
            congestion_bonus_max: 20_000,
            receipt_lag: LagTierConfig { high_ms: 5_000, critical_ms: 15_000, bonus: 10_000 },
            scheduler_lag: LagTierConfig { high_ms: 2_000, critical_ms: 8_000, bonus: 8_000 },
            stale_soft_factor_bps: 4_000,
            stale_hard_factor_bps: 0,
        }
    }
}

impl Default for LagTierConfig {
    fn default() -> Self {
        Self { high_ms: 5_000, critical_ms: 15_000, bonus: 10_000 }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file {path}"))?;
        Ok(config)
    }

    /// Load from file, then apply `TXFORGE_*` environment overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TXFORGE_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("TXFORGE_INDEXER_URL") {
            self.indexer.base_url = url;
        }
        if let Ok(url) = std::env::var("TXFORGE_RECEIPTS_URL") {
            self.telemetry.receipts_url = Some(url);
        }
        if let Ok(url) = std::env::var("TXFORGE_SCHEDULER_URL") {
            self.telemetry.scheduler_url = Some(url);
        }
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.indexer.timeout_ms == 0 {
            bail!("indexer.timeout_ms must be positive");
        }
        if self.telemetry.ttl_secs == 0 {
            bail!("telemetry.ttl_secs must be positive");
        }
        self.policy.validate()
    }

    /// Stable, human-readable description of the effective configuration
    ///
    /// Applying `describe` twice to the same loaded config yields
    /// identical output; used by operators to diff deployed settings.
    pub fn describe(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "<unrepresentable>".to_string())
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.selection.max_inputs == 0 {
            bail!("selection.max_inputs must be at least 1");
        }
        if self.fee.output_bps > 10_000 {
            bail!("fee.output_bps must not exceed 10000");
        }
        let adaptive = &self.fee.adaptive;
        if adaptive.stale_soft_factor_bps > 10_000 || adaptive.stale_hard_factor_bps > 10_000 {
            bail!("staleness factors are basis points and must not exceed 10000");
        }
        if adaptive.stale_hard_factor_bps > adaptive.stale_soft_factor_bps {
            bail!("stale_hard_factor_bps must not exceed stale_soft_factor_bps");
        }
        for (name, tier) in [
            ("receipt_lag", &adaptive.receipt_lag),
            ("scheduler_lag", &adaptive.scheduler_lag),
        ] {
            if tier.high_ms >= tier.critical_ms {
                bail!("{name}.high_ms must be below {name}.critical_ms");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_describe_is_idempotent() {
        let config = Config::default();
        assert_eq!(config.describe(), config.describe());
    }

    #[test]
    fn test_from_file_applies_section_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[indexer]
base_url = "http://indexer.internal:8575"

[policy.selection]
mode = "largest_first"
max_inputs = 12
"#
        )
        .unwrap();
        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.indexer.base_url, "http://indexer.internal:8575");
        assert_eq!(config.policy.selection.max_inputs, 12);
        assert_eq!(config.policy.selection.mode, SelectionMode::LargestFirst);
        // Untouched sections keep their defaults
        assert_eq!(config.telemetry.ttl_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_lag_tiers() {
        let mut config = Config::default();
        config.policy.fee.adaptive.receipt_lag.high_ms = 20_000;
        config.policy.fee.adaptive.receipt_lag.critical_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_input_cap() {
        let mut config = Config::default();
        config.policy.selection.max_inputs = 0;
        assert!(config.validate().is_err());
    }
}
