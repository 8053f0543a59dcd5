//! Configuration management for the Trinity Coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub coordinator: CoordinatorConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub routing: RoutingConfig,
    pub consensus: ConsensusConfig,
    pub multisig: MultiSigConfig,
    pub feed: FeedConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub instance_id: String,
    pub health_check_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// Terminal verification records older than this are evicted by the sweeper.
    pub record_retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Hop bound for the path search. Bounds path explosion, default 3.
    pub max_hops: usize,
    /// Latency charged for a same-chain pool hop, near-zero in practice.
    pub pool_hop_latency_secs: f64,
    /// Floor applied when a pool does not declare its own minimum.
    pub default_min_amount_usd: f64,
    /// Reference rate used for the slippage estimate. The exact figure is
    /// advisory, not load-bearing for route selection.
    pub static_exchange_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    /// Chains that must agree before a transaction is considered verified.
    pub threshold: usize,
    /// Overall verification deadline, shared by all per-chain checks.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiSigConfig {
    /// Validity window after which a pending request expires.
    pub validity_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Path to a JSON pool/bridge snapshot, polled on an interval.
    pub snapshot_path: Option<String>,
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    /// Confirmations required before this chain's report counts as verified.
    pub required_confirmations: u64,
    pub enabled: bool,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("TRINITY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        if self.consensus.threshold == 0 {
            anyhow::bail!("Consensus threshold must be at least 1");
        }

        if self.consensus.threshold > self.enabled_chains().len() {
            anyhow::bail!(
                "Consensus threshold {} exceeds the {} enabled chains",
                self.consensus.threshold,
                self.enabled_chains().len()
            );
        }

        if self.routing.max_hops == 0 {
            anyhow::bail!("routing.max_hops must be at least 1");
        }

        if self.routing.static_exchange_rate <= 0.0 {
            anyhow::bail!("routing.static_exchange_rate must be positive");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by name
    pub fn get_chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chains.get(name).filter(|c| c.enabled)
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_hops: 3,
            pool_hop_latency_secs: 1.0,
            default_min_amount_usd: 1.0,
            static_exchange_rate: 1.0,
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "snapshot_path = \"/var/feeds/${TEST_VAR}/pools.json\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "snapshot_path = \"/var/feeds/test_value/pools.json\"");
    }

    #[test]
    fn test_threshold_validation() {
        let mut chains = HashMap::new();
        chains.insert(
            "ethereum".to_string(),
            ChainConfig {
                name: "Ethereum".to_string(),
                required_confirmations: 12,
                enabled: true,
            },
        );

        let settings = Settings {
            coordinator: CoordinatorConfig {
                instance_id: "test".to_string(),
                health_check_interval_secs: 30,
                sweep_interval_secs: 60,
                record_retention_secs: 3600,
            },
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9090,
            },
            routing: RoutingConfig::default(),
            consensus: ConsensusConfig {
                threshold: 2,
                timeout_ms: 5000,
            },
            multisig: MultiSigConfig {
                validity_window_secs: 600,
            },
            feed: FeedConfig {
                snapshot_path: None,
                refresh_interval_secs: 30,
            },
            chains,
        };

        // Threshold 2 with a single enabled chain must be rejected
        assert!(settings.validate().is_err());
    }
}
