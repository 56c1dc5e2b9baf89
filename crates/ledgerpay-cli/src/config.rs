//! CLI configuration loading and management.

use ledgerpay_core::{Currency, CurrencyKind, Identity, SettlementConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full configuration for the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LedgerpayConfig {
    /// Workflow tunables.
    #[serde(default)]
    pub settlement: SettlementConfig,

    /// Token and contract addresses.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name.
    #[serde(default = "default_network_name")]
    pub name: String,
    /// Token kind: erc20, erc777 or native.
    #[serde(default = "default_token_kind")]
    pub token_kind: String,
    /// Token contract address.
    #[serde(default = "default_token_address")]
    pub token_address: String,
    /// Settlement contract that receives the payer's allowance.
    #[serde(default = "default_proxy_address")]
    pub proxy_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_network_name() -> String {
    "sepolia".into()
}
fn default_token_kind() -> String {
    "erc20".into()
}
fn default_token_address() -> String {
    "0x370DE27fdb7D1Ff1e1BaA7D11c5820a324Cf623C".into()
}
fn default_proxy_address() -> String {
    "0x399F5EE127ce7432E4921a61b8CF52b0af52cbfE".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            token_kind: default_token_kind(),
            token_address: default_token_address(),
            proxy_address: default_proxy_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl NetworkConfig {
    /// The configured payment currency.
    pub fn currency(&self) -> anyhow::Result<Currency> {
        let kind = match self.token_kind.to_ascii_lowercase().as_str() {
            "erc20" => CurrencyKind::Erc20,
            "erc777" => CurrencyKind::Erc777,
            "native" => CurrencyKind::Native,
            other => anyhow::bail!("unknown token kind: {}", other),
        };
        Ok(match kind {
            CurrencyKind::Native => Currency::native(&self.name),
            _ => Currency {
                kind,
                value: self.token_address.clone(),
                network: self.name.clone(),
            },
        })
    }

    pub fn proxy(&self) -> anyhow::Result<Identity> {
        Ok(Identity::parse(&self.proxy_address)?)
    }
}

impl LedgerpayConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: LedgerpayConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}
