//! Configuration management for the badge scripts
//!
//! Loads configuration from a TOML file with environment variable substitution.
//! Values are validated once at startup; nothing reads the environment later.

use crate::error::{BadgeError, BadgeResult};

use ethers::types::Address;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const BUILTIN_CONFIG: &str = include_str!("../config/default.toml");

lazy_static! {
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern");
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub badge: BadgeConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub replacement: ReplacementConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the signer's private key
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BadgeConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub token_uri: String,
    #[serde(default)]
    pub artifact_path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub price_multiplier: u64,
    pub price_floor_gwei: u64,
    /// Used when the node reports no legacy gas price
    pub fallback_price_gwei: u64,
    pub gas_limit_buffer_percent: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            price_multiplier: 3,
            price_floor_gwei: 50,
            fallback_price_gwei: 10,
            gas_limit_buffer_percent: 20,
        }
    }
}

/// Nonce and price used when replacing a stuck mint. Kept as strings because
/// both usually come straight from environment substitution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplacementConfig {
    pub nonce: String,
    pub gas_gwei: String,
}

impl Default for ReplacementConfig {
    fn default() -> Self {
        Self {
            nonce: String::new(),
            gas_gwei: "20000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub confirmations: usize,
    pub primary_timeout_ms: u64,
    pub fallback_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            primary_timeout_ms: 180_000,
            fallback_timeout_ms: 300_000,
            poll_interval_ms: 2_000,
        }
    }
}

impl ConfirmationConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_timeout_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Contract and token URI a mint is sent against
#[derive(Debug, Clone, PartialEq)]
pub struct MintTarget {
    pub contract: Address,
    pub token_uri: String,
}

/// Mint target plus the explicit nonce and price of a replacement
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementTarget {
    pub mint: MintTarget,
    pub nonce: u64,
    pub gas_gwei: u64,
}

impl Settings {
    /// Load settings from `path`, `$BADGE_CONFIG`, `config/default.toml`, or
    /// the built-in defaults, in that order.
    pub fn load(path: Option<&Path>) -> BadgeResult<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var("BADGE_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                default.exists().then_some(default)
            });

        let config_str = match config_path {
            Some(config_path) => std::fs::read_to_string(&config_path).map_err(|e| {
                BadgeError::Config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                ))
            })?,
            None => {
                tracing::debug!("No config file found, using built-in defaults");
                BUILTIN_CONFIG.to_string()
            }
        };

        Self::from_toml(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(input: &str) -> BadgeResult<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings = toml::from_str(&config_str)
            .map_err(|e| BadgeError::Config(format!("Failed to parse configuration: {}", e)))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration shared by every command
    fn validate(&self) -> BadgeResult<()> {
        if self.network.rpc_url.trim().is_empty() {
            return Err(BadgeError::Config("network.rpc_url is empty".to_string()));
        }
        if self.wallet.private_key_env.trim().is_empty() {
            return Err(BadgeError::Config(
                "wallet.private_key_env is empty".to_string(),
            ));
        }
        if self.gas.price_multiplier == 0 {
            return Err(BadgeError::Config(
                "gas.price_multiplier must be positive".to_string(),
            ));
        }

        let confirmation = &self.confirmation;
        if confirmation.confirmations == 0 {
            return Err(BadgeError::Config(
                "confirmation.confirmations must be at least 1".to_string(),
            ));
        }
        if confirmation.primary_timeout_ms == 0 {
            return Err(BadgeError::Config(
                "confirmation.primary_timeout_ms must be positive".to_string(),
            ));
        }
        if confirmation.poll_interval_ms == 0 {
            return Err(BadgeError::Config(
                "confirmation.poll_interval_ms must be positive".to_string(),
            ));
        }
        // replace polls with the primary timeout as its ceiling
        if confirmation.poll_interval_ms >= confirmation.primary_timeout_ms {
            return Err(BadgeError::Config(
                "confirmation.poll_interval_ms must be shorter than primary_timeout_ms"
                    .to_string(),
            ));
        }
        if confirmation.poll_interval_ms >= confirmation.fallback_timeout_ms {
            return Err(BadgeError::Config(
                "confirmation.poll_interval_ms must be shorter than fallback_timeout_ms"
                    .to_string(),
            ));
        }
        if confirmation.fallback_timeout_ms < confirmation.primary_timeout_ms {
            tracing::warn!(
                "Fallback ceiling {}ms is shorter than primary timeout {}ms",
                confirmation.fallback_timeout_ms,
                confirmation.primary_timeout_ms
            );
        }

        Ok(())
    }

    /// Resolve the signer's private key from the configured variable
    pub fn private_key(&self) -> BadgeResult<String> {
        env::var(&self.wallet.private_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                BadgeError::Config(format!("Set {} in .env", self.wallet.private_key_env))
            })
    }

    /// Path of the compiled contract artifact used by deploy
    pub fn artifact_path(&self) -> BadgeResult<PathBuf> {
        let path = self.badge.artifact_path.trim();
        if path.is_empty() {
            return Err(BadgeError::Config(
                "badge.artifact_path is empty".to_string(),
            ));
        }
        Ok(PathBuf::from(path))
    }

    /// Validated contract and token URI for a mint
    pub fn mint_target(&self, uri_override: Option<&str>) -> BadgeResult<MintTarget> {
        let address = self.badge.address.trim();
        let token_uri = uri_override.unwrap_or(&self.badge.token_uri).trim();
        if address.is_empty() || token_uri.is_empty() {
            return Err(BadgeError::Config(
                "Missing BADGE_ADDRESS or TOKEN_URI in .env".to_string(),
            ));
        }

        let contract = Address::from_str(address)
            .map_err(|e| BadgeError::Config(format!("Invalid badge address {}: {}", address, e)))?;

        Ok(MintTarget {
            contract,
            token_uri: token_uri.to_string(),
        })
    }

    /// Validated mint target, nonce and gas price for a replacement
    pub fn replacement_target(
        &self,
        uri_override: Option<&str>,
        nonce_override: Option<u64>,
        gas_gwei_override: Option<u64>,
    ) -> BadgeResult<ReplacementTarget> {
        let mint = self.mint_target(uri_override)?;

        let nonce = match nonce_override {
            Some(nonce) => nonce,
            None => parse_number("NONCE", &self.replacement.nonce)?,
        };
        let gas_gwei = match gas_gwei_override {
            Some(gwei) => gwei,
            None => parse_number("GAS_GWEI", &self.replacement.gas_gwei)?,
        };
        if gas_gwei == 0 {
            return Err(BadgeError::Config("GAS_GWEI must be positive".to_string()));
        }

        Ok(ReplacementTarget {
            mint,
            nonce,
            gas_gwei,
        })
    }
}

fn parse_number(name: &str, value: &str) -> BadgeResult<u64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BadgeError::Config(format!("Set {} in .env", name)));
    }
    value
        .parse::<u64>()
        .map_err(|_| BadgeError::Config(format!("{} is not a number: {:?}", name, value)))
}

/// Substitute environment variables in the format ${VAR_NAME} or
/// ${VAR_NAME:-default}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |cap: &regex::Captures| {
            match env::var(&cap[1]) {
                Ok(value) if !value.is_empty() => value,
                _ => cap
                    .get(2)
                    .map(|default| default.as_str().to_string())
                    .unwrap_or_default(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BADGE: &str = "0x65BD186E69765A250E3f3f0f9b2103DfcaFB63fd";

    fn sample(badge: &str, uri: &str, nonce: &str) -> String {
        format!(
            r#"
[network]
name = "didlab"
rpc_url = "http://127.0.0.1:8545"
chain_id = 252501

[wallet]
private_key_env = "PRIVATE_KEY"

[badge]
address = "{badge}"
token_uri = "{uri}"
artifact_path = "artifacts/DidLabBadge.json"

[replacement]
nonce = "{nonce}"
gas_gwei = "80"
"#
        )
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("BADGE_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${BADGE_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_env_var_default_and_missing() {
        env::remove_var("BADGE_TEST_UNSET");
        assert_eq!(substitute_env_vars("${BADGE_TEST_UNSET:-20000}"), "20000");
        assert_eq!(substitute_env_vars("a${BADGE_TEST_UNSET}b"), "ab");

        env::set_var("BADGE_TEST_SET", "80");
        assert_eq!(substitute_env_vars("${BADGE_TEST_SET:-20000}"), "80");
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_toml(&sample(BADGE, "ipfs://Qm", "2")).unwrap();
        assert_eq!(settings.gas.price_multiplier, 3);
        assert_eq!(settings.gas.gas_limit_buffer_percent, 20);
        assert_eq!(settings.confirmation.confirmations, 1);
        assert_eq!(
            settings.confirmation.primary_timeout(),
            Duration::from_secs(180)
        );
        assert_eq!(
            settings.confirmation.fallback_timeout(),
            Duration::from_secs(300)
        );
        assert_eq!(settings.confirmation.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_builtin_config_parses() {
        let settings: Settings = toml::from_str(&substitute_env_vars(BUILTIN_CONFIG)).unwrap();
        assert_eq!(settings.network.chain_id, 252501);
        assert!(!settings.network.rpc_url.is_empty());
    }

    #[test]
    fn test_mint_target_requires_address_and_uri() {
        let settings = Settings::from_toml(&sample("", "ipfs://Qm", "")).unwrap();
        assert!(matches!(
            settings.mint_target(None),
            Err(BadgeError::Config(_))
        ));

        let settings = Settings::from_toml(&sample(BADGE, "", "")).unwrap();
        assert!(settings.mint_target(None).is_err());
        let target = settings.mint_target(Some("ipfs://override")).unwrap();
        assert_eq!(target.token_uri, "ipfs://override");
    }

    #[test]
    fn test_mint_target_rejects_bad_address() {
        let settings = Settings::from_toml(&sample("0xnothex", "ipfs://Qm", "")).unwrap();
        assert!(matches!(
            settings.mint_target(None),
            Err(BadgeError::Config(_))
        ));
    }

    #[test]
    fn test_replacement_requires_numeric_nonce() {
        let settings = Settings::from_toml(&sample(BADGE, "ipfs://Qm", "")).unwrap();
        assert!(settings.replacement_target(None, None, None).is_err());

        let settings = Settings::from_toml(&sample(BADGE, "ipfs://Qm", "two")).unwrap();
        assert!(matches!(
            settings.replacement_target(None, None, None),
            Err(BadgeError::Config(_))
        ));

        let settings = Settings::from_toml(&sample(BADGE, "ipfs://Qm", "2")).unwrap();
        let target = settings.replacement_target(None, None, None).unwrap();
        assert_eq!(target.nonce, 2);
        assert_eq!(target.gas_gwei, 80);

        let target = settings.replacement_target(None, Some(7), Some(120)).unwrap();
        assert_eq!(target.nonce, 7);
        assert_eq!(target.gas_gwei, 120);
    }

    #[test]
    fn test_invalid_confirmation_settings_rejected() {
        let mut input = sample(BADGE, "ipfs://Qm", "");
        input.push_str("\n[confirmation]\nconfirmations = 0\n");
        assert!(Settings::from_toml(&input).is_err());

        let mut input = sample(BADGE, "ipfs://Qm", "");
        input.push_str("\n[confirmation]\npoll_interval_ms = 400000\n");
        assert!(Settings::from_toml(&input).is_err());
    }

    #[test]
    fn test_zero_primary_timeout_rejected() {
        let mut input = sample(BADGE, "ipfs://Qm", "");
        input.push_str("\n[confirmation]\nprimary_timeout_ms = 0\npoll_interval_ms = 0\n");
        assert!(matches!(
            Settings::from_toml(&input),
            Err(BadgeError::Config(msg)) if msg.contains("primary_timeout_ms")
        ));

        let mut input = sample(BADGE, "ipfs://Qm", "");
        input.push_str("\n[confirmation]\nprimary_timeout_ms = 0\n");
        assert!(matches!(
            Settings::from_toml(&input),
            Err(BadgeError::Config(msg)) if msg.contains("primary_timeout_ms")
        ));
    }

    #[test]
    fn test_poll_interval_must_be_shorter_than_primary_timeout() {
        // Within the fallback ceiling but not the primary timeout
        let mut input = sample(BADGE, "ipfs://Qm", "");
        input.push_str(
            "\n[confirmation]\nprimary_timeout_ms = 1000\nfallback_timeout_ms = 5000\npoll_interval_ms = 1000\n",
        );
        assert!(matches!(
            Settings::from_toml(&input),
            Err(BadgeError::Config(msg)) if msg.contains("shorter than primary_timeout_ms")
        ));

        let mut input = sample(BADGE, "ipfs://Qm", "");
        input.push_str(
            "\n[confirmation]\nprimary_timeout_ms = 1000\nfallback_timeout_ms = 5000\npoll_interval_ms = 999\n",
        );
        assert!(Settings::from_toml(&input).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample(BADGE, "ipfs://Qm", "3").as_bytes())
            .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.network.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(settings.replacement_target(None, None, None).unwrap().nonce, 3);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/badge.toml")));
        assert!(matches!(result, Err(BadgeError::Config(_))));
    }
}
