use alloy::primitives::{
    Address,
    utils::parse_ether,
};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::{
    amount::Stt,
    provider::{
        ChainParams,
        NativeCurrency,
    },
};

pub const SOMNIA_CHAIN_ID: u64 = 50312;
pub const LOCAL_CHAIN_ID: u64 = 31337;
pub const DEFAULT_SOMNIA_RPC_URL: &str = "https://dream-rpc.somnia.network";
pub const DEFAULT_SOMNIA_EXPLORER_URL: &str = "https://shannon-explorer.somnia.network";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DAILY_TAP_CAP: u32 = 20;
pub const MONTHLY_REWARD_CAP_STT: u64 = 15;
pub const DEFAULT_X_HANDLE: &str = "sireadell";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("SOMNIA_CHAIN_ID_HEX {hex} does not match SOMNIA_CHAIN_ID {decimal}")]
    ChainIdMismatch { decimal: u64, hex: String },
}

/// The network the contract lives on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_url: Url,
    pub explorer_url: Option<Url>,
}

impl NetworkConfig {
    pub fn somnia_testnet() -> Self {
        Self {
            chain_id: SOMNIA_CHAIN_ID,
            chain_name: "Somnia Testnet".to_owned(),
            native_currency: NativeCurrency {
                name: "Somnia Test Token".to_owned(),
                symbol: "STT".to_owned(),
                decimals: 18,
            },
            rpc_url: fixed_url(DEFAULT_SOMNIA_RPC_URL),
            explorer_url: Some(fixed_url(DEFAULT_SOMNIA_EXPLORER_URL)),
        }
    }

    pub fn local() -> Self {
        Self {
            chain_id: LOCAL_CHAIN_ID,
            chain_name: "Hardhat Local".to_owned(),
            native_currency: NativeCurrency {
                name: "Ether".to_owned(),
                symbol: "ETH".to_owned(),
                decimals: 18,
            },
            rpc_url: fixed_url(DEFAULT_LOCAL_RPC_URL),
            explorer_url: None,
        }
    }

    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    pub fn chain_params(&self) -> ChainParams {
        ChainParams {
            chain_id: self.chain_id_hex(),
            chain_name: self.chain_name.clone(),
            native_currency: self.native_currency.clone(),
            rpc_urls: vec![self.rpc_url.to_string()],
            block_explorer_urls: self
                .explorer_url
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

fn fixed_url(raw: &'static str) -> Url {
    Url::parse(raw).unwrap_or_else(|err| panic!("built-in url {raw} is invalid: {err}"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocialConfig {
    pub x_handle: String,
}

impl SocialConfig {
    pub fn follow_url(&self) -> String {
        format!("https://x.com/{}", self.x_handle)
    }
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            x_handle: DEFAULT_X_HANDLE.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapGemConfig {
    pub network: NetworkConfig,
    pub contract_address: Option<Address>,
    pub daily_tap_cap: u32,
    pub monthly_reward_cap: Stt,
    pub social: SocialConfig,
}

impl TapGemConfig {
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            contract_address: None,
            daily_tap_cap: DAILY_TAP_CAP,
            monthly_reward_cap: Stt::from_whole(MONTHLY_REWARD_CAP_STT),
            social: SocialConfig::default(),
        }
    }

    pub fn from_env(network: NetworkConfig) -> Result<Self, ConfigError> {
        Self::new(network).with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `SOMNIA_*`, `TAPGEM_ADDRESS`, cap and social overrides from `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(raw) = lookup("SOMNIA_CHAIN_ID") {
            self.network.chain_id = parse_with("SOMNIA_CHAIN_ID", &raw, u64::from_str)?;
        }
        if let Some(raw) = lookup("SOMNIA_CHAIN_ID_HEX") {
            let parsed = parse_with("SOMNIA_CHAIN_ID_HEX", &raw, |value| {
                let digits = value.strip_prefix("0x").ok_or("missing 0x prefix")?;
                u64::from_str_radix(digits, 16).map_err(|_| "not hex")
            })?;
            if lookup("SOMNIA_CHAIN_ID").is_some() && parsed != self.network.chain_id {
                return Err(ConfigError::ChainIdMismatch {
                    decimal: self.network.chain_id,
                    hex: raw,
                });
            }
            self.network.chain_id = parsed;
        }
        if let Some(raw) = lookup("SOMNIA_CHAIN_NAME") {
            self.network.chain_name = raw;
        }
        if let Some(raw) = lookup("SOMNIA_NATIVE_CURRENCY_NAME") {
            self.network.native_currency.name = raw;
        }
        if let Some(raw) = lookup("SOMNIA_NATIVE_CURRENCY_SYMBOL") {
            self.network.native_currency.symbol = raw;
        }
        if let Some(raw) = lookup("SOMNIA_NATIVE_CURRENCY_DECIMALS") {
            self.network.native_currency.decimals =
                parse_with("SOMNIA_NATIVE_CURRENCY_DECIMALS", &raw, u8::from_str)?;
        }
        if let Some(raw) = lookup("SOMNIA_RPC_URL") {
            self.network.rpc_url = parse_with("SOMNIA_RPC_URL", &raw, Url::parse)?;
        }
        if let Some(raw) = lookup("SOMNIA_BLOCK_EXPLORER_URL") {
            self.network.explorer_url =
                Some(parse_with("SOMNIA_BLOCK_EXPLORER_URL", &raw, Url::parse)?);
        }
        if let Some(raw) = lookup("TAPGEM_ADDRESS") {
            self.contract_address = Some(parse_with("TAPGEM_ADDRESS", &raw, Address::from_str)?);
        }
        if let Some(raw) = lookup("DAILY_TAP_CAP") {
            self.daily_tap_cap = parse_with("DAILY_TAP_CAP", &raw, u32::from_str)?;
        }
        if let Some(raw) = lookup("MONTHLY_REWARD_CAP") {
            self.monthly_reward_cap =
                Stt::from_wei(parse_with("MONTHLY_REWARD_CAP", &raw, parse_ether)?);
        }
        if let Some(raw) = lookup("SOCIAL_X_HANDLE") {
            self.social.x_handle = raw.trim_start_matches('@').to_owned();
        }
        Ok(self)
    }
}

fn parse_with<T, E: ToString>(
    key: &'static str,
    raw: &str,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, ConfigError> {
    parse(raw.trim()).map_err(|err| ConfigError::Invalid {
        key,
        value: raw.to_owned(),
        reason: err.to_string(),
    })
}
