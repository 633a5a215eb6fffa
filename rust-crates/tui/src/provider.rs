use alloy::primitives::{
    Address,
    B256,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::future::Future;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::errors::ChainError;

/// Notification pushed by the wallet outside of any request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

/// EIP-1193 style error returned by a wallet provider request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("provider error {code}: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self::new(Self::USER_REJECTED, message)
    }

    pub fn unrecognized_chain(chain_id: u64) -> Self {
        Self::new(
            Self::UNRECOGNIZED_CHAIN,
            format!("Unrecognized chain ID {chain_id:#x}. Try adding the chain first."),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    pub fn is_user_rejected(&self) -> bool {
        self.code == Self::USER_REJECTED
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Self::UNRECOGNIZED_CHAIN
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// `wallet_addEthereumChain` parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
}

impl ChainParams {
    pub fn numeric_chain_id(&self) -> Result<u64, ProviderError> {
        let digits = self
            .chain_id
            .strip_prefix("0x")
            .or_else(|| self.chain_id.strip_prefix("0X"))
            .ok_or_else(|| {
                ProviderError::new(
                    ProviderError::INVALID_PARAMS,
                    format!("chainId '{}' must be 0x-prefixed hex", self.chain_id),
                )
            })?;
        u64::from_str_radix(digits, 16).map_err(|err| {
            ProviderError::new(
                ProviderError::INVALID_PARAMS,
                format!("chainId '{}' is not valid hex: {err}", self.chain_id),
            )
        })
    }

    pub fn primary_rpc_url(&self) -> Result<&str, ProviderError> {
        self.rpc_urls.first().map(String::as_str).ok_or_else(|| {
            ProviderError::new(ProviderError::INVALID_PARAMS, "rpcUrls must not be empty")
        })
    }
}

/// `getUserStats` output exactly as the contract returns it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawUserStats {
    pub taps_today: U256,
    pub current_streak: U256,
    pub points: U256,
    pub unclaimed_rewards: U256,
    pub total_reward_claimed: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TappedEvent {
    pub user: Address,
    pub reward: U256,
}

/// Confirmed write with the `Tapped` events it emitted, in log order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub tapped: Vec<TappedEvent>,
}

/// Typed handle to a deployed TapGem. Writes resolve after one confirmation.
pub trait TapGemContract {
    fn get_user_stats(
        &self,
        user: Address,
    ) -> impl Future<Output = Result<RawUserStats, ChainError>>;

    fn tap(&self) -> impl Future<Output = Result<TxReceipt, ChainError>>;

    fn claim_rewards(
        &self,
        amount: U256,
    ) -> impl Future<Output = Result<TxReceipt, ChainError>>;
}

/// The wallet the session talks to: account access, network control, and
/// change notifications.
pub trait WalletProvider {
    type Signer: Clone;
    type Contract: TapGemContract;

    /// Prompting request for account access.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, ProviderError>>;

    /// Accounts already authorized, without prompting.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, ProviderError>>;

    fn chain_id(&self) -> impl Future<Output = Result<u64, ProviderError>>;

    fn switch_chain(&self, chain_id: u64) -> impl Future<Output = Result<(), ProviderError>>;

    fn add_chain(&self, params: &ChainParams) -> impl Future<Output = Result<(), ProviderError>>;

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    fn signer(&self, account: Address) -> Option<Self::Signer>;

    fn contract(&self, address: Address, signer: Option<&Self::Signer>) -> Self::Contract;
}
