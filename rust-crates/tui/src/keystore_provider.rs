use alloy::{
    network::{
        EthereumWallet,
        ReceiptResponse as _,
    },
    primitives::{
        Address,
        U256,
    },
    providers::{
        PendingTransactionError,
        Provider,
        ProviderBuilder,
    },
    rpc::types::TransactionReceipt,
    signers::local::PrivateKeySigner,
    transports::TransportError,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use generated_abi::{
    tapgem_types::TapGem,
    tapped_events,
};
use std::{
    collections::BTreeMap,
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};
use tokio::sync::broadcast;
use tracing::{
    info,
    warn,
};
use url::Url;

use crate::{
    errors::ChainError,
    provider::{
        ChainParams,
        NativeCurrency,
        ProviderError,
        ProviderEvent,
        RawUserStats,
        TapGemContract,
        TappedEvent,
        TxReceipt,
        WalletProvider,
    },
    storage::write_atomic,
};

/// How the local wallet answers network switch requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwitchPolicy {
    #[default]
    Approve,
    Decline,
}

#[derive(Clone, Debug)]
struct ActiveChain {
    chain_id: u64,
    rpc_url: Url,
}

#[derive(Debug)]
struct ChainState {
    active: ActiveChain,
    known: BTreeMap<u64, ChainParams>,
}

/// Wallet backed by a decrypted keystore. Knows a set of networks (persisted
/// as JSON next to the keystores) and talks to whichever one is active.
#[derive(Clone)]
pub struct KeystoreProvider {
    signer: Option<PrivateKeySigner>,
    authorized: Arc<AtomicBool>,
    state: Arc<Mutex<ChainState>>,
    registry_path: Option<PathBuf>,
    switch_policy: SwitchPolicy,
    events: broadcast::Sender<ProviderEvent>,
}

impl KeystoreProvider {
    /// Starts on whatever chain `rpc_url` serves.
    pub async fn connect(
        rpc_url: Url,
        signer: Option<PrivateKeySigner>,
        registry_path: Option<PathBuf>,
        switch_policy: SwitchPolicy,
    ) -> Result<Self> {
        let chain_id = remote_chain_id(&rpc_url)
            .await
            .wrap_err_with(|| format!("querying chain id from {rpc_url}"))?;
        let mut known = match &registry_path {
            Some(path) => load_registry(path)?,
            None => BTreeMap::new(),
        };
        known
            .entry(chain_id)
            .or_insert_with(|| unnamed_chain(chain_id, &rpc_url));
        info!(chain_id, %rpc_url, networks = known.len(), "wallet provider ready");

        let (events, _) = broadcast::channel(32);
        Ok(Self {
            signer,
            authorized: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(ChainState {
                active: ActiveChain { chain_id, rpc_url },
                known,
            })),
            registry_path,
            switch_policy,
            events,
        })
    }

    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(PrivateKeySigner::address)
    }

    fn with_state<R>(
        &self,
        f: impl FnOnce(&mut ChainState) -> R,
    ) -> Result<R, ProviderError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ProviderError::internal("wallet state lock poisoned"))?;
        Ok(f(&mut state))
    }

    fn active_rpc_url(&self) -> Result<Url, ProviderError> {
        self.with_state(|state| state.active.rpc_url.clone())
    }

    fn activate(&self, chain_id: u64) -> Result<(), ProviderError> {
        let rpc_url = self
            .with_state(|state| state.known.get(&chain_id).cloned())?
            .ok_or_else(|| ProviderError::unrecognized_chain(chain_id))?
            .primary_rpc_url()
            .and_then(|raw| {
                Url::parse(raw).map_err(|err| {
                    ProviderError::new(ProviderError::INVALID_PARAMS, err.to_string())
                })
            })?;
        self.with_state(|state| state.active = ActiveChain { chain_id, rpc_url })?;
        let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
        info!(chain_id, "wallet switched network");
        Ok(())
    }

    fn persist(&self) -> Result<(), ProviderError> {
        let Some(path) = &self.registry_path else {
            return Ok(());
        };
        let networks: Vec<ChainParams> =
            self.with_state(|state| state.known.values().cloned().collect())?;
        let write = || -> Result<()> {
            let json = serde_json::to_vec_pretty(&networks)?;
            write_atomic(path, &json)
        };
        write().map_err(|err| {
            ProviderError::internal(format!("saving networks to {}: {err}", path.display()))
        })
    }
}

fn unnamed_chain(chain_id: u64, rpc_url: &Url) -> ChainParams {
    ChainParams {
        chain_id: format!("{chain_id:#x}"),
        chain_name: format!("Chain {chain_id}"),
        native_currency: NativeCurrency {
            name: "Ether".to_owned(),
            symbol: "ETH".to_owned(),
            decimals: 18,
        },
        rpc_urls: vec![rpc_url.to_string()],
        block_explorer_urls: Vec::new(),
    }
}

fn load_registry(path: &Path) -> Result<BTreeMap<u64, ChainParams>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = fs::read(path)
        .wrap_err_with(|| format!("reading network registry {}", path.display()))?;
    let networks: Vec<ChainParams> = serde_json::from_slice(&data)
        .wrap_err_with(|| format!("parsing network registry {}", path.display()))?;
    let mut known = BTreeMap::new();
    for params in networks {
        let chain_id = params.numeric_chain_id()?;
        known.insert(chain_id, params);
    }
    Ok(known)
}

async fn remote_chain_id(rpc_url: &Url) -> Result<u64, ProviderError> {
    ProviderBuilder::new()
        .connect_http(rpc_url.clone())
        .get_chain_id()
        .await
        .map_err(|err| ProviderError::internal(err.to_string()))
}

impl WalletProvider for KeystoreProvider {
    type Signer = PrivateKeySigner;
    type Contract = AlloyTapGem;

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let address = self
            .address()
            .ok_or_else(|| ProviderError::user_rejected("Wallet is locked."))?;
        self.authorized.store(true, Ordering::SeqCst);
        Ok(vec![address])
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        if !self.authorized.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.address().into_iter().collect())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.with_state(|state| state.active.chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        if self.switch_policy == SwitchPolicy::Decline {
            return Err(ProviderError::user_rejected("User rejected the network switch."));
        }
        if self.with_state(|state| state.active.chain_id)? == chain_id {
            return Ok(());
        }
        self.activate(chain_id)
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), ProviderError> {
        if self.switch_policy == SwitchPolicy::Decline {
            return Err(ProviderError::user_rejected("User rejected adding the network."));
        }
        let chain_id = params.numeric_chain_id()?;
        let rpc_url = Url::parse(params.primary_rpc_url()?).map_err(|err| {
            ProviderError::new(ProviderError::INVALID_PARAMS, err.to_string())
        })?;
        let served = remote_chain_id(&rpc_url).await?;
        if served != chain_id {
            return Err(ProviderError::new(
                ProviderError::INVALID_PARAMS,
                format!("RPC {rpc_url} serves chain {served}, not {chain_id}"),
            ));
        }
        self.with_state(|state| state.known.insert(chain_id, params.clone()))?;
        if let Err(err) = self.persist() {
            warn!(%err, "network registry not saved");
        }
        info!(chain_id, name = %params.chain_name, "network added to wallet");
        self.activate(chain_id)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn signer(&self, account: Address) -> Option<PrivateKeySigner> {
        self.signer
            .as_ref()
            .filter(|signer| signer.address() == account)
            .cloned()
    }

    fn contract(&self, address: Address, signer: Option<&PrivateKeySigner>) -> AlloyTapGem {
        let rpc_url = match self.active_rpc_url() {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(%err, "no active rpc url");
                None
            }
        };
        AlloyTapGem {
            address,
            rpc_url,
            wallet: signer.cloned().map(EthereumWallet::from),
        }
    }
}

/// TapGem over JSON-RPC. Writes need a wallet.
#[derive(Clone)]
pub struct AlloyTapGem {
    address: Address,
    rpc_url: Option<Url>,
    wallet: Option<EthereumWallet>,
}

impl AlloyTapGem {
    fn rpc_url(&self) -> Result<Url, ChainError> {
        self.rpc_url
            .clone()
            .ok_or_else(|| ChainError::Other("no active network".into()))
    }

    fn wallet(&self) -> Result<EthereumWallet, ChainError> {
        self.wallet
            .clone()
            .ok_or_else(|| ChainError::Other("no signer attached".into()))
    }
}

impl TapGemContract for AlloyTapGem {
    async fn get_user_stats(&self, user: Address) -> Result<RawUserStats, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.rpc_url()?);
        let stats = TapGem::new(self.address, provider)
            .getUserStats(user)
            .call()
            .await
            .map_err(contract_error)?;
        Ok(RawUserStats {
            taps_today: stats.tapsToday,
            current_streak: stats.currentStreak,
            points: stats.points,
            unclaimed_rewards: stats.unclaimedRewards,
            total_reward_claimed: stats.totalRewardClaimed,
        })
    }

    async fn tap(&self) -> Result<TxReceipt, ChainError> {
        let provider = ProviderBuilder::new()
            .wallet(self.wallet()?)
            .connect_http(self.rpc_url()?);
        let receipt = TapGem::new(self.address, provider)
            .tap()
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|err| pending_error(&err))?;
        into_receipt(receipt)
    }

    async fn claim_rewards(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        let provider = ProviderBuilder::new()
            .wallet(self.wallet()?)
            .connect_http(self.rpc_url()?);
        let receipt = TapGem::new(self.address, provider)
            .claimRewards(amount)
            .send()
            .await
            .map_err(contract_error)?
            .get_receipt()
            .await
            .map_err(|err| pending_error(&err))?;
        into_receipt(receipt)
    }
}

fn into_receipt(receipt: TransactionReceipt) -> Result<TxReceipt, ChainError> {
    let tx_hash = receipt.transaction_hash;
    if !receipt.status() {
        return Err(ChainError::Reverted(tx_hash.to_string()));
    }
    let tapped = tapped_events(receipt.inner.logs())
        .into_iter()
        .map(|event| TappedEvent {
            user: event.user,
            reward: event.reward,
        })
        .collect();
    Ok(TxReceipt { tx_hash, tapped })
}

fn contract_error(err: alloy::contract::Error) -> ChainError {
    match err {
        alloy::contract::Error::TransportError(err) => transport_error(&err),
        other => ChainError::Other(other.to_string()),
    }
}

/// Waiting on a receipt only fails for transport reasons: the RPC call itself,
/// the watcher timing out, or the heartbeat going away.
fn pending_error(err: &PendingTransactionError) -> ChainError {
    match err {
        PendingTransactionError::TransportError(err) => transport_error(err),
        other => ChainError::Transport(other.to_string()),
    }
}

fn transport_error(err: &TransportError) -> ChainError {
    match err.as_error_resp() {
        Some(payload) => ChainError::Rpc {
            code: payload.code,
            message: payload.message.to_string(),
        },
        None => ChainError::Transport(err.to_string()),
    }
}
