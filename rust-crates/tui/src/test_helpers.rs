use alloy::primitives::{
    Address,
    B256,
    U256,
    address,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::broadcast;

use crate::{
    amount::Stt,
    errors::ChainError,
    provider::{
        ChainParams,
        ProviderError,
        ProviderEvent,
        RawUserStats,
        TapGemContract,
        TappedEvent,
        TxReceipt,
        WalletProvider,
    },
};

pub fn alice() -> Address {
    address!("0x00000000000000000000000000000000000a11ce")
}

pub fn bob() -> Address {
    address!("0x0000000000000000000000000000000000000b0b")
}

pub fn tapgem_address() -> Address {
    address!("0x00000000000000000000000000000000000000c0")
}

pub fn stats(taps_today: u64, unclaimed: Stt, claimed: Stt) -> RawUserStats {
    RawUserStats {
        taps_today: U256::from(taps_today),
        current_streak: U256::from(1u64),
        points: U256::from(taps_today),
        unclaimed_rewards: unclaimed.wei(),
        total_reward_claimed: claimed.wei(),
    }
}

#[derive(Debug)]
pub struct FakeWalletState {
    pub accounts: Vec<Address>,
    pub authorized: bool,
    pub chain_id: u64,
    pub known_chains: Vec<u64>,
    pub reject_accounts: bool,
    pub reject_switch: bool,
    pub reject_add: bool,
    pub account_requests: usize,
    pub switch_calls: usize,
    pub added_chains: Vec<ChainParams>,
}

/// In-memory wallet that records every request it receives.
#[derive(Clone)]
pub struct FakeWalletProvider {
    state: Arc<Mutex<FakeWalletState>>,
    events: broadcast::Sender<ProviderEvent>,
    contract: FakeTapGem,
}

impl FakeWalletProvider {
    pub fn new(account: Address, chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Arc::new(Mutex::new(FakeWalletState {
                accounts: vec![account],
                authorized: false,
                chain_id,
                known_chains: vec![chain_id],
                reject_accounts: false,
                reject_switch: false,
                reject_add: false,
                account_requests: 0,
                switch_calls: 0,
                added_chains: Vec::new(),
            })),
            events,
            contract: FakeTapGem::default(),
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeWalletState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn tapgem(&self) -> &FakeTapGem {
        &self.contract
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeSigner(pub Address);

impl WalletProvider for FakeWalletProvider {
    type Signer = FakeSigner;
    type Contract = FakeTapGem;

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.with_state(|s| {
            s.account_requests += 1;
            if s.reject_accounts {
                return Err(ProviderError::user_rejected("User rejected the request."));
            }
            s.authorized = true;
            Ok(s.accounts.clone())
        })
    }

    async fn accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(self.with_state(|s| {
            if s.authorized {
                s.accounts.clone()
            } else {
                Vec::new()
            }
        }))
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.with_state(|s| s.chain_id))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.with_state(|s| {
            s.switch_calls += 1;
            if s.reject_switch {
                return Err(ProviderError::user_rejected("User rejected the request."));
            }
            if !s.known_chains.contains(&chain_id) {
                return Err(ProviderError::unrecognized_chain(chain_id));
            }
            s.chain_id = chain_id;
            Ok(())
        })?;
        self.emit(ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> Result<(), ProviderError> {
        let chain_id = params.numeric_chain_id()?;
        self.with_state(|s| {
            s.added_chains.push(params.clone());
            if s.reject_add {
                return Err(ProviderError::user_rejected("User rejected the request."));
            }
            s.known_chains.push(chain_id);
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn signer(&self, account: Address) -> Option<FakeSigner> {
        self.with_state(|s| s.accounts.contains(&account).then_some(FakeSigner(account)))
    }

    fn contract(&self, _address: Address, signer: Option<&FakeSigner>) -> FakeTapGem {
        FakeTapGem {
            state: self.contract.state.clone(),
            sender: signer.map(|signer| signer.0),
        }
    }
}

#[derive(Debug)]
pub struct FakeTapGemState {
    pub stats: HashMap<Address, RawUserStats>,
    pub reward_per_tap: U256,
    pub daily_cap: u64,
    pub read_calls: usize,
    pub tap_calls: usize,
    pub claim_calls: Vec<U256>,
    pub read_failure: Option<ChainError>,
    pub tap_failure: Option<ChainError>,
    pub claim_failure: Option<ChainError>,
    /// Events placed ahead of the caller's own `Tapped` in every receipt.
    pub foreign_tapped: Vec<TappedEvent>,
    pub emit_tapped: bool,
}

impl Default for FakeTapGemState {
    fn default() -> Self {
        Self {
            stats: HashMap::new(),
            reward_per_tap: Stt::from_cents(5).wei(),
            daily_cap: 20,
            read_calls: 0,
            tap_calls: 0,
            claim_calls: Vec::new(),
            read_failure: None,
            tap_failure: None,
            claim_failure: None,
            foreign_tapped: Vec::new(),
            emit_tapped: true,
        }
    }
}

/// TapGem double with the contract's daily cap and claim bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct FakeTapGem {
    state: Arc<Mutex<FakeTapGemState>>,
    sender: Option<Address>,
}

impl FakeTapGem {
    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeTapGemState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_stats(&self, user: Address, stats: RawUserStats) {
        self.with_state(|s| {
            s.stats.insert(user, stats);
        });
    }

    fn receipt(tapped: Vec<TappedEvent>) -> TxReceipt {
        TxReceipt {
            tx_hash: B256::repeat_byte(0xab),
            tapped,
        }
    }
}

impl TapGemContract for FakeTapGem {
    async fn get_user_stats(&self, user: Address) -> Result<RawUserStats, ChainError> {
        self.with_state(|s| {
            s.read_calls += 1;
            if let Some(err) = s.read_failure.clone() {
                return Err(err);
            }
            Ok(s.stats.get(&user).cloned().unwrap_or_default())
        })
    }

    async fn tap(&self) -> Result<TxReceipt, ChainError> {
        let sender = self.sender;
        self.with_state(|s| {
            s.tap_calls += 1;
            if let Some(err) = s.tap_failure.clone() {
                return Err(err);
            }
            let user = sender.ok_or_else(|| ChainError::Other("no signer attached".into()))?;
            let reward = s.reward_per_tap;
            let daily_cap = U256::from(s.daily_cap);
            let entry = s.stats.entry(user).or_default();
            if entry.taps_today >= daily_cap {
                return Err(ChainError::Rpc {
                    code: 3,
                    message: "execution reverted: max taps reached".into(),
                });
            }
            entry.taps_today += U256::from(1u64);
            entry.points += U256::from(1u64);
            entry.unclaimed_rewards += reward;
            let mut tapped = s.foreign_tapped.clone();
            if s.emit_tapped {
                tapped.push(TappedEvent { user, reward });
            }
            Ok(Self::receipt(tapped))
        })
    }

    async fn claim_rewards(&self, amount: U256) -> Result<TxReceipt, ChainError> {
        let sender = self.sender;
        self.with_state(|s| {
            s.claim_calls.push(amount);
            if let Some(err) = s.claim_failure.clone() {
                return Err(err);
            }
            let user = sender.ok_or_else(|| ChainError::Other("no signer attached".into()))?;
            let entry = s.stats.entry(user).or_default();
            if entry.unclaimed_rewards < amount {
                return Err(ChainError::Rpc {
                    code: 3,
                    message: "execution reverted: amount exceeds unclaimed".into(),
                });
            }
            entry.unclaimed_rewards -= amount;
            entry.total_reward_claimed += amount;
            Ok(Self::receipt(Vec::new()))
        })
    }
}
