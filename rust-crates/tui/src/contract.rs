use alloy::primitives::Address;
use tracing::{
    info,
    warn,
};

use crate::{
    amount::Stt,
    errors::{
        TapError,
        classify,
    },
    gate::VerificationGate,
    provider::{
        RawUserStats,
        TapGemContract,
        TxReceipt,
        WalletProvider,
    },
    session::SessionManager,
    storage::SessionStore,
};

/// Per-user counters as last read from the contract.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserStats {
    pub taps_today: u32,
    pub current_streak: u64,
    pub points: u64,
    pub unclaimed_rewards: Stt,
    pub total_reward_claimed: Stt,
}

impl From<RawUserStats> for UserStats {
    fn from(raw: RawUserStats) -> Self {
        Self {
            taps_today: u32::try_from(raw.taps_today).unwrap_or(u32::MAX),
            current_streak: u64::try_from(raw.current_streak).unwrap_or(u64::MAX),
            points: u64::try_from(raw.points).unwrap_or(u64::MAX),
            unclaimed_rewards: Stt::from_wei(raw.unclaimed_rewards),
            total_reward_claimed: Stt::from_wei(raw.total_reward_claimed),
        }
    }
}

impl UserStats {
    pub fn at_daily_cap(&self, daily_tap_cap: u32) -> bool {
        self.taps_today >= daily_tap_cap
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapOutcome {
    /// The verification gate has to be passed first.
    VerificationRequired,
    /// Nothing was sent; today's taps are used up.
    DailyLimitReached,
    /// Confirmed. `reward` is the amount from this account's `Tapped` event.
    Tapped { reward: Option<Stt> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    NothingToClaim,
    MonthlyCapReached,
    Claimed { amount: Stt },
}

/// Reads and writes TapGem on behalf of the current session. The contract
/// handle is bound to the session's signer anew on every call.
#[derive(Clone, Debug)]
pub struct ContractClient {
    address: Address,
    daily_tap_cap: u32,
    monthly_reward_cap: Stt,
    stats: Option<UserStats>,
}

impl ContractClient {
    pub fn new(address: Address, daily_tap_cap: u32, monthly_reward_cap: Stt) -> Self {
        Self {
            address,
            daily_tap_cap,
            monthly_reward_cap,
            stats: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Stats of the connected account from the last successful read.
    pub fn stats(&self) -> Option<&UserStats> {
        self.stats.as_ref()
    }

    pub fn forget_stats(&mut self) {
        self.stats = None;
    }

    /// Reads any address. Needs a provider, not a signer.
    pub async fn lookup_stats<P: WalletProvider>(
        &self,
        session: &SessionManager<P>,
        user: Address,
    ) -> Result<UserStats, TapError> {
        let provider = session.provider().ok_or(TapError::ProviderUnavailable)?;
        let contract = provider.contract(self.address, None);
        let raw = contract.get_user_stats(user).await.map_err(|err| {
            warn!(%user, %err, "getUserStats failed");
            TapError::ReadFailed(err.to_string())
        })?;
        Ok(UserStats::from(raw))
    }

    /// Reads `user` and caches the result as the session's stats.
    pub async fn read_stats<P: WalletProvider>(
        &mut self,
        session: &SessionManager<P>,
        user: Address,
    ) -> Result<UserStats, TapError> {
        let stats = self.lookup_stats(session, user).await?;
        self.stats = Some(stats.clone());
        Ok(stats)
    }

    pub async fn submit_tap<P: WalletProvider, S: SessionStore>(
        &mut self,
        session: &SessionManager<P>,
        gate: &VerificationGate<S>,
    ) -> Result<TapOutcome, TapError> {
        let (account, signer) = session.writable()?;
        if self
            .stats
            .as_ref()
            .is_some_and(|stats| stats.at_daily_cap(self.daily_tap_cap))
        {
            return Ok(TapOutcome::DailyLimitReached);
        }
        if !gate.is_verified() {
            return Ok(TapOutcome::VerificationRequired);
        }

        let contract = session
            .provider()
            .ok_or(TapError::ProviderUnavailable)?
            .contract(self.address, Some(signer));
        let receipt = match contract.tap().await {
            Ok(receipt) => receipt,
            Err(err) => {
                let err = classify(&err);
                if err.is_stop_condition() {
                    info!(%account, "daily tap cap reached on chain");
                    self.refresh(session, account).await;
                    return Ok(TapOutcome::DailyLimitReached);
                }
                warn!(%account, %err, "tap failed");
                return Err(err);
            }
        };

        let reward = reward_for(&receipt, account);
        info!(%account, tx = %receipt.tx_hash, reward = ?reward.map(|r| r.to_string()), "tap confirmed");
        self.refresh(session, account).await;
        Ok(TapOutcome::Tapped { reward })
    }

    pub async fn submit_claim<P: WalletProvider>(
        &mut self,
        session: &SessionManager<P>,
    ) -> Result<ClaimOutcome, TapError> {
        let (account, signer) = session.writable()?;
        let Some(cached) = self.stats.as_ref() else {
            return Ok(ClaimOutcome::NothingToClaim);
        };
        if cached.unclaimed_rewards.is_zero() {
            return Ok(ClaimOutcome::NothingToClaim);
        }
        if cached.total_reward_claimed >= self.monthly_reward_cap {
            return Ok(ClaimOutcome::MonthlyCapReached);
        }

        // The cached figure may be stale; claim what the contract says now.
        let fresh = self.read_stats(session, account).await?;
        let amount = fresh.unclaimed_rewards;
        if amount.is_zero() {
            return Ok(ClaimOutcome::NothingToClaim);
        }

        let contract = session
            .provider()
            .ok_or(TapError::ProviderUnavailable)?
            .contract(self.address, Some(signer));
        let receipt = contract.claim_rewards(amount.wei()).await.map_err(|err| {
            let err = classify(&err);
            warn!(%account, %err, "claim failed");
            err
        })?;
        info!(%account, tx = %receipt.tx_hash, amount = %amount, "rewards claimed");
        self.refresh(session, account).await;
        Ok(ClaimOutcome::Claimed { amount })
    }

    async fn refresh<P: WalletProvider>(&mut self, session: &SessionManager<P>, account: Address) {
        if let Err(err) = self.read_stats(session, account).await {
            warn!(%account, %err, "stats refresh after write failed");
        }
    }
}

/// Reward from the first `Tapped` event emitted for `account`.
pub fn reward_for(receipt: &TxReceipt, account: Address) -> Option<Stt> {
    receipt
        .tapped
        .iter()
        .find(|event| event.user == account)
        .map(|event| Stt::from_wei(event.reward))
}

/// Claimable right now according to the cached stats.
pub fn claimable(stats: &UserStats, monthly_reward_cap: Stt) -> bool {
    !stats.unclaimed_rewards.is_zero() && stats.total_reward_claimed < monthly_reward_cap
}
