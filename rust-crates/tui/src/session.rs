use alloy::primitives::Address;
use tokio::sync::broadcast;
use tracing::{
    info,
    warn,
};

use crate::{
    config::NetworkConfig,
    errors::TapError,
    provider::{
        ProviderError,
        ProviderEvent,
        WalletProvider,
    },
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub is_correct_network: bool,
    pub signer_available: bool,
    pub last_error: Option<TapError>,
}

/// What a provider notification changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    AccountChanged(Option<Address>),
    NetworkChanged { chain_id: u64, correct: bool },
}

/// Owns the wallet connection. The signer is handed out only while an
/// account is connected on the target chain.
pub struct SessionManager<P: WalletProvider> {
    provider: Option<P>,
    target: NetworkConfig,
    session: Session,
    signer: Option<P::Signer>,
}

impl<P: WalletProvider> SessionManager<P> {
    pub fn new(provider: Option<P>, target: NetworkConfig) -> Self {
        Self {
            provider,
            target,
            session: Session::default(),
            signer: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn target(&self) -> &NetworkConfig {
        &self.target
    }

    pub fn provider(&self) -> Option<&P> {
        self.provider.as_ref()
    }

    pub fn signer(&self) -> Option<&P::Signer> {
        self.signer.as_ref()
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        self.provider.as_ref().map(|provider| provider.subscribe())
    }

    pub fn record_error(&mut self, err: TapError) {
        self.session.last_error = Some(err);
    }

    fn mismatch(&self) -> TapError {
        TapError::NetworkMismatch {
            expected: self.target.chain_name.clone(),
        }
    }

    /// Account, and signer, usable for a write right now.
    pub fn writable(&self) -> Result<(Address, &P::Signer), TapError> {
        if self.provider.is_none() {
            return Err(TapError::ProviderUnavailable);
        }
        let account = self.session.account.ok_or(TapError::WalletNotConnected)?;
        if !self.session.is_correct_network {
            return Err(self.mismatch());
        }
        let signer = self.signer.as_ref().ok_or(TapError::SignerUnavailable)?;
        Ok((account, signer))
    }

    /// Picks up an already-authorized account without prompting.
    pub async fn restore(&mut self) -> Result<Option<Address>, TapError> {
        let provider = self.provider.as_ref().ok_or(TapError::ProviderUnavailable)?;
        let accounts = provider.accounts().await.map_err(unknown)?;
        let Some(account) = accounts.first().copied() else {
            return Ok(None);
        };
        let chain_id = provider.chain_id().await.map_err(unknown)?;
        self.session.account = Some(account);
        self.session.chain_id = Some(chain_id);
        self.refresh_signer();
        info!(%account, chain_id, "restored wallet session");
        Ok(Some(account))
    }

    pub async fn connect(&mut self) -> Result<Address, TapError> {
        let result = self.try_connect().await;
        match &result {
            Ok(account) => {
                self.session.last_error = None;
                info!(%account, chain_id = ?self.session.chain_id, "wallet connected");
            }
            Err(err) => {
                warn!(%err, "wallet connection failed");
                self.session.last_error = Some(err.clone());
            }
        }
        result
    }

    async fn try_connect(&mut self) -> Result<Address, TapError> {
        let provider = self.provider.as_ref().ok_or(TapError::ProviderUnavailable)?;
        let accounts = provider.request_accounts().await.map_err(|err| {
            if err.is_user_rejected() {
                TapError::ConnectRejected
            } else {
                unknown(err)
            }
        })?;
        let account = accounts.first().copied().ok_or(TapError::ConnectRejected)?;

        let mut chain_id = provider.chain_id().await.map_err(unknown)?;
        let switched = if chain_id == self.target.chain_id {
            Ok(())
        } else {
            let result = switch_or_add(provider, &self.target).await;
            if result.is_ok() {
                chain_id = provider.chain_id().await.map_err(unknown)?;
            }
            result
        };

        self.session.account = Some(account);
        self.session.chain_id = Some(chain_id);
        self.refresh_signer();
        switched?;
        if !self.session.is_correct_network {
            return Err(self.mismatch());
        }
        Ok(account)
    }

    /// Forgets the local session. Provider permissions stay as they are.
    pub fn disconnect(&mut self) {
        if let Some(account) = self.session.account {
            info!(%account, "wallet disconnected");
        }
        self.session = Session::default();
        self.signer = None;
    }

    pub async fn handle_event(&mut self, event: ProviderEvent) -> SessionUpdate {
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                let account = accounts.first().copied();
                info!(account = ?account, "wallet accounts changed");
                self.session.account = account;
                if account.is_none() {
                    self.session.last_error = None;
                }
                self.refresh_signer();
                SessionUpdate::AccountChanged(account)
            }
            ProviderEvent::ChainChanged(chain_id) => {
                self.session.chain_id = Some(chain_id);
                self.refresh_signer();
                let correct = self.session.is_correct_network;
                info!(chain_id, correct, "wallet network changed");
                if correct {
                    if matches!(self.session.last_error, Some(TapError::NetworkMismatch { .. })) {
                        self.session.last_error = None;
                    }
                } else if self.session.account.is_some() {
                    self.session.last_error = Some(self.mismatch());
                    if let Some(provider) = self.provider.as_ref() {
                        if let Err(err) = switch_or_add(provider, &self.target).await {
                            warn!(%err, "switch back to target network failed");
                            self.session.last_error = Some(err);
                        }
                    }
                }
                SessionUpdate::NetworkChanged { chain_id, correct }
            }
        }
    }

    fn refresh_signer(&mut self) {
        self.session.is_correct_network = self.session.chain_id == Some(self.target.chain_id);
        self.signer = match (
            self.provider.as_ref(),
            self.session.account,
            self.session.is_correct_network,
        ) {
            (Some(provider), Some(account), true) => provider.signer(account),
            _ => None,
        };
        self.session.signer_available = self.signer.is_some();
    }
}

/// Asks the wallet to move to `target`, registering the network first when the
/// wallet does not know it.
async fn switch_or_add<P: WalletProvider>(
    provider: &P,
    target: &NetworkConfig,
) -> Result<(), TapError> {
    let mismatch = || TapError::NetworkMismatch {
        expected: target.chain_name.clone(),
    };
    let declined = |err: ProviderError| {
        if err.is_user_rejected() {
            mismatch()
        } else {
            unknown(err)
        }
    };

    match provider.switch_chain(target.chain_id).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_unrecognized_chain() => {
            info!(chain_id = target.chain_id, "wallet does not know the network, adding it");
            provider
                .add_chain(&target.chain_params())
                .await
                .map_err(declined)?;
            provider
                .switch_chain(target.chain_id)
                .await
                .map_err(declined)
        }
        Err(err) => Err(declined(err)),
    }
}

fn unknown(err: ProviderError) -> TapError {
    TapError::Unknown(err.message)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::{
        config::SOMNIA_CHAIN_ID,
        test_helpers::{
            FakeWalletProvider,
            alice,
        },
    };
    use proptest::prelude::*;

    fn manager(provider: FakeWalletProvider) -> SessionManager<FakeWalletProvider> {
        SessionManager::new(Some(provider), NetworkConfig::somnia_testnet())
    }

    #[tokio::test]
    async fn connect__on_target_chain_exposes_signer() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut manager = manager(provider.clone());

        // when
        let account = manager.connect().await.unwrap();

        // then
        assert_eq!(account, alice());
        assert!(manager.session().is_correct_network);
        assert!(manager.session().signer_available);
        assert!(manager.writable().is_ok());
        assert_eq!(provider.with_state(|s| s.switch_calls), 0);
    }

    #[tokio::test]
    async fn connect__switches_known_chain() {
        // given
        let provider = FakeWalletProvider::new(alice(), 1);
        provider.with_state(|s| s.known_chains.push(SOMNIA_CHAIN_ID));
        let mut manager = manager(provider.clone());

        // when
        manager.connect().await.unwrap();

        // then
        assert_eq!(manager.session().chain_id, Some(SOMNIA_CHAIN_ID));
        assert!(manager.signer().is_some());
        assert!(provider.with_state(|s| s.added_chains.is_empty()));
    }

    #[tokio::test]
    async fn connect__adds_unknown_chain_then_switches() {
        // given
        let provider = FakeWalletProvider::new(alice(), 1);
        let mut manager = manager(provider.clone());

        // when
        manager.connect().await.unwrap();

        // then
        let added = provider.with_state(|s| s.added_chains.clone());
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].chain_id, "0xc488");
        assert_eq!(added[0].native_currency.symbol, "STT");
        assert_eq!(manager.session().chain_id, Some(SOMNIA_CHAIN_ID));
        assert!(manager.session().signer_available);
    }

    #[tokio::test]
    async fn connect__declined_switch_is_network_mismatch() {
        // given
        let provider = FakeWalletProvider::new(alice(), 1);
        provider.with_state(|s| s.reject_switch = true);
        let mut manager = manager(provider);

        // when
        let err = manager.connect().await.unwrap_err();

        // then
        assert!(matches!(err, TapError::NetworkMismatch { .. }));
        assert_eq!(manager.session().account, Some(alice()));
        assert!(manager.signer().is_none());
        assert_eq!(manager.session().last_error, Some(err));
    }

    #[tokio::test]
    async fn connect__declined_accounts_is_connect_rejected() {
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        provider.with_state(|s| s.reject_accounts = true);
        let mut manager = manager(provider);

        let err = manager.connect().await.unwrap_err();

        assert_eq!(err, TapError::ConnectRejected);
        assert_eq!(manager.session().account, None);
    }

    #[tokio::test]
    async fn connect__without_provider_is_provider_unavailable() {
        let mut manager =
            SessionManager::<FakeWalletProvider>::new(None, NetworkConfig::somnia_testnet());

        let err = manager.connect().await.unwrap_err();

        assert_eq!(err, TapError::ProviderUnavailable);
    }

    #[tokio::test]
    async fn restore__does_not_prompt() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut manager = manager(provider.clone());

        // when
        let restored = manager.restore().await.unwrap();

        // then
        assert_eq!(restored, None);
        assert_eq!(provider.with_state(|s| s.account_requests), 0);
    }

    #[tokio::test]
    async fn handle_event__empty_accounts_clears_signer() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut manager = manager(provider);
        manager.connect().await.unwrap();

        // when
        let update = manager
            .handle_event(ProviderEvent::AccountsChanged(vec![]))
            .await;

        // then
        assert_eq!(update, SessionUpdate::AccountChanged(None));
        assert_eq!(manager.session().account, None);
        assert!(manager.signer().is_none());
        assert_eq!(manager.writable().unwrap_err(), TapError::WalletNotConnected);
    }

    #[tokio::test]
    async fn handle_event__wrong_chain_drops_signer_and_reprompts() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut manager = manager(provider.clone());
        manager.connect().await.unwrap();
        provider.with_state(|s| s.reject_switch = true);

        // when
        let update = manager.handle_event(ProviderEvent::ChainChanged(1)).await;

        // then
        assert_eq!(update, SessionUpdate::NetworkChanged { chain_id: 1, correct: false });
        assert!(manager.signer().is_none());
        assert!(matches!(
            manager.session().last_error,
            Some(TapError::NetworkMismatch { .. })
        ));
        assert_eq!(provider.with_state(|s| s.switch_calls), 1);
    }

    #[tokio::test]
    async fn disconnect__resets_session() {
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut manager = manager(provider);
        manager.connect().await.unwrap();

        manager.disconnect();

        assert_eq!(manager.session(), &Session::default());
        assert!(manager.signer().is_none());
    }

    proptest! {
        #[test]
        fn signer_is_absent_off_target_chain(chain_id in any::<u64>().prop_filter("off target", |id| *id != SOMNIA_CHAIN_ID)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let provider = FakeWalletProvider::new(alice(), chain_id);
                provider.with_state(|s| s.reject_switch = true);
                let mut manager = manager(provider);
                let _ = manager.connect().await;
                manager.handle_event(ProviderEvent::ChainChanged(chain_id)).await;
                assert!(manager.signer().is_none());
                assert!(!manager.session().signer_available);
            });
        }
    }
}
