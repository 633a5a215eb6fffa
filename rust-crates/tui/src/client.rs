use crate::ui;
use alloy::primitives::Address;
use chrono::{
    DateTime,
    Utc,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use proof_of_tap::{
    amount::Stt,
    config::TapGemConfig,
    contract::{
        ClaimOutcome,
        ContractClient,
        TapOutcome,
        UserStats,
    },
    errors::TapError,
    gate::{
        GateConfig,
        GateOutcome,
        GateStage,
        VerificationGate,
    },
    keystore_provider::KeystoreProvider,
    notifications::{
        Notification,
        Notifier,
        Severity,
    },
    presentation::{
        self,
        BadgeTier,
        Controls,
    },
    provider::{
        ProviderEvent,
        WalletProvider,
    },
    session::{
        SessionManager,
        SessionUpdate,
    },
    storage::{
        SessionStore,
        open_session_store,
    },
};
use std::{
    path::PathBuf,
    str::FromStr,
    time::{
        Duration,
        Instant,
    },
};
use tokio::sync::broadcast::{
    self,
    error::RecvError,
};
use tracing::{
    error,
    info,
    warn,
};

const VISIBLE_NOTIFICATIONS: usize = 6;

pub struct AppConfig {
    pub tapgem: TapGemConfig,
    pub provider: Option<KeystoreProvider>,
    pub gate: GateConfig,
    pub session_file: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct GateView {
    pub stage: GateStage,
    pub timer_secs: u32,
    pub decoy_delay_secs: u32,
    pub link: Option<String>,
    pub link_opened: bool,
    pub captcha_prompt: Option<String>,
    pub answer: String,
    pub can_close: bool,
}

#[derive(Clone, Debug)]
pub struct SearchResult {
    pub address: Address,
    pub stats: UserStats,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub network_name: String,
    pub correct_network: bool,
    pub provider_available: bool,
    pub contract_address: Address,
    pub stats: Option<UserStats>,
    pub badge: &'static BadgeTier,
    pub controls: Controls,
    pub daily_tap_cap: u32,
    pub monthly_reward_cap: Stt,
    pub streak_fill: f64,
    pub monthly_fill: f64,
    pub reset_countdown: String,
    pub tap_feedback: Option<String>,
    pub verified: bool,
    pub gate: Option<GateView>,
    pub search: Option<SearchResult>,
    pub share_link: Option<String>,
    pub notifications: Vec<Notification>,
    pub status: String,
    pub busy: bool,
}

pub type GateStore = Box<dyn SessionStore + Send>;

/// Everything between the key presses and the wallet: session, contract
/// calls, the verification gate and user notifications.
pub struct AppController<P: WalletProvider> {
    config: TapGemConfig,
    session: SessionManager<P>,
    client: ContractClient,
    gate: VerificationGate<GateStore>,
    notifier: Notifier,
    status: String,
    busy: bool,
    tap_feedback: Option<String>,
    search: Option<SearchResult>,
    share_link: Option<String>,
    previous_points: Option<u64>,
    last_snapshot: Option<AppSnapshot>,
}

impl<P: WalletProvider> AppController<P> {
    pub fn new(
        config: TapGemConfig,
        provider: Option<P>,
        gate: VerificationGate<GateStore>,
    ) -> Result<Self> {
        let contract_address = config
            .contract_address
            .ok_or_else(|| eyre!("No TapGem contract address configured"))?;
        let client = ContractClient::new(
            contract_address,
            config.daily_tap_cap,
            config.monthly_reward_cap,
        );
        let session = SessionManager::new(provider, config.network.clone());
        Ok(Self {
            config,
            session,
            client,
            gate,
            notifier: Notifier::default(),
            status: String::from("Ready"),
            busy: false,
            tap_feedback: None,
            search: None,
            share_link: None,
            previous_points: None,
            last_snapshot: None,
        })
    }

    pub fn session(&self) -> &SessionManager<P> {
        &self.session
    }

    pub fn gate(&self) -> &VerificationGate<GateStore> {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut VerificationGate<GateStore> {
        &mut self.gate
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.invalidate_cache();
    }

    fn invalidate_cache(&mut self) {
        self.last_snapshot = None;
    }

    fn notify(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        if !self.notifier.push(severity, message.clone(), Instant::now()) {
            return;
        }
        match severity {
            Severity::Error => error!("{}", message),
            Severity::Info | Severity::Success => info!("{}", message),
        }
    }

    fn notify_error(&mut self, err: TapError) {
        self.session.record_error(err.clone());
        self.notify(Severity::Error, err.to_string());
    }

    /// Silent reconnect to an already-authorized account.
    pub async fn bootstrap(&mut self) {
        match self.session.restore().await {
            Ok(Some(account)) => {
                if self.session.session().is_correct_network {
                    self.load_own_stats(account).await;
                } else {
                    let expected = self.session.target().chain_name.clone();
                    self.notify_error(TapError::NetworkMismatch { expected });
                }
            }
            Ok(None) => self.set_status("Press c to connect your wallet"),
            Err(err) => self.notify_error(err),
        }
        self.invalidate_cache();
    }

    pub async fn connect(&mut self) -> Result<Address, TapError> {
        let result = self.session.connect().await;
        match &result {
            Ok(account) => {
                let account = *account;
                self.notify(
                    Severity::Success,
                    format!("Wallet connected: {}", presentation::shorten_address(account)),
                );
                self.load_own_stats(account).await;
            }
            Err(err) => self.notify_error(err.clone()),
        }
        self.invalidate_cache();
        result
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
        self.client.forget_stats();
        self.previous_points = None;
        self.tap_feedback = None;
        self.share_link = None;
        self.notify(Severity::Info, "Wallet disconnected");
        self.invalidate_cache();
    }

    pub async fn tap(&mut self) -> Result<TapOutcome, TapError> {
        self.busy = true;
        let result = self.client.submit_tap(&self.session, &self.gate).await;
        self.busy = false;
        match &result {
            Ok(TapOutcome::VerificationRequired) => {
                self.gate.begin();
                self.notify(Severity::Info, "Verify you're human to start tapping");
            }
            Ok(TapOutcome::DailyLimitReached) => {
                self.notify(
                    Severity::Info,
                    "Daily tap limit reached. Claim your rewards or come back after reset.",
                );
                self.after_stats();
            }
            Ok(TapOutcome::Tapped { reward }) => {
                let taps_today = self.client.stats().map_or(0, |stats| stats.taps_today);
                let feedback =
                    presentation::tap_feedback(taps_today, self.config.daily_tap_cap, *reward);
                self.notify(Severity::Success, feedback.clone());
                self.tap_feedback = Some(feedback);
                self.after_stats();
            }
            Err(err) => self.notify_error(err.clone()),
        }
        self.invalidate_cache();
        result
    }

    /// Explains why a disabled tap control was pressed. Returns false when
    /// tapping is allowed.
    pub fn refuse_tap(&mut self, controls: Controls) -> bool {
        if controls.tap_enabled {
            return false;
        }
        if let Some(err) = self.session.writable().err() {
            self.notify_error(err);
        } else if self.busy {
            self.notify(Severity::Info, "A transaction is already in flight");
        } else {
            self.notify(
                Severity::Info,
                "Daily tap limit reached. Claim your rewards or come back after reset.",
            );
        }
        self.invalidate_cache();
        true
    }

    pub async fn claim(&mut self) -> Result<ClaimOutcome, TapError> {
        self.busy = true;
        let result = self.client.submit_claim(&self.session).await;
        self.busy = false;
        match &result {
            Ok(ClaimOutcome::NothingToClaim) => {
                self.notify(Severity::Info, "Nothing to claim yet.");
            }
            Ok(ClaimOutcome::MonthlyCapReached) => {
                self.notify(Severity::Info, "Monthly reward cap reached.");
            }
            Ok(ClaimOutcome::Claimed { amount }) => {
                self.notify(Severity::Success, format!("Claimed {amount} STT"));
                self.after_stats();
            }
            Err(err) => self.notify_error(err.clone()),
        }
        self.invalidate_cache();
        result
    }

    /// Looks up any address. The session's own stats are untouched.
    pub async fn search(&mut self, input: &str) -> Result<UserStats, TapError> {
        let input = input.trim();
        let address = match Address::from_str(input) {
            Ok(address) => address,
            Err(err) => {
                let err = TapError::Unknown(format!("Invalid address '{input}': {err}"));
                self.notify_error(err.clone());
                return Err(err);
            }
        };
        let result = self.client.lookup_stats(&self.session, address).await;
        match &result {
            Ok(stats) => {
                self.search = Some(SearchResult {
                    address,
                    stats: stats.clone(),
                });
            }
            Err(err) => {
                self.search = None;
                self.notify_error(err.clone());
            }
        }
        self.invalidate_cache();
        result
    }

    pub fn share(&mut self) -> Option<String> {
        let Some(account) = self.session.session().account else {
            self.notify_error(TapError::WalletNotConnected);
            return None;
        };
        let points = self.client.stats().map_or(0, |stats| stats.points);
        let tier = presentation::badge_for(points);
        let link = match presentation::share_intent_url(tier, account) {
            Ok(url) => url.to_string(),
            Err(err) => {
                self.notify_error(TapError::Unknown(err.to_string()));
                return None;
            }
        };
        info!(%link, "share link ready");
        self.notify(Severity::Info, "Share link ready below your stats");
        self.share_link = Some(link.clone());
        self.invalidate_cache();
        Some(link)
    }

    pub fn gate_open_link(&mut self, stage: GateStage) {
        if self.gate.stage() != stage {
            return;
        }
        if let Some(link) = self.gate.open_link() {
            self.notify(Severity::Info, format!("Opened {link}"));
        }
        self.invalidate_cache();
    }

    pub fn gate_digit(&mut self, digit: char) {
        self.gate.push_digit(digit);
        self.invalidate_cache();
    }

    pub fn gate_backspace(&mut self) {
        self.gate.pop_digit();
        self.invalidate_cache();
    }

    pub fn gate_confirm(&mut self) -> Result<GateOutcome> {
        let outcome = self
            .gate
            .confirm()
            .wrap_err("saving verification progress failed")?;
        match &outcome {
            GateOutcome::Verified => {
                self.notify(Severity::Success, "Verified! Tap away.");
            }
            GateOutcome::Delayed { decoy_delay_secs } => {
                self.notify(
                    Severity::Error,
                    format!("Not so fast. Verification delayed by {decoy_delay_secs}s."),
                );
            }
            GateOutcome::WrongAnswer { decoy_delay_secs } => {
                self.notify(
                    Severity::Error,
                    format!("Wrong answer. Verification delayed by {decoy_delay_secs}s."),
                );
            }
            GateOutcome::Advanced(_)
            | GateOutcome::Opened(_)
            | GateOutcome::AlreadyVerified
            | GateOutcome::Ignored => {}
        }
        self.invalidate_cache();
        Ok(outcome)
    }

    pub fn gate_close(&mut self) -> bool {
        let closed = self.gate.close();
        if !closed && self.gate.is_open() {
            self.notify(Severity::Info, "Wait for the countdown before closing");
        }
        self.invalidate_cache();
        closed
    }

    /// One second of wall time.
    pub fn tick(&mut self) {
        if self.gate.is_open() {
            self.gate.tick();
            self.invalidate_cache();
        }
    }

    pub async fn handle_provider_event(&mut self, event: ProviderEvent) {
        match self.session.handle_event(event).await {
            SessionUpdate::AccountChanged(Some(account)) => {
                self.client.forget_stats();
                self.previous_points = None;
                self.share_link = None;
                self.notify(
                    Severity::Info,
                    format!("Account changed to {}", presentation::shorten_address(account)),
                );
                if self.session.session().is_correct_network {
                    self.load_own_stats(account).await;
                }
            }
            SessionUpdate::AccountChanged(None) => {
                self.client.forget_stats();
                self.previous_points = None;
                self.share_link = None;
                self.notify(Severity::Info, "Wallet disconnected");
            }
            SessionUpdate::NetworkChanged {
                chain_id,
                correct: true,
            } => {
                info!(chain_id, "back on the target network");
                if let Some(account) = self.session.session().account {
                    self.load_own_stats(account).await;
                }
            }
            SessionUpdate::NetworkChanged {
                chain_id,
                correct: false,
            } => {
                warn!(chain_id, "wallet moved off the target network");
                let expected = self.session.target().chain_name.clone();
                self.notify_error(TapError::NetworkMismatch { expected });
            }
        }
        self.invalidate_cache();
    }

    async fn load_own_stats(&mut self, account: Address) {
        match self.client.read_stats(&self.session, account).await {
            Ok(_) => self.after_stats(),
            Err(err) => self.notify_error(err),
        }
    }

    fn after_stats(&mut self) {
        let Some(points) = self.client.stats().map(|stats| stats.points) else {
            return;
        };
        if let Some(tier) = presentation::badge_upgrade(self.previous_points, points) {
            self.notify(
                Severity::Success,
                format!("New badge unlocked: {} {}! Press x to share.", tier.emoji, tier.name),
            );
        }
        self.previous_points = Some(points);
    }

    pub fn build_snapshot(&mut self, now: DateTime<Utc>) -> AppSnapshot {
        if let Some(cached) = &self.last_snapshot {
            let mut snapshot = cached.clone();
            snapshot.reset_countdown = presentation::reset_countdown_line(now);
            return snapshot;
        }

        let session = self.session.session();
        let stats = self.client.stats().cloned();
        let writable = self.session.writable().is_ok();
        let controls = presentation::controls(
            stats.as_ref(),
            writable,
            self.busy,
            self.config.daily_tap_cap,
            self.config.monthly_reward_cap,
        );
        let (streak_fill, monthly_fill) = stats.as_ref().map_or((0.0, 0.0), |stats| {
            (
                presentation::streak_fill(stats.current_streak),
                presentation::monthly_fill(
                    stats.unclaimed_rewards,
                    stats.total_reward_claimed,
                    self.config.monthly_reward_cap,
                ),
            )
        });
        let gate = self.gate.is_open().then(|| GateView {
            stage: self.gate.stage(),
            timer_secs: self.gate.timer_secs(),
            decoy_delay_secs: self.gate.decoy_delay_secs(),
            link: self.gate.stage_link().map(str::to_owned),
            link_opened: self.gate.link_opened(),
            captcha_prompt: self.gate.captcha().map(|question| question.prompt()),
            answer: self.gate.answer().to_owned(),
            can_close: self.gate.can_close(),
        });

        let snapshot = AppSnapshot {
            account: session.account,
            chain_id: session.chain_id,
            network_name: self.config.network.chain_name.clone(),
            correct_network: session.is_correct_network,
            provider_available: self.session.provider().is_some(),
            contract_address: self.client.address(),
            badge: presentation::badge_for(stats.as_ref().map_or(0, |stats| stats.points)),
            stats,
            controls,
            daily_tap_cap: self.config.daily_tap_cap,
            monthly_reward_cap: self.config.monthly_reward_cap,
            streak_fill,
            monthly_fill,
            reset_countdown: presentation::reset_countdown_line(now),
            tap_feedback: self.tap_feedback.clone(),
            verified: self.gate.is_verified(),
            gate,
            search: self.search.clone(),
            share_link: self.share_link.clone(),
            notifications: self
                .notifier
                .recent(VISIBLE_NOTIFICATIONS)
                .cloned()
                .collect(),
            status: self.status.clone(),
            busy: self.busy,
        };
        self.last_snapshot = Some(snapshot.clone());
        snapshot
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let AppConfig {
        tapgem,
        provider,
        gate,
        session_file,
    } = config;
    let store = open_session_store(session_file.as_deref())
        .wrap_err("opening session store failed")?;
    let gate = VerificationGate::new(store, gate).wrap_err("restoring verification failed")?;
    let mut controller = AppController::<KeystoreProvider>::new(tapgem, provider, gate)?;
    controller.bootstrap().await;

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn next_provider_event(
    events: &mut Option<broadcast::Receiver<ProviderEvent>>,
) -> Option<ProviderEvent> {
    let Some(receiver) = events.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "provider notifications dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn run_loop<P: WalletProvider>(
    mut controller: AppController<P>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("Running app loop");
    let mut provider_events = controller.session().subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    let mut snapshot = controller.build_snapshot(Utc::now());
    ui::draw(ui_state, &snapshot).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            maybe_event = next_provider_event(&mut provider_events) => {
                match maybe_event {
                    Some(event) => controller.handle_provider_event(event).await,
                    None => {
                        warn!("provider notification channel closed");
                        provider_events = None;
                    }
                }
            }
            _ = ticker.tick() => {
                controller.tick();
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Connect => {
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            "Connecting wallet...",
                            "draw while connecting failed",
                        )?;
                        let _ = controller.connect().await;
                        controller.set_status("Ready");
                    }
                    ui::UserEvent::Disconnect => {
                        controller.disconnect();
                    }
                    ui::UserEvent::Tap if controller.refuse_tap(snapshot.controls) => {}
                    ui::UserEvent::Tap => {
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            "Tapping the Gem...",
                            "draw while tapping failed",
                        )?;
                        let _ = controller.tap().await;
                        controller.set_status("Ready");
                        ui::discard_pending_input(input_events);
                    }
                    ui::UserEvent::Claim => {
                        if !snapshot.controls.claim_visible {
                            controller.notify(
                                Severity::Info,
                                "Claiming opens once today's taps are used up",
                            );
                        } else if !snapshot.controls.claim_enabled {
                            controller.notify(Severity::Info, Controls::CLAIM_DISABLED_HINT);
                        } else {
                            show_processing_status(
                                &mut controller,
                                &mut snapshot,
                                ui_state,
                                "Claiming rewards...",
                                "draw while claiming failed",
                            )?;
                            let _ = controller.claim().await;
                            controller.set_status("Ready");
                            ui::discard_pending_input(input_events);
                        }
                        controller.invalidate_cache();
                    }
                    ui::UserEvent::Search(input) => {
                        show_processing_status(
                            &mut controller,
                            &mut snapshot,
                            ui_state,
                            format!("Looking up {}...", input.trim()),
                            "draw while searching failed",
                        )?;
                        let _ = controller.search(&input).await;
                        controller.set_status("Ready");
                    }
                    ui::UserEvent::Share => {
                        controller.share();
                    }
                    ui::UserEvent::GateOpenLink(stage) => {
                        controller.gate_open_link(stage);
                    }
                    ui::UserEvent::GateDigit(digit) => {
                        controller.gate_digit(digit);
                    }
                    ui::UserEvent::GateBackspace => {
                        controller.gate_backspace();
                    }
                    ui::UserEvent::GateConfirm => {
                        if let Err(e) = controller.gate_confirm() {
                            error!(error = %e, "verification gate failed");
                            sync_error(&mut controller, format!("Verification failed: {e}"));
                        }
                    }
                    ui::UserEvent::GateClose => {
                        controller.gate_close();
                    }
                }
            }
        }
        snapshot = controller.build_snapshot(Utc::now());
        ui::draw(ui_state, &snapshot).wrap_err("draw after event failed")?;
    }
    Ok(())
}

fn sync_error<P: WalletProvider>(controller: &mut AppController<P>, error_msg: impl Into<String>) {
    controller.notify(Severity::Error, error_msg);
    controller.invalidate_cache();
}

fn show_processing_status<P: WalletProvider>(
    controller: &mut AppController<P>,
    snapshot: &mut AppSnapshot,
    ui_state: &mut ui::UiState,
    message: impl Into<String>,
    context: &'static str,
) -> Result<()> {
    controller.set_status(message);
    snapshot.status = controller.status.clone();
    snapshot.busy = true;
    snapshot.controls.tap_enabled = false;
    snapshot.controls.claim_enabled = false;
    ui::draw(ui_state, snapshot).wrap_err(context)
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use proof_of_tap::{
        config::{
            NetworkConfig,
            SOMNIA_CHAIN_ID,
        },
        gate::CaptchaQuestion,
        storage::InMemorySessionStore,
        test_helpers::{
            FakeWalletProvider,
            alice,
            bob,
            stats,
            tapgem_address,
        },
    };
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    fn controller(provider: Option<FakeWalletProvider>) -> AppController<FakeWalletProvider> {
        let mut config = TapGemConfig::new(NetworkConfig::somnia_testnet());
        config.contract_address = Some(tapgem_address());
        let mut gate_config = GateConfig::new(config.social.follow_url());
        gate_config.countdown_secs = 2;
        let store: GateStore = Box::new(InMemorySessionStore::new());
        let gate =
            VerificationGate::with_rng(store, gate_config, StdRng::seed_from_u64(7)).unwrap();
        AppController::new(config, provider, gate).unwrap()
    }

    fn pass_gate(controller: &mut AppController<FakeWalletProvider>) {
        controller.gate_open_link(GateStage::Follow);
        controller.tick();
        controller.tick();
        controller.gate_confirm().unwrap();
        controller.gate_mut().set_captcha(CaptchaQuestion::new(7, 2));
        controller.tick();
        controller.tick();
        controller.gate_digit('9');
        assert_eq!(controller.gate_confirm().unwrap(), GateOutcome::Verified);
    }

    #[test]
    fn new__requires_contract_address() {
        let config = TapGemConfig::new(NetworkConfig::somnia_testnet());
        let store: GateStore = Box::new(InMemorySessionStore::new());
        let gate = VerificationGate::new(store, GateConfig::new("https://x.com/sireadell")).unwrap();

        let result = AppController::<FakeWalletProvider>::new(config, None, gate);

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn connect__loads_stats_into_snapshot() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        provider
            .tapgem()
            .set_stats(alice(), stats(4, Stt::from_cents(20), Stt::ZERO));
        let mut controller = controller(Some(provider));

        // when
        controller.connect().await.unwrap();
        let snapshot = controller.build_snapshot(Utc::now());

        // then
        assert_eq!(snapshot.account, Some(alice()));
        assert_eq!(snapshot.stats.unwrap().taps_today, 4);
        assert!(snapshot.controls.tap_enabled);
        assert!(!snapshot.controls.claim_visible);
    }

    #[tokio::test]
    async fn tap__unverified_opens_gate_without_sending() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut controller = controller(Some(provider.clone()));
        controller.connect().await.unwrap();

        // when
        let outcome = controller.tap().await.unwrap();
        let snapshot = controller.build_snapshot(Utc::now());

        // then
        assert_eq!(outcome, TapOutcome::VerificationRequired);
        assert_eq!(snapshot.gate.unwrap().stage, GateStage::Follow);
        assert_eq!(provider.tapgem().with_state(|s| s.tap_calls), 0);
    }

    #[tokio::test]
    async fn tap__after_gate_records_feedback() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut controller = controller(Some(provider));
        controller.connect().await.unwrap();
        controller.tap().await.unwrap();
        pass_gate(&mut controller);

        // when
        let outcome = controller.tap().await.unwrap();
        let snapshot = controller.build_snapshot(Utc::now());

        // then
        assert_eq!(
            outcome,
            TapOutcome::Tapped {
                reward: Some(Stt::from_cents(5))
            }
        );
        assert_eq!(snapshot.tap_feedback.as_deref(), Some("Tap 1 of 20 • +0.05 STT"));
        assert!(snapshot.gate.is_none());
        assert!(snapshot.verified);
    }

    #[tokio::test]
    async fn refuse_tap__at_cap_keeps_gate_closed() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        provider
            .tapgem()
            .set_stats(alice(), stats(20, Stt::from_whole(1), Stt::ZERO));
        let mut controller = controller(Some(provider.clone()));
        controller.connect().await.unwrap();
        let controls = controller.build_snapshot(Utc::now()).controls;

        // when
        let refused = controller.refuse_tap(controls);
        let snapshot = controller.build_snapshot(Utc::now());

        // then
        assert!(!controls.tap_enabled);
        assert!(refused);
        assert!(snapshot.gate.is_none());
        assert!(!controller.gate().is_open());
        assert!(
            controller
                .notifier()
                .latest()
                .unwrap()
                .message
                .starts_with("Daily tap limit reached")
        );
        assert_eq!(provider.tapgem().with_state(|s| s.tap_calls), 0);
    }

    #[tokio::test]
    async fn tap__unverified_at_cap_reports_limit_without_gate() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        provider
            .tapgem()
            .set_stats(alice(), stats(20, Stt::ZERO, Stt::ZERO));
        let mut controller = controller(Some(provider.clone()));
        controller.connect().await.unwrap();

        // when
        let outcome = controller.tap().await.unwrap();

        // then
        assert_eq!(outcome, TapOutcome::DailyLimitReached);
        assert!(!controller.gate().is_open());
        assert_eq!(provider.tapgem().with_state(|s| s.tap_calls), 0);
    }

    #[tokio::test]
    async fn refuse_tap__allows_enabled_control() {
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut controller = controller(Some(provider));
        controller.connect().await.unwrap();
        let controls = controller.build_snapshot(Utc::now()).controls;

        assert!(!controller.refuse_tap(controls));
    }

    #[tokio::test]
    async fn tap__without_wallet_notifies_error() {
        let mut controller = controller(None);

        let result = controller.tap().await;

        assert_eq!(result, Err(TapError::ProviderUnavailable));
        let latest = controller.notifier().latest().unwrap();
        assert_eq!(latest.severity, Severity::Error);
    }

    #[tokio::test]
    async fn search__reads_other_address_without_touching_own_stats() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        provider
            .tapgem()
            .set_stats(bob(), stats(9, Stt::ZERO, Stt::from_whole(1)));
        let mut controller = controller(Some(provider));
        controller.connect().await.unwrap();

        // when
        let found = controller.search(&bob().to_string()).await.unwrap();
        let snapshot = controller.build_snapshot(Utc::now());

        // then
        assert_eq!(found.taps_today, 9);
        assert_eq!(snapshot.search.unwrap().address, bob());
        assert_eq!(snapshot.stats.unwrap().taps_today, 0);
    }

    #[tokio::test]
    async fn search__rejects_malformed_address() {
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut controller = controller(Some(provider));

        let result = controller.search("0xnope").await;

        assert!(matches!(result, Err(TapError::Unknown(_))));
    }

    #[tokio::test]
    async fn handle_provider_event__wrong_chain_disables_tap() {
        // given
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        provider.with_state(|s| s.reject_switch = true);
        let mut controller = controller(Some(provider));
        controller.connect().await.unwrap();

        // when
        controller
            .handle_provider_event(ProviderEvent::ChainChanged(1))
            .await;
        let snapshot = controller.build_snapshot(Utc::now());

        // then
        assert!(!snapshot.correct_network);
        assert!(!snapshot.controls.tap_enabled);
    }

    #[test]
    fn share__requires_connected_account() {
        let mut controller = controller(None);

        assert_eq!(controller.share(), None);
    }

    #[tokio::test]
    async fn share__builds_intent_link() {
        let provider = FakeWalletProvider::new(alice(), SOMNIA_CHAIN_ID);
        let mut controller = controller(Some(provider));
        controller.connect().await.unwrap();

        let link = controller.share().unwrap();

        assert!(link.starts_with("https://x.com/intent/tweet?text="));
    }

    #[test]
    fn gate_close__refused_while_counting_down() {
        // given
        let mut controller = controller(None);
        controller.gate_mut().begin();

        // when
        let closed = controller.gate_close();

        // then
        assert!(!closed);
        assert!(controller.gate().is_open());
    }
}
