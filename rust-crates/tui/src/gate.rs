use color_eyre::eyre::Result;
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
};
use tracing::{
    info,
    warn,
};

use crate::storage::SessionStore;

pub const VERIFIED_KEY: &str = "proof_of_tap.verified";
pub const DECOY_DELAY_KEY: &str = "proof_of_tap.decoy_delay_secs";

pub const DEFAULT_COUNTDOWN_SECS: u32 = 10;
pub const DEFAULT_DECOY_STEP_SECS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateConfig {
    pub countdown_secs: u32,
    pub decoy_step_secs: u32,
    pub require_interaction: bool,
    pub follow_url: String,
    pub interaction_url: Option<String>,
}

impl GateConfig {
    pub fn new(follow_url: impl Into<String>) -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            decoy_step_secs: DEFAULT_DECOY_STEP_SECS,
            require_interaction: false,
            follow_url: follow_url.into(),
            interaction_url: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateStage {
    Idle,
    Follow,
    Interact,
    Captcha,
    Verified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptchaQuestion {
    pub left: u8,
    pub right: u8,
}

impl CaptchaQuestion {
    pub fn new(left: u8, right: u8) -> Self {
        Self { left, right }
    }

    fn random(rng: &mut impl Rng) -> Self {
        Self::new(rng.random_range(1..=9), rng.random_range(1..=9))
    }

    pub fn expected(&self) -> u32 {
        u32::from(self.left) + u32::from(self.right)
    }

    pub fn prompt(&self) -> String {
        format!("What is {} + {}?", self.left, self.right)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Opened(GateStage),
    AlreadyVerified,
    Advanced(GateStage),
    Verified,
    /// Confirmed before the link was opened or the countdown ran out.
    Delayed { decoy_delay_secs: u32 },
    WrongAnswer { decoy_delay_secs: u32 },
    Ignored,
}

/// Follow → (interact) → captcha friction in front of the first tap of a
/// session. Every premature or wrong confirmation adds to a decoy delay that
/// stretches the following countdowns and only clears on success.
#[derive(Debug)]
pub struct VerificationGate<S: SessionStore> {
    store: S,
    config: GateConfig,
    rng: StdRng,
    stage: GateStage,
    link_opened: bool,
    timer_secs: u32,
    decoy_delay_secs: u32,
    captcha: CaptchaQuestion,
    answer: String,
}

impl<S: SessionStore> VerificationGate<S> {
    pub fn new(store: S, config: GateConfig) -> Result<Self> {
        Self::with_rng(store, config, StdRng::from_os_rng())
    }

    pub fn with_rng(store: S, config: GateConfig, mut rng: StdRng) -> Result<Self> {
        let verified = store.get(VERIFIED_KEY)?.as_deref() == Some("true");
        let decoy_delay_secs = store
            .get(DECOY_DELAY_KEY)?
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let captcha = CaptchaQuestion::random(&mut rng);
        Ok(Self {
            store,
            config,
            rng,
            stage: if verified {
                GateStage::Verified
            } else {
                GateStage::Idle
            },
            link_opened: false,
            timer_secs: 0,
            decoy_delay_secs,
            captcha,
            answer: String::new(),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn stage(&self) -> GateStage {
        self.stage
    }

    pub fn is_verified(&self) -> bool {
        self.stage == GateStage::Verified
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self.stage,
            GateStage::Follow | GateStage::Interact | GateStage::Captcha
        )
    }

    pub fn timer_secs(&self) -> u32 {
        self.timer_secs
    }

    pub fn decoy_delay_secs(&self) -> u32 {
        self.decoy_delay_secs
    }

    pub fn link_opened(&self) -> bool {
        self.link_opened
    }

    pub fn captcha(&self) -> Option<&CaptchaQuestion> {
        (self.stage == GateStage::Captcha).then_some(&self.captcha)
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Link for the current stage, if it has one.
    pub fn stage_link(&self) -> Option<&str> {
        match self.stage {
            GateStage::Follow => Some(self.config.follow_url.as_str()),
            GateStage::Interact => self.config.interaction_url.as_deref(),
            _ => None,
        }
    }

    /// A tap was attempted.
    pub fn begin(&mut self) -> GateOutcome {
        match self.stage {
            GateStage::Verified => GateOutcome::AlreadyVerified,
            GateStage::Idle => {
                self.enter(GateStage::Follow);
                GateOutcome::Opened(GateStage::Follow)
            }
            stage => GateOutcome::Opened(stage),
        }
    }

    /// Records that the stage link was activated. Only the first activation counts.
    pub fn open_link(&mut self) -> Option<String> {
        if !matches!(self.stage, GateStage::Follow | GateStage::Interact) || self.link_opened {
            return None;
        }
        let link = self.stage_link()?.to_owned();
        self.link_opened = true;
        info!(stage = ?self.stage, "verification link opened");
        Some(link)
    }

    /// One second elapsed.
    pub fn tick(&mut self) {
        if self.is_open() {
            self.timer_secs = self.timer_secs.saturating_sub(1);
        }
    }

    pub fn push_digit(&mut self, digit: char) {
        if self.stage == GateStage::Captcha && digit.is_ascii_digit() && self.answer.len() < 3 {
            self.answer.push(digit);
        }
    }

    pub fn pop_digit(&mut self) {
        self.answer.pop();
    }

    pub fn set_answer(&mut self, answer: &str) {
        if self.stage == GateStage::Captcha {
            self.answer = answer.to_owned();
        }
    }

    pub fn confirm(&mut self) -> Result<GateOutcome> {
        match self.stage {
            GateStage::Idle | GateStage::Verified => Ok(GateOutcome::Ignored),
            GateStage::Follow | GateStage::Interact => {
                if !self.link_opened || self.timer_secs > 0 {
                    return self.penalize().map(|decoy_delay_secs| GateOutcome::Delayed {
                        decoy_delay_secs,
                    });
                }
                let next = if self.stage == GateStage::Follow && self.config.require_interaction {
                    GateStage::Interact
                } else {
                    GateStage::Captcha
                };
                self.enter(next);
                Ok(GateOutcome::Advanced(next))
            }
            GateStage::Captcha => {
                if self.timer_secs > 0 {
                    return self.penalize().map(|decoy_delay_secs| GateOutcome::Delayed {
                        decoy_delay_secs,
                    });
                }
                let correct = self
                    .answer
                    .trim()
                    .parse::<u32>()
                    .is_ok_and(|value| value == self.captcha.expected());
                if !correct {
                    let decoy_delay_secs = self.penalize()?;
                    return Ok(GateOutcome::WrongAnswer { decoy_delay_secs });
                }
                self.store.set(VERIFIED_KEY, "true")?;
                self.store.set(DECOY_DELAY_KEY, "0")?;
                self.stage = GateStage::Verified;
                self.timer_secs = 0;
                self.decoy_delay_secs = 0;
                self.answer.clear();
                info!("verification gate passed");
                Ok(GateOutcome::Verified)
            }
        }
    }

    pub fn can_close(&self) -> bool {
        self.timer_secs == 0 && self.decoy_delay_secs == 0
    }

    /// Dismisses an unfinished gate. Progress is lost; the decoy delay is not.
    pub fn close(&mut self) -> bool {
        if !self.is_open() || !self.can_close() {
            return false;
        }
        self.stage = GateStage::Idle;
        self.link_opened = false;
        self.answer.clear();
        true
    }

    /// Forgets the verification, e.g. when the session is cleared.
    pub fn reset(&mut self) -> Result<()> {
        self.store.clear()?;
        self.stage = GateStage::Idle;
        self.link_opened = false;
        self.timer_secs = 0;
        self.decoy_delay_secs = 0;
        self.answer.clear();
        Ok(())
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn set_captcha(&mut self, question: CaptchaQuestion) {
        self.captcha = question;
    }

    fn enter(&mut self, stage: GateStage) {
        self.stage = stage;
        self.link_opened = false;
        self.timer_secs = self
            .config
            .countdown_secs
            .saturating_add(self.decoy_delay_secs);
        if stage == GateStage::Captcha {
            self.captcha = CaptchaQuestion::random(&mut self.rng);
            self.answer.clear();
        }
        info!(?stage, countdown = self.timer_secs, "verification stage entered");
    }

    fn penalize(&mut self) -> Result<u32> {
        self.decoy_delay_secs = self
            .decoy_delay_secs
            .saturating_add(self.config.decoy_step_secs);
        self.store
            .set(DECOY_DELAY_KEY, &self.decoy_delay_secs.to_string())?;
        warn!(
            stage = ?self.stage,
            decoy_delay_secs = self.decoy_delay_secs,
            "verification step incomplete"
        );
        Ok(self.decoy_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use crate::storage::InMemorySessionStore;
    use proptest::prelude::*;

    fn gate(store: InMemorySessionStore) -> VerificationGate<InMemorySessionStore> {
        VerificationGate::with_rng(
            store,
            GateConfig::new("https://x.com/sireadell"),
            StdRng::seed_from_u64(7),
        )
        .unwrap()
    }

    fn wait_out(gate: &mut VerificationGate<InMemorySessionStore>) {
        while gate.timer_secs() > 0 {
            gate.tick();
        }
    }

    fn to_captcha(gate: &mut VerificationGate<InMemorySessionStore>) {
        gate.begin();
        gate.open_link();
        wait_out(gate);
        assert_eq!(gate.confirm().unwrap(), GateOutcome::Advanced(GateStage::Captcha));
        wait_out(gate);
    }

    #[test]
    fn begin__opens_follow_with_countdown() {
        // given
        let mut gate = gate(InMemorySessionStore::new());

        // when
        let outcome = gate.begin();

        // then
        assert_eq!(outcome, GateOutcome::Opened(GateStage::Follow));
        assert_eq!(gate.timer_secs(), 10);
        assert_eq!(gate.stage_link(), Some("https://x.com/sireadell"));
    }

    #[test]
    fn confirm__before_link_opened_adds_decoy() {
        // given
        let mut gate = gate(InMemorySessionStore::new());
        gate.begin();
        wait_out(&mut gate);

        // when
        let outcome = gate.confirm().unwrap();

        // then
        assert_eq!(outcome, GateOutcome::Delayed { decoy_delay_secs: 3 });
        assert_eq!(gate.stage(), GateStage::Follow);
    }

    #[test]
    fn confirm__before_countdown_elapses_accumulates_decoy() {
        // given
        let mut gate = gate(InMemorySessionStore::new());
        gate.begin();
        gate.open_link();

        // when
        gate.confirm().unwrap();
        let outcome = gate.confirm().unwrap();

        // then
        assert_eq!(outcome, GateOutcome::Delayed { decoy_delay_secs: 6 });
        assert!(!gate.can_close());
    }

    #[test]
    fn open_link__counts_once() {
        let mut gate = gate(InMemorySessionStore::new());
        gate.begin();

        assert!(gate.open_link().is_some());
        assert!(gate.open_link().is_none());
    }

    #[test]
    fn captcha__correct_answer_verifies_and_persists() {
        // given
        let store = InMemorySessionStore::new();
        let mut gate = gate(store.clone());
        to_captcha(&mut gate);
        gate.set_captcha(CaptchaQuestion::new(7, 2));

        // when
        gate.set_answer("9");
        let outcome = gate.confirm().unwrap();

        // then
        assert_eq!(outcome, GateOutcome::Verified);
        assert!(gate.is_verified());
        assert!(!gate.is_open());
        assert_eq!(store.get(VERIFIED_KEY).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn captcha__wrong_answer_keeps_stage_and_adds_three_seconds() {
        // given
        let mut gate = gate(InMemorySessionStore::new());
        to_captcha(&mut gate);
        gate.set_captcha(CaptchaQuestion::new(7, 2));

        // when
        gate.set_answer("8");
        let outcome = gate.confirm().unwrap();

        // then
        assert_eq!(outcome, GateOutcome::WrongAnswer { decoy_delay_secs: 3 });
        assert_eq!(gate.stage(), GateStage::Captcha);
        assert_eq!(gate.captcha(), Some(&CaptchaQuestion::new(7, 2)));
        assert_eq!(gate.answer(), "8");
    }

    #[test]
    fn decoy__saturates_instead_of_overflowing() {
        // given
        let mut store = InMemorySessionStore::new();
        store
            .set(DECOY_DELAY_KEY, &(u32::MAX - 1).to_string())
            .unwrap();
        let mut gate = gate(store.clone());

        // when
        gate.begin();
        let first = gate.confirm().unwrap();
        let second = gate.confirm().unwrap();

        // then
        assert_eq!(gate.timer_secs(), u32::MAX);
        assert_eq!(first, GateOutcome::Delayed { decoy_delay_secs: u32::MAX });
        assert_eq!(second, GateOutcome::Delayed { decoy_delay_secs: u32::MAX });
        assert_eq!(
            store.get(DECOY_DELAY_KEY).unwrap(),
            Some(u32::MAX.to_string())
        );
    }

    #[test]
    fn decoy__stretches_next_countdown_and_clears_on_success() {
        // given
        let mut gate = gate(InMemorySessionStore::new());
        gate.begin();
        gate.open_link();
        gate.confirm().unwrap();
        wait_out(&mut gate);

        // when
        gate.confirm().unwrap();

        // then
        assert_eq!(gate.timer_secs(), 13);
        wait_out(&mut gate);
        let expected = gate.captcha().unwrap().expected().to_string();
        gate.set_answer(&expected);
        assert_eq!(gate.confirm().unwrap(), GateOutcome::Verified);
        assert_eq!(gate.decoy_delay_secs(), 0);
    }

    #[test]
    fn interaction_stage__required_when_configured() {
        // given
        let mut config = GateConfig::new("https://x.com/sireadell");
        config.require_interaction = true;
        config.interaction_url = Some("https://x.com/sireadell/status/1".into());
        let mut gate = VerificationGate::with_rng(
            InMemorySessionStore::new(),
            config,
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        gate.begin();
        gate.open_link();
        wait_out(&mut gate);

        // when
        let outcome = gate.confirm().unwrap();

        // then
        assert_eq!(outcome, GateOutcome::Advanced(GateStage::Interact));
        assert_eq!(gate.stage_link(), Some("https://x.com/sireadell/status/1"));
    }

    #[test]
    fn new__restores_verified_and_decoy_from_store() {
        // given
        let mut store = InMemorySessionStore::new();
        store.set(VERIFIED_KEY, "true").unwrap();
        store.set(DECOY_DELAY_KEY, "9").unwrap();

        // when
        let mut gate = gate(store);

        // then
        assert!(gate.is_verified());
        assert_eq!(gate.decoy_delay_secs(), 9);
        assert_eq!(gate.begin(), GateOutcome::AlreadyVerified);
    }

    #[test]
    fn close__blocked_while_decoy_pending() {
        // given
        let mut gate = gate(InMemorySessionStore::new());
        gate.begin();
        wait_out(&mut gate);
        assert!(gate.close());
        gate.begin();
        wait_out(&mut gate);
        gate.confirm().unwrap();

        // when
        let closed = gate.close();

        // then
        assert!(!closed);
        assert!(gate.is_open());
    }

    #[test]
    fn reset__clears_store_and_verification() {
        let store = InMemorySessionStore::new();
        let mut gate = gate(store.clone());
        to_captcha(&mut gate);
        let expected = gate.captcha().unwrap().expected().to_string();
        gate.set_answer(&expected);
        gate.confirm().unwrap();

        gate.reset().unwrap();

        assert_eq!(gate.stage(), GateStage::Idle);
        assert_eq!(store.get(VERIFIED_KEY).unwrap(), None);
    }

    #[derive(Clone, Debug)]
    enum Step {
        Begin,
        OpenLink,
        Tick(u8),
        Confirm,
        Answer(u8),
        Close,
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Begin),
            Just(Step::OpenLink),
            (0u8..20).prop_map(Step::Tick),
            Just(Step::Confirm),
            (0u8..20).prop_map(Step::Answer),
            Just(Step::Close),
        ]
    }

    proptest! {
        #[test]
        fn verified_only_follows_a_correct_captcha(steps in prop::collection::vec(step(), 0..60)) {
            let mut gate = gate(InMemorySessionStore::new());
            let mut seen_follow = false;
            for step in steps {
                let before = gate.stage();
                let decoy_before = gate.decoy_delay_secs();
                let expected = gate.captcha().map(CaptchaQuestion::expected);
                let outcome = match step {
                    Step::Begin => { gate.begin(); None }
                    Step::OpenLink => { gate.open_link(); None }
                    Step::Tick(n) => { (0..n).for_each(|_| gate.tick()); None }
                    Step::Confirm => Some(gate.confirm().unwrap()),
                    Step::Answer(value) => {
                        gate.set_answer(&value.to_string());
                        Some(gate.confirm().unwrap())
                    }
                    Step::Close => { gate.close(); None }
                };
                if gate.stage() == GateStage::Follow {
                    seen_follow = true;
                }
                if before != GateStage::Verified && gate.is_verified() {
                    prop_assert!(seen_follow);
                    prop_assert_eq!(before, GateStage::Captcha);
                    prop_assert!(expected.is_some());
                }
                if let Some(GateOutcome::WrongAnswer { decoy_delay_secs }) = outcome {
                    prop_assert_eq!(gate.stage(), GateStage::Captcha);
                    prop_assert_eq!(decoy_delay_secs, decoy_before + 3);
                }
            }
        }
    }
}
