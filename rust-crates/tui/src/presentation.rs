use alloy::primitives::Address;
use chrono::{
    DateTime,
    Utc,
};
use url::Url;

use crate::{
    amount::Stt,
    contract::{
        UserStats,
        claimable,
    },
};

pub const STREAK_GOAL_DAYS: u64 = 50;
pub const SHARE_INTENT_URL: &str = "https://x.com/intent/tweet";
pub const DAPP_LINK_BASE: &str = "https://dapp.link";

pub const LORE: &str = "Deep beneath the Somnia chain rests the Gem, a shard that remembers \
every hand that touches it. Each tap leaves a mark on-chain. Come back every day, keep your \
streak alive, and the Gem will remember you.";

pub const RULES: [&str; 6] = [
    "Tap the Gem up to 20 times per day. The counter resets at 00:00 UTC.",
    "Each tap earns points and a small STT reward.",
    "Tapping on consecutive days grows your streak.",
    "Rewards accrue as unclaimed STT until you claim them.",
    "At most 15 STT can be claimed per month.",
    "Verify once per session before your first tap.",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BadgeTier {
    pub name: &'static str,
    pub emoji: &'static str,
    pub min_points: u64,
}

pub const BADGE_TIERS: [BadgeTier; 8] = [
    BadgeTier { name: "Newbie", emoji: "🟢", min_points: 0 },
    BadgeTier { name: "Tapper", emoji: "🔵", min_points: 30 },
    BadgeTier { name: "Streaker", emoji: "🟣", min_points: 150 },
    BadgeTier { name: "Grinder", emoji: "🟠", min_points: 450 },
    BadgeTier { name: "Champion", emoji: "🟡", min_points: 900 },
    BadgeTier { name: "Legend", emoji: "🔴", min_points: 1800 },
    BadgeTier { name: "Icon", emoji: "🟣✨", min_points: 3000 },
    BadgeTier { name: "Immortal", emoji: "🌟", min_points: 5000 },
];

/// Highest tier whose threshold `points` meets.
pub fn badge_for(points: u64) -> &'static BadgeTier {
    BADGE_TIERS
        .iter()
        .rev()
        .find(|tier| points >= tier.min_points)
        .unwrap_or(&BADGE_TIERS[0])
}

/// The new tier when `points` crossed into a higher one since `previous`.
pub fn badge_upgrade(previous: Option<u64>, points: u64) -> Option<&'static BadgeTier> {
    let before = badge_for(previous?);
    let now = badge_for(points);
    (now.min_points > before.min_points).then_some(now)
}

pub fn streak_fill(current_streak: u64) -> f64 {
    (current_streak as f64 / STREAK_GOAL_DAYS as f64).min(1.0)
}

pub fn monthly_fill(unclaimed: Stt, claimed: Stt, monthly_cap: Stt) -> f64 {
    unclaimed.saturating_add(claimed).ratio_of(monthly_cap)
}

pub fn seconds_until_reset(now: DateTime<Utc>) -> i64 {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0));
    match next_midnight {
        Some(midnight) => (midnight - now.naive_utc()).num_seconds().max(0),
        None => 0,
    }
}

pub fn format_countdown(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{}h {}m {}s",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

pub fn reset_countdown_line(now: DateTime<Utc>) -> String {
    format!(
        "Next tap reset in {} (UTC)",
        format_countdown(seconds_until_reset(now))
    )
}

pub fn share_text(tier: &BadgeTier, account: Address) -> String {
    format!(
        "I reached {} {} on Proof of Tap 💎. Building my on-chain reputation one tap at a time. → {DAPP_LINK_BASE}/{account}",
        tier.emoji, tier.name
    )
}

pub fn share_intent_url(tier: &BadgeTier, account: Address) -> Result<Url, url::ParseError> {
    Url::parse_with_params(SHARE_INTENT_URL, &[("text", share_text(tier, account))])
}

/// `0x1234…abcd`
pub fn shorten_address(address: Address) -> String {
    let full = address.to_checksum(None);
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

pub fn tap_feedback(taps_today: u32, daily_tap_cap: u32, reward: Option<Stt>) -> String {
    match reward {
        Some(reward) => format!("Tap {taps_today} of {daily_tap_cap} • +{reward} STT"),
        None => format!("Tap {taps_today} of {daily_tap_cap}"),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    pub tap_enabled: bool,
    pub claim_visible: bool,
    pub claim_enabled: bool,
}

impl Controls {
    pub const CLAIM_DISABLED_HINT: &'static str = "No rewards to claim or monthly limit reached.";
}

/// Which actions are offered for the current state.
pub fn controls(
    stats: Option<&UserStats>,
    writable: bool,
    busy: bool,
    daily_tap_cap: u32,
    monthly_reward_cap: Stt,
) -> Controls {
    let at_cap = stats.is_some_and(|stats| stats.at_daily_cap(daily_tap_cap));
    let claim_visible = at_cap;
    Controls {
        tap_enabled: writable && !busy && !at_cap,
        claim_visible,
        claim_enabled: claim_visible
            && writable
            && !busy
            && stats.is_some_and(|stats| claimable(stats, monthly_reward_cap)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy::primitives::address;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at_cap(unclaimed: Stt, claimed: Stt) -> UserStats {
        UserStats {
            taps_today: 20,
            current_streak: 3,
            points: 120,
            unclaimed_rewards: unclaimed,
            total_reward_claimed: claimed,
        }
    }

    #[test]
    fn badge_for__tier_edges() {
        assert_eq!(badge_for(0).name, "Newbie");
        assert_eq!(badge_for(29).name, "Newbie");
        assert_eq!(badge_for(30).name, "Tapper");
        assert_eq!(badge_for(2999).name, "Legend");
        assert_eq!(badge_for(3000).name, "Icon");
        assert_eq!(badge_for(u64::MAX).name, "Immortal");
    }

    #[test]
    fn badge_upgrade__only_on_crossing() {
        assert_eq!(badge_upgrade(Some(29), 30).map(|t| t.name), Some("Tapper"));
        assert_eq!(badge_upgrade(Some(31), 32), None);
        assert_eq!(badge_upgrade(None, 5000), None);
    }

    #[test]
    fn streak_fill__clamps_at_goal() {
        assert_eq!(streak_fill(0), 0.0);
        assert_eq!(streak_fill(25), 0.5);
        assert_eq!(streak_fill(80), 1.0);
    }

    #[test]
    fn monthly_fill__sums_unclaimed_and_claimed() {
        let cap = Stt::from_whole(15);

        assert_eq!(monthly_fill(Stt::from_cents(300), Stt::from_cents(450), cap), 0.5);
        assert_eq!(monthly_fill(Stt::from_whole(10), Stt::from_whole(10), cap), 1.0);
    }

    #[test]
    fn seconds_until_reset__counts_to_utc_midnight() {
        // given
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 22, 58, 30).unwrap();

        // when
        let left = seconds_until_reset(now);

        // then
        assert_eq!(left, 3600 + 90);
        assert_eq!(reset_countdown_line(now), "Next tap reset in 1h 1m 30s (UTC)");
    }

    #[test]
    fn share_intent_url__encodes_text() {
        // given
        let account = address!("0x00000000000000000000000000000000000a11ce");

        // when
        let url = share_intent_url(badge_for(150), account).unwrap();

        // then
        let (key, text) = url.query_pairs().next().unwrap();
        assert_eq!(url.host_str(), Some("x.com"));
        assert_eq!(key, "text");
        assert!(text.starts_with("I reached 🟣 Streaker on Proof of Tap 💎."));
        assert!(text.ends_with(&format!("https://dapp.link/{account}")));
    }

    #[test]
    fn shorten_address__keeps_both_ends() {
        let short = shorten_address(address!("0x1234567890abcdef1234567890abcdef12345678"));

        assert!(short.starts_with("0x1234"));
        assert!(short.ends_with("5678"));
        assert_eq!(short.chars().count(), 11);
    }

    #[test]
    fn tap_feedback__mentions_reward() {
        assert_eq!(
            tap_feedback(4, 20, Some(Stt::from_cents(5))),
            "Tap 4 of 20 • +0.05 STT"
        );
        assert_eq!(tap_feedback(4, 20, None), "Tap 4 of 20");
    }

    #[test]
    fn controls__cap_disables_tap_and_surfaces_claim() {
        // when
        let controls = controls(
            Some(&at_cap(Stt::from_whole(1), Stt::ZERO)),
            true,
            false,
            20,
            Stt::from_whole(15),
        );

        // then
        assert!(!controls.tap_enabled);
        assert!(controls.claim_visible);
        assert!(controls.claim_enabled);
    }

    #[test]
    fn controls__claim_disabled_when_nothing_unclaimed_or_cap_hit() {
        let cap = Stt::from_whole(15);

        let empty = controls(Some(&at_cap(Stt::ZERO, Stt::ZERO)), true, false, 20, cap);
        let capped = controls(Some(&at_cap(Stt::from_whole(1), cap)), true, false, 20, cap);

        assert!(empty.claim_visible && !empty.claim_enabled);
        assert!(capped.claim_visible && !capped.claim_enabled);
    }

    #[test]
    fn controls__busy_blocks_tap() {
        let controls = controls(None, true, true, 20, Stt::from_whole(15));

        assert!(!controls.tap_enabled);
        assert!(!controls.claim_visible);
    }

    proptest! {
        #[test]
        fn badge_for__is_monotonic(a in any::<u64>(), b in any::<u64>()) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(badge_for(low).min_points <= badge_for(high).min_points);
            prop_assert!(badge_for(high).min_points <= high);
        }

        #[test]
        fn fills_stay_in_unit_range(streak in any::<u64>(), unclaimed in any::<u64>(), claimed in any::<u64>()) {
            let cap = Stt::from_whole(15);
            let streak = streak_fill(streak);
            let monthly = monthly_fill(Stt::from_cents(unclaimed), Stt::from_cents(claimed), cap);
            prop_assert!((0.0..=1.0).contains(&streak));
            prop_assert!((0.0..=1.0).contains(&monthly));
        }
    }
}
