use alloy::primitives::U256;
use std::fmt;

const WEI_PER_STT: u64 = 1_000_000_000_000_000_000;
const WEI_PER_CENT: u64 = WEI_PER_STT / 100;

/// STT amount held in wei (18 decimals).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stt(U256);

impl Stt {
    pub const ZERO: Stt = Stt(U256::ZERO);

    pub const fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    pub fn from_whole(stt: u64) -> Self {
        Self(U256::from(stt).saturating_mul(U256::from(WEI_PER_STT)))
    }

    /// Amount given in hundredths of an STT.
    pub fn from_cents(cents: u64) -> Self {
        Self(U256::from(cents).saturating_mul(U256::from(WEI_PER_CENT)))
    }

    pub const fn wei(self) -> U256 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_add(self, other: Stt) -> Stt {
        Stt(self.0.saturating_add(other.0))
    }

    /// Rounded to two decimals, e.g. `12.35`.
    pub fn fixed2(self) -> String {
        let cents = self.0.saturating_add(U256::from(WEI_PER_CENT / 2)) / U256::from(WEI_PER_CENT);
        let whole = cents / U256::from(100u64);
        let rem = (cents % U256::from(100u64)).to::<u64>();
        format!("{whole}.{rem:02}")
    }

    /// Fraction of `cap` this amount covers, clamped to `[0, 1]`.
    pub fn ratio_of(self, cap: Stt) -> f64 {
        if cap.is_zero() || self.0 >= cap.0 {
            return 1.0;
        }
        let basis_points = self.0 * U256::from(10_000u64) / cap.0;
        basis_points.to::<u64>() as f64 / 10_000.0
    }
}

impl From<U256> for Stt {
    fn from(wei: U256) -> Self {
        Self(wei)
    }
}

/// Whole part, a dot, then the fraction without trailing zeros (`0.05`, `3.0`).
impl fmt::Display for Stt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = U256::from(WEI_PER_STT);
        let whole = self.0 / unit;
        let frac = (self.0 % unit).to::<u64>();
        if frac == 0 {
            return write!(f, "{whole}.0");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}
