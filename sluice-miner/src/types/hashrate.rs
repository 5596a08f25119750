//! Hashrate type with SI-suffixed display.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hashrate in hashes per second.
///
/// Thin wrapper over `f64` so rates read as `9.03T` rather than
/// `9034000000000` in logs and console output. Non-finite and negative
/// rates display as `0` since neither is a meaningful rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashRate(pub f64);

impl HashRate {
    pub const ZERO: Self = Self(0.0);

    pub fn as_hs(self) -> f64 {
        self.0
    }
}

impl From<f64> for HashRate {
    fn from(hs: f64) -> Self {
        Self(hs)
    }
}

impl From<u64> for HashRate {
    fn from(hs: u64) -> Self {
        Self(hs as f64)
    }
}

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.0.is_finite() && self.0 > 0.0 {
            self.0
        } else {
            0.0
        };

        // SI suffixes, lowercase k per mining convention
        let (scaled, suffix) = if value >= 1e18 {
            (value / 1e18, "E")
        } else if value >= 1e15 {
            (value / 1e15, "P")
        } else if value >= 1e12 {
            (value / 1e12, "T")
        } else if value >= 1e9 {
            (value / 1e9, "G")
        } else if value >= 1e6 {
            (value / 1e6, "M")
        } else if value >= 1e3 {
            (value / 1e3, "k")
        } else {
            (value, "")
        };

        // Three significant digits; omit decimals for whole numbers
        if scaled >= 100.0 || scaled.fract() == 0.0 {
            write!(f, "{:.0}{}", scaled, suffix)
        } else if scaled >= 10.0 {
            write!(f, "{:.1}{}", scaled, suffix)
        } else {
            write!(f, "{:.2}{}", scaled, suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_suffixes() {
        assert_eq!(HashRate(1.5e18).to_string(), "1.50E");
        assert_eq!(HashRate(2.0e15).to_string(), "2P");
        assert_eq!(HashRate(9.034e12).to_string(), "9.03T");
        assert_eq!(HashRate(112.7e12).to_string(), "113T");
        assert_eq!(HashRate(11.2e12).to_string(), "11.2T");
        assert_eq!(HashRate(500.0e9).to_string(), "500G");
        assert_eq!(HashRate(1.5e6).to_string(), "1.50M");
        assert_eq!(HashRate(2_500.0).to_string(), "2.50k");
        assert_eq!(HashRate(500.0).to_string(), "500");
    }

    #[test]
    fn test_display_zero_and_garbage() {
        assert_eq!(HashRate(0.0).to_string(), "0");
        assert_eq!(HashRate(-3.0e12).to_string(), "0");
        assert_eq!(HashRate(f64::NAN).to_string(), "0");
        assert_eq!(HashRate(f64::INFINITY).to_string(), "0");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(HashRate::from(1000u64).as_hs(), 1000.0);
        assert_eq!(HashRate::from(2.5f64).as_hs(), 2.5);
        assert_eq!(HashRate::ZERO.as_hs(), 0.0);
    }

    #[test]
    fn test_serde_transparent() {
        let rate = HashRate(9.0e12);
        let json = serde_json::to_string(&rate).unwrap();
        assert_eq!(json, "9000000000000.0");
        let back: HashRate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rate);
    }
}
