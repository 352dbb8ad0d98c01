use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-point monetary value with 2 decimal places, stored as a scaled integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 100;

    pub const ZERO: Amount = Amount(0);

    pub fn from_float(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    /// Whole currency units, no cents.
    pub fn from_major(value: i64) -> Self {
        Amount(value * Self::SCALE)
    }

    pub fn to_float(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn abs(self) -> Self {
        Amount(self.0.abs())
    }

    /// Scale by basis points (10_000 bps = 100%), truncating toward zero.
    /// Used for penalty rates.
    pub fn scale_bps(self, bps: i64) -> Self {
        Amount(self.0 * bps / 10_000)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Amount(-self.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

// JSON payloads (webhooks, API envelopes) carry amounts as plain numbers.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_float())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Amount::from_float(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_scaled_preserves_value() {
        let amount = Amount::from_scaled(123_456);
        assert_eq!(amount, Amount(123_456));
    }

    #[test]
    fn from_float_converts_correctly() {
        assert_eq!(Amount::from_float(100.0), Amount::from_scaled(10_000));
        assert_eq!(Amount::from_float(1.5), Amount::from_scaled(150));
        assert_eq!(Amount::from_float(0.01), Amount::from_scaled(1));
    }

    #[test]
    fn from_float_rounds_correctly() {
        assert_eq!(Amount::from_float(1.234), Amount::from_scaled(123));
        assert_eq!(Amount::from_float(1.235), Amount::from_scaled(124));
    }

    #[test]
    fn from_major_scales_whole_units() {
        assert_eq!(Amount::from_major(100_000), Amount::from_scaled(10_000_000));
    }

    #[test]
    fn from_float_handles_negative() {
        assert_eq!(Amount::from_float(-50.25), Amount::from_scaled(-5_025));
    }

    #[test]
    fn display_formats_positive() {
        assert_eq!(Amount::from_scaled(10_000).to_string(), "100.00");
        assert_eq!(Amount::from_scaled(150).to_string(), "1.50");
        assert_eq!(Amount::from_scaled(1).to_string(), "0.01");
        assert_eq!(Amount::from_scaled(0).to_string(), "0.00");
    }

    #[test]
    fn display_formats_negative() {
        assert_eq!(Amount::from_scaled(-5_025).to_string(), "-50.25");
        assert_eq!(Amount::from_scaled(-1).to_string(), "-0.01");
    }

    #[test]
    fn default_is_zero() {
        assert_eq!(Amount::default(), Amount::ZERO);
    }

    #[test]
    fn arithmetic() {
        let a = Amount::from_scaled(100);
        let b = Amount::from_scaled(30);
        assert_eq!(a + b, Amount::from_scaled(130));
        assert_eq!(a - b, Amount::from_scaled(70));
        assert_eq!(-a, Amount::from_scaled(-100));

        let mut c = a;
        c += b;
        assert_eq!(c, Amount::from_scaled(130));
        c -= a;
        assert_eq!(c, Amount::from_scaled(30));
    }

    #[test]
    fn sum_over_iterator() {
        let total: Amount = [10, 20, 30].into_iter().map(Amount::from_scaled).sum();
        assert_eq!(total, Amount::from_scaled(60));
    }

    #[test]
    fn scale_bps_computes_percentage() {
        // 5% of 10_000.00
        assert_eq!(
            Amount::from_major(10_000).scale_bps(500),
            Amount::from_major(500)
        );
        assert_eq!(Amount::from_scaled(100).scale_bps(0), Amount::ZERO);
    }

    #[test]
    fn abs_and_negativity() {
        assert!(Amount::from_scaled(-1).is_negative());
        assert!(!Amount::ZERO.is_negative());
        assert_eq!(Amount::from_scaled(-100).abs(), Amount::from_scaled(100));
    }

    #[test]
    fn ordering() {
        assert!(Amount::from_scaled(-100) < Amount::ZERO);
        assert!(Amount::ZERO < Amount::from_scaled(100));
    }

    #[test]
    fn serde_roundtrips_through_f64() {
        let amount = Amount::from_float(1234.56);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "1234.56");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }
}
