//! Business-rule knobs kept out of the engine code. The defaults mirror
//! what the product runs with today; the exact threshold and percentage
//! are owned by the product side, not by this crate.

use crate::Amount;

#[derive(Debug, Clone)]
pub struct Policies {
    /// Days past the due date before a payment counts as late.
    pub penalty_grace_days: i64,
    /// Late fee as basis points of the monthly installment (500 = 5%).
    pub penalty_rate_bps: i64,
    /// Maximum |counted - expected| accepted at session close without
    /// supervisor validation.
    pub close_tolerance: Amount,
    /// Seed freshly created accounts with a demo balance instead of zero.
    pub demo_balances: bool,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            penalty_grace_days: 7,
            penalty_rate_bps: 500,
            close_tolerance: Amount::from_float(0.01),
            demo_balances: false,
        }
    }
}
