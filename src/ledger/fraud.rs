use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::Duration;

/// Largest single payment accepted without a flag.
pub const MAX_PAYMENT: Decimal = dec!(10000000);
/// Trailing window for the rapid-payment rule.
pub const RAPID_WINDOW: Duration = Duration::minutes(5);
/// Spends inside [`RAPID_WINDOW`] at which further payments are flagged.
pub const RAPID_LIMIT: i64 = 5;

const ACCOUNT_LEN: std::ops::RangeInclusive<usize> = 6..=15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudReason {
    AccountFormat,
    AccountLength,
    InvalidAmount,
    AmountTooLarge,
    RapidPayments,
}

impl fmt::Display for FraudReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FraudReason::AccountFormat => "bad format",
            FraudReason::AccountLength => "bad length",
            FraudReason::InvalidAmount => "invalid amount",
            FraudReason::AmountTooLarge => "amount too large",
            FraudReason::RapidPayments => "too many rapid payments",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FraudVerdict {
    pub reasons: Vec<FraudReason>,
}

impl FraudVerdict {
    pub fn is_fraud(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }

    pub fn describe(&self) -> String {
        self.messages().join(", ")
    }
}

/// Run every rule; each one that fires contributes its reason, in rule order.
/// An empty or missing account number skips the account rules.
pub fn evaluate(account_number: Option<&str>, amount: Decimal, recent_spend_count: i64) -> FraudVerdict {
    let mut reasons = Vec::new();

    if let Some(account) = account_number.filter(|a| !a.is_empty()) {
        if !account.chars().all(|c| c.is_ascii_digit()) {
            reasons.push(FraudReason::AccountFormat);
        }
        if !ACCOUNT_LEN.contains(&account.chars().count()) {
            reasons.push(FraudReason::AccountLength);
        }
    }

    if amount <= Decimal::ZERO {
        reasons.push(FraudReason::InvalidAmount);
    }
    if amount > MAX_PAYMENT {
        reasons.push(FraudReason::AmountTooLarge);
    }

    if recent_spend_count >= RAPID_LIMIT {
        reasons.push(FraudReason::RapidPayments);
    }

    FraudVerdict { reasons }
}
