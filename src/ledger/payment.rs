use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::fraud::{self, RAPID_WINDOW};
use crate::{
    db::{NewTransaction, Store, TransactionKind, User},
    error::{AppError, AppResult},
};

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub provider: String,
    pub account_number: Option<String>,
    pub amount: Decimal,
}

/// Read a decimal from a JSON number or numeric string. Absent or null
/// counts as zero.
pub fn parse_decimal(value: Option<&Value>) -> Option<Decimal> {
    fn from_text(s: &str) -> Option<Decimal> {
        let s = s.trim();
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .ok()
    }

    match value {
        None | Some(Value::Null) => Some(Decimal::ZERO),
        Some(Value::Number(n)) => from_text(&n.to_string()),
        Some(Value::String(s)) => from_text(s),
        Some(_) => None,
    }
}

/// Debit a utility payment from `user_id`.
///
/// The balance check, fraud rules, debit and ledger insert run inside one
/// unit holding the user row, so concurrent payments for the same user are
/// serialized. A flagged payment commits a zero-amount `spend` entry naming
/// the reasons and leaves the balance untouched. Insufficient funds writes
/// nothing.
#[instrument(skip(store, req), fields(provider = %req.provider, amount = %req.amount))]
pub async fn pay(store: &dyn Store, user_id: Uuid, req: PaymentRequest) -> AppResult<User> {
    let mut tx = store.begin().await?;

    let mut user = match tx.lock_user(user_id).await? {
        Some(u) if !u.is_deleted => u,
        _ => {
            tx.rollback().await?;
            return Err(AppError::NotFound("User not found".into()));
        }
    };

    if user.balance < req.amount {
        tx.rollback().await?;
        warn!(%user_id, balance = %user.balance, "insufficient funds");
        return Err(AppError::InsufficientFunds);
    }

    let since = OffsetDateTime::now_utc() - RAPID_WINDOW;
    let recent = tx.recent_spend_count(user.id, since).await?;
    let verdict = fraud::evaluate(req.account_number.as_deref(), req.amount, recent);

    if verdict.is_fraud() {
        let reasons = verdict.describe();
        tx.insert_transaction(NewTransaction {
            user_id: user.id,
            amount: Decimal::ZERO,
            kind: TransactionKind::Spend,
            description: format!("{} payment - FRAUD DETECTED: {}", req.provider, reasons),
            provider: Some(req.provider.clone()),
        })
        .await?;
        tx.commit().await?;
        warn!(%user_id, %reasons, recent_spends = recent, "payment flagged");
        return Err(AppError::FraudDetected(verdict.messages()));
    }

    user.balance -= req.amount;
    tx.save_user(&user).await?;
    tx.insert_transaction(NewTransaction {
        user_id: user.id,
        amount: -req.amount,
        kind: TransactionKind::Spend,
        description: format!(
            "{} payment (account: {})",
            req.provider,
            req.account_number.as_deref().unwrap_or("")
        ),
        provider: Some(req.provider.clone()),
    })
    .await?;
    tx.commit().await?;

    info!(%user_id, balance = %user.balance, "payment completed");
    Ok(user)
}
