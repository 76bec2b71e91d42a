use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub mod memory;
pub mod postgres;
mod store;

pub use store::{LedgerTx, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Spend,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Argon2 hash; `None` for accounts created through Google sign-in.
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub balance: Decimal,
    pub total_recycled_kg: Decimal,
    pub level: i32,
    pub join_date: Date,
    pub role: Role,
    pub is_active: bool,
    pub is_deleted: bool,
    pub deleted_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    /// "First Last", or the username when both are blank.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn soft_delete(&mut self, now: OffsetDateTime) {
        self.is_deleted = true;
        self.is_active = false;
        self.deleted_at = Some(now);
    }
}

/// Starting balance credited to every new account.
pub const WELCOME_BONUS: Decimal = dec!(1000.00);

/// Largest magnitude a `NUMERIC(12, 2)` money or weight column holds.
pub const MAX_STORED_AMOUNT: Decimal = dec!(9999999999.99);

/// Whether `value` fits the money/weight columns.
pub fn fits_column(value: Decimal) -> bool {
    value.abs() <= MAX_STORED_AMOUNT
}

/// Why a user row could not be inserted.
#[derive(Debug, thiserror::Error)]
pub enum InsertUserError {
    #[error("username {0} is already taken")]
    UsernameTaken(String),
    #[error("email {0} is already registered")]
    EmailTaken(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
}

/// One immutable row of a user's ledger.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub description: String,
    pub provider: Option<String>,
    #[serde(rename = "date", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EmailVerification {
    pub id: Uuid,
    pub email: String,
    pub code: String,
    pub is_verified: bool,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl EmailVerification {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}

/// Site-wide counters shown on the landing page. Maintained separately from
/// the ledger.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GlobalStats {
    pub total_users: i32,
    pub total_waste_collected: Decimal,
    pub total_payouts: i64,
    pub co2_saved: Decimal,
    #[serde(skip)]
    pub updated_at: OffsetDateTime,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            total_users: 142_050,
            total_waste_collected: dec!(5890.00),
            total_payouts: 850_000_000,
            co2_saved: dec!(2100.00),
            updated_at: OffsetDateTime::now_utc(),
        }
    }
}
