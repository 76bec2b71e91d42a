use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    EmailVerification, GlobalStats, InsertUserError, LedgerEntry, NewTransaction, NewUser, User,
};

/// Repository over users, the ledger, verification codes and global stats.
///
/// Anything that moves money or creates an account goes through [`LedgerTx`],
/// obtained from [`Store::begin`]. The remaining methods are single-statement
/// reads and writes that need no surrounding unit.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> anyhow::Result<Box<dyn LedgerTx>>;

    /// Look up by id, deleted accounts included.
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_active_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;
    /// Case-insensitive on the email.
    async fn find_active_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Usernames are unique across deleted accounts as well.
    async fn username_exists(&self, username: &str) -> anyhow::Result<bool>;

    /// Newest first.
    async fn list_transactions(&self, user_id: Uuid) -> anyhow::Result<Vec<LedgerEntry>>;
    /// A single entry, only when it belongs to `user_id`.
    async fn find_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> anyhow::Result<Option<LedgerEntry>>;

    /// Drop pending codes for `email` and store a fresh one.
    async fn replace_verification(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<EmailVerification>;
    async fn latest_unverified(
        &self,
        email: &str,
        code: &str,
    ) -> anyhow::Result<Option<EmailVerification>>;
    /// Flip a pending record to verified. `false` when it was already
    /// verified or is gone, so a code is consumed at most once.
    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<bool>;

    /// The singleton counters row, created with defaults on first access.
    async fn global_stats(&self) -> anyhow::Result<GlobalStats>;
}

/// A scoped atomic unit. Writes become visible on [`LedgerTx::commit`];
/// dropping the unit without committing discards them.
#[async_trait]
pub trait LedgerTx: Send {
    /// Fetch a user and hold it exclusively until the unit ends.
    async fn lock_user(&mut self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Usernames are unique over all rows, emails over active rows.
    async fn insert_user(&mut self, user: NewUser) -> Result<User, InsertUserError>;
    async fn save_user(&mut self, user: &User) -> anyhow::Result<()>;
    async fn recent_spend_count(
        &mut self,
        user_id: Uuid,
        since: OffsetDateTime,
    ) -> anyhow::Result<i64>;
    async fn insert_transaction(&mut self, entry: NewTransaction) -> anyhow::Result<LedgerEntry>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}
