use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    EmailVerification, GlobalStats, InsertUserError, LedgerEntry, LedgerTx, NewTransaction,
    NewUser, Role, Store, TransactionKind, User, WELCOME_BONUS,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    transactions: Vec<LedgerEntry>,
    verifications: Vec<EmailVerification>,
    stats: Option<GlobalStats>,
}

/// Process-local store. A ledger unit holds the whole store exclusively and
/// works on a staged copy that replaces the live state on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryLedgerTx { guard, staged }))
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let st = self.state.lock().await;
        Ok(st.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_active_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let st = self.state.lock().await;
        Ok(st
            .users
            .iter()
            .find(|u| !u.is_deleted && u.username == username)
            .cloned())
    }

    async fn find_active_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let needle = email.to_lowercase();
        let st = self.state.lock().await;
        Ok(st
            .users
            .iter()
            .find(|u| !u.is_deleted && u.email.to_lowercase() == needle)
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let st = self.state.lock().await;
        Ok(st.users.iter().any(|u| u.username == username))
    }

    async fn list_transactions(&self, user_id: Uuid) -> anyhow::Result<Vec<LedgerEntry>> {
        let st = self.state.lock().await;
        Ok(st
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> anyhow::Result<Option<LedgerEntry>> {
        let st = self.state.lock().await;
        Ok(st
            .transactions
            .iter()
            .find(|t| t.id == id && t.user_id == user_id)
            .cloned())
    }

    async fn replace_verification(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<EmailVerification> {
        let mut st = self.state.lock().await;
        st.verifications.retain(|v| v.is_verified || v.email != email);
        let row = EmailVerification {
            id: Uuid::new_v4(),
            email: email.to_string(),
            code: code.to_string(),
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
        };
        st.verifications.push(row.clone());
        Ok(row)
    }

    async fn latest_unverified(
        &self,
        email: &str,
        code: &str,
    ) -> anyhow::Result<Option<EmailVerification>> {
        let st = self.state.lock().await;
        Ok(st
            .verifications
            .iter()
            .rev()
            .find(|v| !v.is_verified && v.email == email && v.code == code)
            .cloned())
    }

    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut st = self.state.lock().await;
        match st.verifications.iter_mut().find(|v| v.id == id && !v.is_verified) {
            Some(v) => {
                v.is_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn global_stats(&self) -> anyhow::Result<GlobalStats> {
        let mut st = self.state.lock().await;
        Ok(st.stats.get_or_insert_with(GlobalStats::default).clone())
    }
}

pub struct MemoryLedgerTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_user(&mut self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.staged.users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, InsertUserError> {
        if self.staged.users.iter().any(|u| u.username == user.username) {
            return Err(InsertUserError::UsernameTaken(user.username));
        }
        let email = user.email.to_lowercase();
        if self
            .staged
            .users
            .iter()
            .any(|u| !u.is_deleted && u.email.to_lowercase() == email)
        {
            return Err(InsertUserError::EmailTaken(user.email));
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            balance: WELCOME_BONUS,
            total_recycled_kg: Decimal::ZERO,
            level: 1,
            join_date: now.date(),
            role: Role::User,
            is_active: true,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
        };
        self.staged.users.push(row.clone());
        Ok(row)
    }

    async fn save_user(&mut self, user: &User) -> anyhow::Result<()> {
        let slot = self
            .staged
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| anyhow::anyhow!("user {} not found", user.id))?;
        *slot = user.clone();
        Ok(())
    }

    async fn recent_spend_count(
        &mut self,
        user_id: Uuid,
        since: OffsetDateTime,
    ) -> anyhow::Result<i64> {
        let count = self
            .staged
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.kind == TransactionKind::Spend && t.created_at >= since)
            .count();
        Ok(count as i64)
    }

    async fn insert_transaction(&mut self, entry: NewTransaction) -> anyhow::Result<LedgerEntry> {
        if !self.staged.users.iter().any(|u| u.id == entry.user_id) {
            anyhow::bail!("transaction for unknown user {}", entry.user_id);
        }
        let row = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            amount: entry.amount,
            kind: entry.kind,
            description: entry.description,
            provider: entry.provider,
            created_at: OffsetDateTime::now_utc(),
        };
        self.staged.transactions.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let MemoryLedgerTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: format!("{username}@gmail.com"),
            password_hash: None,
            first_name: username.into(),
            last_name: String::new(),
        }
    }

    #[tokio::test]
    async fn uncommitted_unit_leaves_no_trace() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(new_user("aziz")).await.unwrap();
        drop(tx);

        assert!(store.find_user(user.id).await.unwrap().is_none());
        assert!(!store.username_exists("aziz").await.unwrap());
    }

    #[tokio::test]
    async fn committed_unit_applies_all_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut user = tx.insert_user(new_user("aziz")).await.unwrap();
        user.balance -= dec!(100);
        tx.save_user(&user).await.unwrap();
        tx.insert_transaction(NewTransaction {
            user_id: user.id,
            amount: dec!(-100),
            kind: TransactionKind::Spend,
            description: "Gas payment".into(),
            provider: Some("Gas".into()),
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(900.00));
        assert_eq!(store.list_transactions(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insert_user_rejects_duplicate_username() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(new_user("aziz")).await.unwrap();
        let mut other = new_user("aziz");
        other.email = "someone@gmail.com".into();
        assert!(matches!(
            tx.insert_user(other).await,
            Err(InsertUserError::UsernameTaken(name)) if name == "aziz"
        ));
    }

    #[tokio::test]
    async fn insert_user_rejects_email_of_active_user() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut first = tx.insert_user(new_user("aziz")).await.unwrap();

        let mut twin = new_user("aziz2");
        twin.email = "AZIZ@gmail.com".into();
        assert!(matches!(
            tx.insert_user(twin.clone()).await,
            Err(InsertUserError::EmailTaken(_))
        ));

        first.soft_delete(OffsetDateTime::now_utc());
        tx.save_user(&first).await.unwrap();
        assert!(tx.insert_user(twin).await.is_ok());
    }

    #[tokio::test]
    async fn code_is_marked_verified_once() {
        let store = MemoryStore::new();
        let expires = OffsetDateTime::now_utc() + time::Duration::minutes(10);
        let row = store.replace_verification("a@gmail.com", "111111", expires).await.unwrap();
        assert!(store.mark_verified(row.id).await.unwrap());
        assert!(!store.mark_verified(row.id).await.unwrap());
        assert!(!store.mark_verified(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn replacing_code_drops_only_pending_rows() {
        let store = MemoryStore::new();
        let expires = OffsetDateTime::now_utc() + time::Duration::minutes(10);
        let first = store.replace_verification("a@gmail.com", "111111", expires).await.unwrap();
        store.mark_verified(first.id).await.unwrap();
        store.replace_verification("a@gmail.com", "222222", expires).await.unwrap();
        store.replace_verification("a@gmail.com", "333333", expires).await.unwrap();

        assert!(store.latest_unverified("a@gmail.com", "222222").await.unwrap().is_none());
        assert!(store.latest_unverified("a@gmail.com", "333333").await.unwrap().is_some());
        let st = store.state.lock().await;
        assert_eq!(st.verifications.len(), 2);
    }

    #[tokio::test]
    async fn global_stats_is_a_singleton_with_defaults() {
        let store = MemoryStore::new();
        let a = store.global_stats().await.unwrap();
        let b = store.global_stats().await.unwrap();
        assert_eq!(a.total_users, 142_050);
        assert_eq!(a.total_payouts, b.total_payouts);
        assert_eq!(b.co2_saved, dec!(2100.00));
    }
}
