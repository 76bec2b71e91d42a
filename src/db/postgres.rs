use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    EmailVerification, GlobalStats, InsertUserError, LedgerEntry, LedgerTx, NewTransaction,
    NewUser, Store, TransactionKind, User,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, balance, \
     total_recycled_kg, level, join_date, role, is_active, is_deleted, deleted_at, created_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, amount, kind, description, provider, created_at";

const USERNAME_CONSTRAINT: &str = "users_username_key";
const ACTIVE_EMAIL_CONSTRAINT: &str = "users_email_active_idx";

const VERIFICATION_COLUMNS: &str = "id, email, code, is_verified, created_at, expires_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await.context("begin tx")?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find user")?;
        Ok(user)
    }

    async fn find_active_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND NOT is_deleted"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn find_active_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE lower(email) = lower($1) AND NOT is_deleted
             ORDER BY created_at ASC
             LIMIT 1
            "#
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .context("check username")?;
        Ok(exists)
    }

    async fn list_transactions(&self, user_id: Uuid) -> anyhow::Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
              FROM transactions
             WHERE user_id = $1
             ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("list transactions")?;
        Ok(rows)
    }

    async fn find_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> anyhow::Result<Option<LedgerEntry>> {
        let row = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("find transaction")?;
        Ok(row)
    }

    async fn replace_verification(
        &self,
        email: &str,
        code: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<EmailVerification> {
        let mut tx = self.pool.begin().await.context("begin tx")?;
        sqlx::query("DELETE FROM email_verifications WHERE email = $1 AND NOT is_verified")
            .bind(email)
            .execute(&mut *tx)
            .await
            .context("delete pending codes")?;
        let row = sqlx::query_as::<_, EmailVerification>(&format!(
            r#"
            INSERT INTO email_verifications (email, code, expires_at)
            VALUES ($1, $2, $3)
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .context("insert verification")?;
        tx.commit().await.context("commit tx")?;
        Ok(row)
    }

    async fn latest_unverified(
        &self,
        email: &str,
        code: &str,
    ) -> anyhow::Result<Option<EmailVerification>> {
        let row = sqlx::query_as::<_, EmailVerification>(&format!(
            r#"
            SELECT {VERIFICATION_COLUMNS}
              FROM email_verifications
             WHERE email = $1 AND code = $2 AND NOT is_verified
             ORDER BY created_at DESC
             LIMIT 1
            "#
        ))
        .bind(email)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .context("find verification")?;
        Ok(row)
    }

    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE email_verifications SET is_verified = TRUE WHERE id = $1 AND NOT is_verified",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("mark verified")?;
        Ok(result.rows_affected() == 1)
    }

    async fn global_stats(&self) -> anyhow::Result<GlobalStats> {
        sqlx::query("INSERT INTO global_stats (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(&self.pool)
            .await
            .context("ensure global stats")?;
        let stats = sqlx::query_as::<_, GlobalStats>(
            r#"
            SELECT total_users, total_waste_collected, total_payouts, co2_saved, updated_at
              FROM global_stats
             WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("load global stats")?;
        Ok(stats)
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_user(&mut self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .context("lock user")?;
        Ok(user)
    }

    async fn insert_user(&mut self, user: NewUser) -> Result<User, InsertUserError> {
        let inserted = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, first_name, last_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&mut *self.tx)
        .await;

        match inserted {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let constraint = db.constraint().map(str::to_owned);
                match constraint.as_deref() {
                    Some(USERNAME_CONSTRAINT) => Err(InsertUserError::UsernameTaken(user.username)),
                    Some(ACTIVE_EMAIL_CONSTRAINT) => Err(InsertUserError::EmailTaken(user.email)),
                    _ => Err(anyhow::Error::new(sqlx::Error::Database(db))
                        .context("insert user")
                        .into()),
                }
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn save_user(&mut self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET username = $2, email = $3, password_hash = $4, first_name = $5,
                   last_name = $6, balance = $7, total_recycled_kg = $8, level = $9,
                   role = $10, is_active = $11, is_deleted = $12, deleted_at = $13
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.balance)
        .bind(user.total_recycled_kg)
        .bind(user.level)
        .bind(user.role)
        .bind(user.is_active)
        .bind(user.is_deleted)
        .bind(user.deleted_at)
        .execute(&mut *self.tx)
        .await
        .context("save user")?;
        Ok(())
    }

    async fn recent_spend_count(
        &mut self,
        user_id: Uuid,
        since: OffsetDateTime,
    ) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
              FROM transactions
             WHERE user_id = $1 AND kind = $2 AND created_at >= $3
            "#,
        )
        .bind(user_id)
        .bind(TransactionKind::Spend)
        .bind(since)
        .fetch_one(&mut *self.tx)
        .await
        .context("count recent spends")?;
        Ok(count)
    }

    async fn insert_transaction(&mut self, entry: NewTransaction) -> anyhow::Result<LedgerEntry> {
        let row = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            INSERT INTO transactions (user_id, amount, kind, description, provider)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.kind)
        .bind(&entry.description)
        .bind(&entry.provider)
        .fetch_one(&mut *self.tx)
        .await
        .context("insert transaction")?;
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.rollback().await.context("rollback tx")?;
        Ok(())
    }
}
