use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::{fits_column, NewTransaction, Store, TransactionKind, User},
    error::{AppError, AppResult},
};

/// Kilograms per level.
pub const KG_PER_LEVEL: i32 = 50;

fn out_of_range() -> AppError {
    AppError::Validation("Amount is outside the supported range".into())
}

/// Apply a recycling credit to `user` in place. At most one level is gained
/// per call, however many thresholds the new total crosses. Totals that would
/// not fit the stored columns are refused and leave `user` untouched.
pub fn apply_recycling(
    user: &mut User,
    added_balance: Decimal,
    added_kg: Decimal,
) -> AppResult<bool> {
    let balance = user
        .balance
        .checked_add(added_balance)
        .filter(|b| fits_column(*b))
        .ok_or_else(out_of_range)?;
    let total_kg = user
        .total_recycled_kg
        .checked_add(added_kg)
        .filter(|kg| fits_column(*kg))
        .ok_or_else(out_of_range)?;

    user.balance = balance;
    user.total_recycled_kg = total_kg;
    if user.total_recycled_kg > Decimal::from(user.level * KG_PER_LEVEL) {
        user.level += 1;
        return Ok(true);
    }
    Ok(false)
}

/// Credit a scan result to the user's balance and recycled weight, and
/// record it as an `earn` entry, in one atomic unit.
#[instrument(skip(store))]
pub async fn update_stats(
    store: &dyn Store,
    user_id: Uuid,
    added_balance: Decimal,
    added_kg: Decimal,
) -> AppResult<User> {
    if !fits_column(added_balance) || !fits_column(added_kg) {
        return Err(out_of_range());
    }

    let mut tx = store.begin().await?;
    let mut user = match tx.lock_user(user_id).await? {
        Some(u) if !u.is_deleted => u,
        _ => {
            tx.rollback().await?;
            return Err(AppError::NotFound("User not found".into()));
        }
    };

    let levelled_up = match apply_recycling(&mut user, added_balance, added_kg) {
        Ok(levelled_up) => levelled_up,
        Err(e) => {
            tx.rollback().await?;
            return Err(e);
        }
    };
    tx.save_user(&user).await?;
    tx.insert_transaction(NewTransaction {
        user_id: user.id,
        amount: added_balance,
        kind: TransactionKind::Earn,
        description: format!("Recycling: {added_kg}kg"),
        provider: Some("AI Scanner".into()),
    })
    .await?;
    tx.commit().await?;

    info!(%user_id, level = user.level, levelled_up, "recycling credited");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory::MemoryStore, NewUser};
    use rust_decimal_macros::dec;

    async fn seed_user(store: &MemoryStore) -> User {
        let mut tx = store.begin().await.unwrap();
        let user = tx
            .insert_user(NewUser {
                username: "nodira".into(),
                email: "nodira@gmail.com".into(),
                password_hash: None,
                first_name: "Nodira".into(),
                last_name: String::new(),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        user
    }

    #[tokio::test]
    async fn crossing_the_threshold_gains_a_level() {
        let store = MemoryStore::new();
        let user = seed_user(&store).await;
        assert_eq!(user.level, 1);

        let updated = update_stats(&store, user.id, dec!(500), dec!(60)).await.unwrap();
        assert_eq!(updated.balance, dec!(1500.00));
        assert_eq!(updated.total_recycled_kg, dec!(60));
        assert_eq!(updated.level, 2);

        let entries = store.list_transactions(user.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TransactionKind::Earn);
        assert_eq!(entries[0].amount, dec!(500));
        assert_eq!(entries[0].description, "Recycling: 60kg");
        assert_eq!(entries[0].provider.as_deref(), Some("AI Scanner"));
    }

    #[tokio::test]
    async fn level_rises_by_one_even_across_several_thresholds() {
        let store = MemoryStore::new();
        let user = seed_user(&store).await;

        let updated = update_stats(&store, user.id, dec!(0), dec!(500)).await.unwrap();
        assert_eq!(updated.level, 2);
        let updated = update_stats(&store, user.id, dec!(0), dec!(0)).await.unwrap();
        assert_eq!(updated.level, 3);
    }

    #[test]
    fn exactly_on_threshold_does_not_level() {
        let mut user = crate::db::User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: "u@gmail.com".into(),
            password_hash: None,
            first_name: String::new(),
            last_name: String::new(),
            balance: Decimal::ZERO,
            total_recycled_kg: dec!(40),
            level: 1,
            join_date: time::macros::date!(2025-01-01),
            role: crate::db::Role::User,
            is_active: true,
            is_deleted: false,
            deleted_at: None,
            created_at: time::OffsetDateTime::now_utc(),
        };
        assert!(!apply_recycling(&mut user, dec!(10), dec!(10)).unwrap());
        assert_eq!(user.level, 1);
        assert!(apply_recycling(&mut user, dec!(0), dec!(0.01)).unwrap());
        assert_eq!(user.level, 2);
    }

    #[tokio::test]
    async fn oversized_amounts_are_refused_without_writing() {
        let store = MemoryStore::new();
        let user = seed_user(&store).await;

        for (balance, kg) in [
            (Decimal::MAX, Decimal::ZERO),
            (Decimal::ZERO, Decimal::MAX),
            (Decimal::MIN, Decimal::ZERO),
            (dec!(10000000000), Decimal::ZERO),
        ] {
            let err = update_stats(&store, user.id, balance, kg).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }

        // each input fits, but the running total would not
        let err = update_stats(&store, user.id, dec!(9999999999.99), Decimal::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(1000.00));
        assert_eq!(stored.level, 1);
        assert!(store.list_transactions(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = MemoryStore::new();
        let err = update_stats(&store, Uuid::new_v4(), dec!(1), dec!(1)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
