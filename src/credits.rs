//! CreditLedger: balance reads, the guard-before-work/decrement-after
//! contract, idempotent trial grant, and purchase recording.

use crate::config;
use crate::error::CoreError;
use crate::store;
use sqlx::SqlitePool;

pub async fn balance(pool: &SqlitePool, user_id: &str) -> Result<i64, CoreError> {
    Ok(store::get_credits(pool, user_id).await?)
}

/// Guards a query: `Ok(())` if the user has credits, `CreditExhausted`
/// otherwise. Callers must not touch the external provider on the error
/// path.
pub async fn guard(pool: &SqlitePool, user_id: &str) -> Result<(), CoreError> {
    if store::has_credits(pool, user_id).await? {
        Ok(())
    } else {
        Err(CoreError::CreditExhausted)
    }
}

/// Idempotent one-time trial grant.
pub async fn grant_trial(pool: &SqlitePool, user_id: &str) -> Result<i64, CoreError> {
    Ok(store::set_trial_credits(pool, user_id, config::TRIAL_CREDITS).await?)
}

/// Decrements by one after a successful query. Failures are logged, never
/// surfaced — at worst the user gets a free query.
pub async fn spend(pool: &SqlitePool, user_id: &str) {
    if let Err(err) = store::dec_credits(pool, user_id).await {
        tracing::warn!(user_id, ?err, "failed to decrement credits after a successful query");
    }
}

pub const PRODUCT_CREDITS_20: &str = "credits.20";
pub const PRODUCT_CREDITS_50: &str = "credits.50";
pub const PRODUCT_CREDITS_200: &str = "credits.200";

/// Fixed product-id -> credit-amount table.
pub fn credits_for_product(product_id: &str) -> Option<i64> {
    match product_id {
        PRODUCT_CREDITS_20 => Some(20),
        PRODUCT_CREDITS_50 => Some(50),
        PRODUCT_CREDITS_200 => Some(200),
        _ => None,
    }
}

/// Appends a Purchase row keyed on the Apple transaction id and increments
/// the balance, but only the first time that transaction id is seen —
/// replaying the same verified receipt does not grant credits twice.
pub async fn record_purchase(
    pool: &SqlitePool,
    user_id: &str,
    credits: i64,
    transaction_id: &str,
) -> Result<(), CoreError> {
    if store::insert_purchase(pool, user_id, credits, transaction_id).await? {
        store::inc_credits(pool, user_id, credits).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[test]
    fn known_products_map_to_credit_amounts() {
        assert_eq!(credits_for_product(PRODUCT_CREDITS_20), Some(20));
        assert_eq!(credits_for_product(PRODUCT_CREDITS_50), Some(50));
        assert_eq!(credits_for_product(PRODUCT_CREDITS_200), Some(200));
        assert_eq!(credits_for_product("credits.9999"), None);
    }

    #[tokio::test]
    async fn guard_fails_closed_for_unknown_user() {
        let pool = test_pool().await;
        assert!(matches!(
            guard(&pool, "nobody").await,
            Err(CoreError::CreditExhausted)
        ));
    }

    #[tokio::test]
    async fn purchase_increments_balance_and_logs_it() {
        let pool = test_pool().await;
        record_purchase(&pool, "alice", 20, "txn-1").await.unwrap();
        assert_eq!(balance(&pool, "alice").await.unwrap(), 20);

        let purchases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases WHERE user_id = ?")
            .bind("alice")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(purchases, 1);
    }

    #[tokio::test]
    async fn replaying_the_same_transaction_id_does_not_double_credit() {
        let pool = test_pool().await;
        record_purchase(&pool, "alice", 20, "txn-1").await.unwrap();
        record_purchase(&pool, "alice", 20, "txn-1").await.unwrap();
        assert_eq!(balance(&pool, "alice").await.unwrap(), 20);

        let purchases: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchases WHERE user_id = ?")
            .bind("alice")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(purchases, 1);
    }
}
