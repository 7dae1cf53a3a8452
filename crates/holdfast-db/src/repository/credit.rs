//! # Credit Repository
//!
//! Retry-credit ("hearts") balances.
//!
//! Checkout reads the balance to size the reservation; the sweeper takes
//! one heart per expired order. Replenishment happens elsewhere and goes
//! through [`CreditRepository::set_balance`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::SqliteTx;
use crate::error::DbResult;
use holdfast_core::{CreditPolicy, CustomerCredit};

/// Result of an expiry penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Penalty {
    /// Balance decremented to the given value.
    Applied { balance: i64 },
    /// Balance already at the floor; left unchanged.
    AtFloor { balance: i64 },
    /// No credit row for the customer.
    NoAccount,
}

/// Repository for customer credit balances.
#[derive(Debug, Clone)]
pub struct CreditRepository {
    pool: SqlitePool,
}

impl CreditRepository {
    /// Creates a new CreditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CreditRepository { pool }
    }

    /// Creates or replaces a customer's balance.
    pub async fn set_balance(&self, user_id: &str, balance: i64) -> DbResult<()> {
        debug!(user_id = %user_id, balance, "Setting credit balance");

        sqlx::query(
            r#"
            INSERT INTO customer_credits (user_id, balance, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                balance = excluded.balance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(balance)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Current balance, or `None` if the customer has no credit row.
    pub async fn balance(&self, user_id: &str) -> DbResult<Option<i64>> {
        let balance = sqlx::query_scalar::<_, i64>(
            "SELECT balance FROM customer_credits WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance)
    }

    /// Full credit row.
    pub async fn get(&self, user_id: &str) -> DbResult<Option<CustomerCredit>> {
        let credit = sqlx::query_as::<_, CustomerCredit>(
            "SELECT user_id, balance, updated_at FROM customer_credits WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credit)
    }

    /// Reads the balance through a no-op write.
    ///
    /// Used as the first statement of checkout so the transaction holds the
    /// write lock from the start and the balance cannot change underneath it.
    pub async fn lock_balance(&self, tx: &mut SqliteTx<'_>, user_id: &str) -> DbResult<Option<i64>> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE customer_credits SET balance = balance
            WHERE user_id = ?1
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(balance)
    }

    /// Takes one heart as `policy` prescribes.
    ///
    /// The new balance comes from [`CreditPolicy::penalized`]; a balance the
    /// policy leaves unchanged is reported as `AtFloor` and not written.
    pub async fn penalize(
        &self,
        tx: &mut SqliteTx<'_>,
        user_id: &str,
        policy: &CreditPolicy,
        now: DateTime<Utc>,
    ) -> DbResult<Penalty> {
        let Some(balance) = self.lock_balance(tx, user_id).await? else {
            return Ok(Penalty::NoAccount);
        };

        let penalized = policy.penalized(balance);
        if penalized == balance {
            return Ok(Penalty::AtFloor { balance });
        }

        sqlx::query("UPDATE customer_credits SET balance = ?2, updated_at = ?3 WHERE user_id = ?1")
            .bind(user_id)
            .bind(penalized)
            .bind(now)
            .execute(&mut **tx)
            .await?;

        debug!(user_id = %user_id, from = balance, to = penalized, "Credit penalized");
        Ok(Penalty::Applied { balance: penalized })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_set_and_read_balance() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let credits = db.credits();

        assert_eq!(credits.balance("u-1").await.unwrap(), None);
        credits.set_balance("u-1", 3).await.unwrap();
        credits.set_balance("u-1", 2).await.unwrap();

        assert_eq!(credits.balance("u-1").await.unwrap(), Some(2));
        assert_eq!(credits.get("u-1").await.unwrap().unwrap().balance, 2);
    }

    #[tokio::test]
    async fn test_penalize_clamps_at_floor() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let credits = db.credits();
        credits.set_balance("u-1", 1).await.unwrap();

        let policy = CreditPolicy::default();
        let mut tx = db.pool().begin().await.unwrap();
        let first = credits.penalize(&mut tx, "u-1", &policy, Utc::now()).await.unwrap();
        let second = credits.penalize(&mut tx, "u-1", &policy, Utc::now()).await.unwrap();
        let missing = credits.penalize(&mut tx, "nobody", &policy, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, Penalty::Applied { balance: 0 });
        assert_eq!(second, Penalty::AtFloor { balance: 0 });
        assert_eq!(missing, Penalty::NoAccount);
        assert_eq!(credits.balance("u-1").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_lock_balance() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.credits().set_balance("u-1", 3).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        assert_eq!(db.credits().lock_balance(&mut tx, "u-1").await.unwrap(), Some(3));
        assert_eq!(db.credits().lock_balance(&mut tx, "u-2").await.unwrap(), None);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_penalize_follows_configured_floor() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let credits = db.credits();
        credits.set_balance("u-1", 2).await.unwrap();

        let policy = CreditPolicy {
            floor: 1,
            ..CreditPolicy::default()
        };

        let mut tx = db.pool().begin().await.unwrap();
        let first = credits.penalize(&mut tx, "u-1", &policy, Utc::now()).await.unwrap();
        let second = credits.penalize(&mut tx, "u-1", &policy, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, Penalty::Applied { balance: policy.penalized(2) });
        assert_eq!(second, Penalty::AtFloor { balance: 1 });
        assert_eq!(credits.balance("u-1").await.unwrap(), Some(1));
    }
}
