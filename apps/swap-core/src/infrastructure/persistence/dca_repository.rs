//! Turso-backed `DcaPlanRepository`.
//!
//! SQLite/Turso has no row-level `SELECT ... FOR UPDATE SKIP LOCKED`. The
//! claim step instead opens a `BEGIN IMMEDIATE` transaction (exclusive write
//! lock acquired up front) and runs an atomic `UPDATE ... RETURNING` that
//! both claims and locks every due row in one statement: once it commits, no
//! other connection can see those rows as due until their
//! `next_execution_at` is advanced again.

use async_trait::async_trait;
use turso::Value;

use crate::application::ports::{DcaPlanRepository, PersistenceError};
use crate::domain::dca::DcaPlan;
use crate::domain::order::{Order, OrderStatus, WatchedOrder};
use crate::domain::shared::{Amount, AssetSymbol, DcaPlanId, Network, Timestamp, UserId};

use super::db::SwapDatabase;
use super::order_repository::{status_from_str, status_to_str};

/// Adapter over the `dca_plans` table.
#[derive(Debug, Clone)]
pub struct TursoDcaPlanRepository {
    db: SwapDatabase,
}

impl TursoDcaPlanRepository {
    /// Build an adapter over the given database handle.
    #[must_use]
    pub const fn new(db: SwapDatabase) -> Self {
        Self { db }
    }
}

fn row_to_plan(row: &turso::Row) -> Result<DcaPlan, PersistenceError> {
    let decode = |msg: &str| move |e: turso::Error| PersistenceError::Decode(format!("{msg}: {e}"));
    let amount: String = row.get(6).map_err(decode("amount_per_execution"))?;
    let interval_hours: i64 = row.get(7).map_err(decode("interval_hours"))?;
    let next_execution_at: String = row.get(8).map_err(decode("next_execution_at"))?;
    let is_active: i64 = row.get(9).map_err(decode("is_active"))?;
    let executed_count: i64 = row.get(10).map_err(decode("executed_count"))?;

    Ok(DcaPlan {
        id: DcaPlanId::new(row.get::<String>(0).map_err(decode("id"))?),
        user_id: UserId::new(row.get::<String>(1).map_err(decode("user_id"))?),
        source_asset: AssetSymbol::new(row.get::<String>(2).map_err(decode("source_asset"))?),
        source_network: Network::new(row.get::<String>(3).map_err(decode("source_network"))?),
        destination_asset: AssetSymbol::new(row.get::<String>(4).map_err(decode("destination_asset"))?),
        destination_network: Network::new(row.get::<String>(5).map_err(decode("destination_network"))?),
        amount_per_execution: Amount::parse(&amount)
            .map_err(|e| PersistenceError::Decode(format!("amount_per_execution: {e}")))?,
        interval_hours: u32::try_from(interval_hours)
            .map_err(|e| PersistenceError::Decode(format!("interval_hours: {e}")))?,
        next_execution_at: Timestamp::parse(&next_execution_at)
            .map_err(|e| PersistenceError::Decode(format!("next_execution_at: {e}")))?,
        is_active: is_active != 0,
        executed_count: u64::try_from(executed_count)
            .map_err(|e| PersistenceError::Decode(format!("executed_count: {e}")))?,
    })
}

#[async_trait]
impl DcaPlanRepository for TursoDcaPlanRepository {
    async fn claim_due(
        &self,
        now: Timestamp,
        max_processing_time: chrono::Duration,
    ) -> Result<Vec<DcaPlan>, PersistenceError> {
        let conn = self.db.connect()?;
        let sentinel = DcaPlan::lock_sentinel(now, max_processing_time);

        conn.execute_batch("BEGIN IMMEDIATE")
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let params: Vec<Value> = vec![
            Value::Text(sentinel.to_rfc3339()),
            Value::Text(now.to_rfc3339()),
        ];
        let result = conn
            .query(
                "UPDATE dca_plans
                 SET next_execution_at = ?
                 WHERE is_active = 1 AND next_execution_at <= ?
                 RETURNING id, user_id, source_asset, source_network, destination_asset,
                    destination_network, amount_per_execution, interval_hours,
                    next_execution_at, is_active, executed_count",
                params,
            )
            .await;

        let mut rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK").await;
                return Err(PersistenceError::Database(e.to_string()));
            }
        };

        let mut claimed = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => match row_to_plan(&row) {
                    Ok(mut plan) => {
                        // the returned row carries the lock sentinel already committed; reflect
                        // that in the value handed back to the caller.
                        plan.next_execution_at = sentinel;
                        claimed.push(plan);
                    }
                    Err(e) => {
                        let _ = conn.execute_batch("ROLLBACK").await;
                        return Err(e);
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK").await;
                    return Err(PersistenceError::Database(e.to_string()));
                }
            }
        }
        drop(rows);

        conn.execute_batch("COMMIT")
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        tracing::info!(count = claimed.len(), "claimed due dca plans");
        Ok(claimed)
    }

    async fn record_execution(
        &self,
        plan_id: &DcaPlanId,
        order: &Order,
        watched: &WatchedOrder,
        next_execution_at: Timestamp,
    ) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let order_result = conn
            .execute(
                "INSERT INTO orders (
                    external_order_id, user_id, source_asset, source_network, source_amount,
                    destination_asset, destination_network, expected_settle_amount,
                    deposit_address, deposit_memo, status, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                vec![
                    Value::Text(order.external_order_id.as_str().to_string()),
                    Value::Text(order.user_id.as_str().to_string()),
                    Value::Text(order.source_asset.as_str().to_string()),
                    Value::Text(order.source_network.as_str().to_string()),
                    Value::Text(order.source_amount.to_string()),
                    Value::Text(order.destination_asset.as_str().to_string()),
                    Value::Text(order.destination_network.as_str().to_string()),
                    Value::Text(order.expected_settle_amount.to_string()),
                    Value::Text(order.deposit_address.clone()),
                    order.deposit_memo.clone().map_or(Value::Null, Value::Text),
                    Value::Text(status_to_str(order.status).to_string()),
                    Value::Text(order.created_at.to_rfc3339()),
                    Value::Text(order.updated_at.to_rfc3339()),
                ],
            )
            .await;
        if let Err(e) = order_result {
            let _ = conn.execute_batch("ROLLBACK").await;
            return Err(PersistenceError::Database(e.to_string()));
        }

        let watched_result = conn
            .execute(
                "INSERT INTO watched_orders (external_order_id, user_id, last_status, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (external_order_id) DO NOTHING",
                vec![
                    Value::Text(watched.external_order_id.as_str().to_string()),
                    Value::Text(watched.user_id.as_str().to_string()),
                    Value::Text(status_to_str(watched.last_status).to_string()),
                    Value::Text(watched.created_at.to_rfc3339()),
                ],
            )
            .await;
        if let Err(e) = watched_result {
            let _ = conn.execute_batch("ROLLBACK").await;
            return Err(PersistenceError::Database(e.to_string()));
        }

        let plan_result = conn
            .execute(
                "UPDATE dca_plans
                 SET next_execution_at = ?, executed_count = executed_count + 1
                 WHERE id = ?",
                vec![Value::Text(next_execution_at.to_rfc3339()), Value::Text(plan_id.as_str().to_string())],
            )
            .await;
        if let Err(e) = plan_result {
            let _ = conn.execute_batch("ROLLBACK").await;
            return Err(PersistenceError::Database(e.to_string()));
        }

        conn.execute_batch("COMMIT")
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        tracing::debug!(plan_id = %plan_id, order_id = %order.external_order_id, "dca execution recorded");
        Ok(())
    }

    async fn reschedule(&self, plan_id: &DcaPlanId, next_execution_at: Timestamp) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(next_execution_at.to_rfc3339()), Value::Text(plan_id.as_str().to_string())];
        conn.execute("UPDATE dca_plans SET next_execution_at = ? WHERE id = ?", params)
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Insert helper used only by tests and seed scripts in this module — the
/// repository trait intentionally has no general-purpose "insert plan"
/// method, since plan creation belongs to the (out-of-scope) chat/NL intent
/// surface, not this core.
#[cfg(test)]
async fn insert_plan(db: &SwapDatabase, plan: &DcaPlan) -> Result<(), PersistenceError> {
    let conn = db.connect()?;
    let params: Vec<Value> = vec![
        Value::Text(plan.id.as_str().to_string()),
        Value::Text(plan.user_id.as_str().to_string()),
        Value::Text(plan.source_asset.as_str().to_string()),
        Value::Text(plan.source_network.as_str().to_string()),
        Value::Text(plan.destination_asset.as_str().to_string()),
        Value::Text(plan.destination_network.as_str().to_string()),
        Value::Text(plan.amount_per_execution.to_string()),
        Value::Integer(i64::from(plan.interval_hours)),
        Value::Text(plan.next_execution_at.to_rfc3339()),
        Value::Integer(i64::from(plan.is_active)),
        Value::Integer(i64::try_from(plan.executed_count).unwrap_or(i64::MAX)),
    ];
    conn.execute(
        "INSERT INTO dca_plans (
            id, user_id, source_asset, source_network, destination_asset, destination_network,
            amount_per_execution, interval_hours, next_execution_at, is_active, executed_count
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params,
    )
    .await
    .map_err(|e| PersistenceError::Database(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn plan(id: &str, next_execution_at: Timestamp) -> DcaPlan {
        DcaPlan {
            id: DcaPlanId::new(id),
            user_id: UserId::new("u-1"),
            source_asset: AssetSymbol::new("USDC"),
            source_network: Network::new("polygon"),
            destination_asset: AssetSymbol::new("ETH"),
            destination_network: Network::new("ethereum"),
            amount_per_execution: Amount::from(dec!(100)),
            interval_hours: 24,
            next_execution_at,
            is_active: true,
            executed_count: 0,
        }
    }

    fn order_for(plan_id: &str) -> Order {
        Order {
            external_order_id: crate::domain::shared::ExternalOrderId::new(format!("ssx-{plan_id}")),
            user_id: UserId::new("u-1"),
            source_asset: AssetSymbol::new("USDC"),
            source_network: Network::new("polygon"),
            source_amount: Amount::from(dec!(100)),
            destination_asset: AssetSymbol::new("ETH"),
            destination_network: Network::new("ethereum"),
            expected_settle_amount: Amount::from(dec!(0.05)),
            deposit_address: "0xabc".to_string(),
            deposit_memo: None,
            status: OrderStatus::Pending,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn claim_due_only_claims_past_due_active_plans() {
        let db = SwapDatabase::new_in_memory().await.unwrap();
        let repo = TursoDcaPlanRepository::new(db.clone());
        let past = Timestamp::from(chrono::Utc::now() - chrono::Duration::seconds(1));
        let future = Timestamp::from(chrono::Utc::now() + chrono::Duration::hours(1));

        insert_plan(&db, &plan("due", past)).await.unwrap();
        insert_plan(&db, &plan("not-due", future)).await.unwrap();

        let claimed = repo.claim_due(Timestamp::now(), chrono::Duration::minutes(10)).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id.as_str(), "due");
    }

    #[tokio::test]
    async fn claim_due_is_not_reclaimed_until_sentinel_elapses() {
        let db = SwapDatabase::new_in_memory().await.unwrap();
        let repo = TursoDcaPlanRepository::new(db.clone());
        let past = Timestamp::from(chrono::Utc::now() - chrono::Duration::seconds(1));
        insert_plan(&db, &plan("due", past)).await.unwrap();

        let now = Timestamp::now();
        let first = repo.claim_due(now, chrono::Duration::minutes(10)).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = repo.claim_due(now, chrono::Duration::minutes(10)).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn record_execution_inserts_order_watched_and_advances_plan() {
        let db = SwapDatabase::new_in_memory().await.unwrap();
        let repo = TursoDcaPlanRepository::new(db.clone());
        let past = Timestamp::from(chrono::Utc::now() - chrono::Duration::seconds(1));
        insert_plan(&db, &plan("p1", past)).await.unwrap();

        let order = order_for("p1");
        let watched = WatchedOrder {
            external_order_id: order.external_order_id.clone(),
            user_id: order.user_id.clone(),
            last_status: order.status,
            created_at: order.created_at,
        };
        let next = Timestamp::from(chrono::Utc::now() + chrono::Duration::hours(24));
        repo.record_execution(&DcaPlanId::new("p1"), &order, &watched, next).await.unwrap();

        let order_repo = super::super::order_repository::TursoOrderRepository::new(db);
        let fetched = crate::application::ports::OrderRepository::get(&order_repo, &order.external_order_id)
            .await
            .unwrap();
        assert!(fetched.is_some());
    }
}
