//! Turso-backed `LimitOrderRepository`.

use async_trait::async_trait;
use turso::{Row, Value};

use crate::application::ports::{LimitOrderRepository, PersistenceError};
use crate::domain::limit_order::{Condition, LimitOrder, LimitOrderStatus};
use crate::domain::shared::{Amount, AssetSymbol, ExternalOrderId, LimitOrderId, Network, Timestamp, UserId};

use super::db::SwapDatabase;

/// Adapter over the `limit_orders` table.
#[derive(Debug, Clone)]
pub struct TursoLimitOrderRepository {
    db: SwapDatabase,
}

impl TursoLimitOrderRepository {
    /// Build an adapter over the given database handle.
    #[must_use]
    pub const fn new(db: SwapDatabase) -> Self {
        Self { db }
    }
}

fn condition_to_str(condition: Condition) -> &'static str {
    match condition {
        Condition::Above => "above",
        Condition::Below => "below",
    }
}

fn condition_from_str(raw: &str) -> Result<Condition, PersistenceError> {
    match raw {
        "above" => Ok(Condition::Above),
        "below" => Ok(Condition::Below),
        other => Err(PersistenceError::Decode(format!("unknown condition: {other}"))),
    }
}

fn status_to_str(status: LimitOrderStatus) -> &'static str {
    match status {
        LimitOrderStatus::Armed => "armed",
        LimitOrderStatus::Triggered => "triggered",
        LimitOrderStatus::Executing => "executing",
        LimitOrderStatus::Settled => "settled",
        LimitOrderStatus::Failed => "failed",
        LimitOrderStatus::Dead => "dead",
    }
}

fn status_from_str(raw: &str) -> Result<LimitOrderStatus, PersistenceError> {
    match raw {
        "armed" => Ok(LimitOrderStatus::Armed),
        "triggered" => Ok(LimitOrderStatus::Triggered),
        "executing" => Ok(LimitOrderStatus::Executing),
        "settled" => Ok(LimitOrderStatus::Settled),
        "failed" => Ok(LimitOrderStatus::Failed),
        "dead" => Ok(LimitOrderStatus::Dead),
        other => Err(PersistenceError::Decode(format!("unknown limit order status: {other}"))),
    }
}

fn row_to_limit_order(row: &Row) -> Result<LimitOrder, PersistenceError> {
    let decode = |msg: &str| move |e: turso::Error| PersistenceError::Decode(format!("{msg}: {e}"));
    let amount: String = row.get(6).map_err(decode("amount"))?;
    let target_price: String = row.get(7).map_err(decode("target_price"))?;
    let condition: String = row.get(8).map_err(decode("condition"))?;
    let status: String = row.get(11).map_err(decode("status"))?;
    let retry_count: i64 = row.get(12).map_err(decode("retry_count"))?;
    let retry_after: Option<String> = row.get(13).map_err(decode("retry_after"))?;
    let spawned_order_id: Option<String> = row.get(15).map_err(decode("spawned_order_id"))?;

    Ok(LimitOrder {
        id: LimitOrderId::new(row.get::<String>(0).map_err(decode("id"))?),
        user_id: UserId::new(row.get::<String>(1).map_err(decode("user_id"))?),
        source_asset: AssetSymbol::new(row.get::<String>(2).map_err(decode("source_asset"))?),
        source_network: Network::new(row.get::<String>(3).map_err(decode("source_network"))?),
        destination_asset: AssetSymbol::new(row.get::<String>(4).map_err(decode("destination_asset"))?),
        destination_network: Network::new(row.get::<String>(5).map_err(decode("destination_network"))?),
        amount: Amount::parse(&amount).map_err(|e| PersistenceError::Decode(format!("amount: {e}")))?,
        target_price: Amount::parse(&target_price)
            .map_err(|e| PersistenceError::Decode(format!("target_price: {e}")))?,
        condition: condition_from_str(&condition)?,
        reference_asset: AssetSymbol::new(row.get::<String>(9).map_err(decode("reference_asset"))?),
        reference_network: Network::new(row.get::<String>(10).map_err(decode("reference_network"))?),
        status: status_from_str(&status)?,
        retry_count: u32::try_from(retry_count).map_err(|e| PersistenceError::Decode(format!("retry_count: {e}")))?,
        retry_after: retry_after
            .map(|s| Timestamp::parse(&s))
            .transpose()
            .map_err(|e| PersistenceError::Decode(format!("retry_after: {e}")))?,
        last_error: row.get::<Option<String>>(14).map_err(decode("last_error"))?,
        spawned_order_id: spawned_order_id.map(ExternalOrderId::new),
    })
}

#[async_trait]
impl LimitOrderRepository for TursoLimitOrderRepository {
    async fn list_eligible(&self, now: Timestamp) -> Result<Vec<LimitOrder>, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(now.to_rfc3339())];
        let mut rows = conn
            .query(
                "SELECT id, user_id, source_asset, source_network, destination_asset, destination_network,
                    amount, target_price, condition, reference_asset, reference_network,
                    status, retry_count, retry_after, last_error, spawned_order_id
                 FROM limit_orders
                 WHERE status = 'armed' AND (retry_after IS NULL OR retry_after <= ?)",
                params,
            )
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let mut orders = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            orders.push(row_to_limit_order(&row)?);
        }
        tracing::debug!(count = orders.len(), "loaded eligible limit orders");
        Ok(orders)
    }

    async fn save(&self, limit_order: &LimitOrder) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(limit_order.id.as_str().to_string()),
            Value::Text(limit_order.user_id.as_str().to_string()),
            Value::Text(limit_order.source_asset.as_str().to_string()),
            Value::Text(limit_order.source_network.as_str().to_string()),
            Value::Text(limit_order.destination_asset.as_str().to_string()),
            Value::Text(limit_order.destination_network.as_str().to_string()),
            Value::Text(limit_order.amount.to_string()),
            Value::Text(limit_order.target_price.to_string()),
            Value::Text(condition_to_str(limit_order.condition).to_string()),
            Value::Text(limit_order.reference_asset.as_str().to_string()),
            Value::Text(limit_order.reference_network.as_str().to_string()),
            Value::Text(status_to_str(limit_order.status).to_string()),
            Value::Integer(i64::from(limit_order.retry_count)),
            limit_order.retry_after.map_or(Value::Null, |t| Value::Text(t.to_rfc3339())),
            limit_order.last_error.clone().map_or(Value::Null, Value::Text),
            limit_order.spawned_order_id.as_ref().map_or(Value::Null, |id| Value::Text(id.as_str().to_string())),
        ];
        conn.execute(
            "INSERT INTO limit_orders (
                id, user_id, source_asset, source_network, destination_asset, destination_network,
                amount, target_price, condition, reference_asset, reference_network,
                status, retry_count, retry_after, last_error, spawned_order_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                retry_count = excluded.retry_count,
                retry_after = excluded.retry_after,
                last_error = excluded.last_error,
                spawned_order_id = excluded.spawned_order_id",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_by_spawned_order(&self, order_id: &ExternalOrderId) -> Result<Option<LimitOrder>, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(order_id.as_str().to_string())];
        let mut rows = conn
            .query(
                "SELECT id, user_id, source_asset, source_network, destination_asset, destination_network,
                    amount, target_price, condition, reference_asset, reference_network,
                    status, retry_count, retry_after, last_error, spawned_order_id
                 FROM limit_orders
                 WHERE spawned_order_id = ?",
                params,
            )
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        match rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            Some(row) => Ok(Some(row_to_limit_order(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(id: &str, status: LimitOrderStatus, retry_after: Option<Timestamp>) -> LimitOrder {
        LimitOrder {
            id: LimitOrderId::new(id),
            user_id: UserId::new("u-1"),
            source_asset: AssetSymbol::new("USDC"),
            source_network: Network::new("polygon"),
            destination_asset: AssetSymbol::new("ETH"),
            destination_network: Network::new("ethereum"),
            amount: Amount::from(dec!(100)),
            target_price: Amount::from(dec!(2000)),
            condition: Condition::Below,
            reference_asset: AssetSymbol::new("ETH"),
            reference_network: Network::new("ethereum"),
            status,
            retry_count: 0,
            retry_after,
            last_error: None,
            spawned_order_id: None,
        }
    }

    #[tokio::test]
    async fn save_then_list_eligible_roundtrips() {
        let repo = TursoLimitOrderRepository::new(SwapDatabase::new_in_memory().await.unwrap());
        repo.save(&order("lo-1", LimitOrderStatus::Armed, None)).await.unwrap();
        let eligible = repo.list_eligible(Timestamp::now()).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id.as_str(), "lo-1");
    }

    #[tokio::test]
    async fn list_eligible_excludes_future_retry_after() {
        let repo = TursoLimitOrderRepository::new(SwapDatabase::new_in_memory().await.unwrap());
        let future = Timestamp::from(chrono::Utc::now() + chrono::Duration::minutes(5));
        repo.save(&order("lo-1", LimitOrderStatus::Armed, Some(future))).await.unwrap();
        let eligible = repo.list_eligible(Timestamp::now()).await.unwrap();
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn list_eligible_excludes_non_armed() {
        let repo = TursoLimitOrderRepository::new(SwapDatabase::new_in_memory().await.unwrap());
        repo.save(&order("lo-1", LimitOrderStatus::Dead, None)).await.unwrap();
        let eligible = repo.list_eligible(Timestamp::now()).await.unwrap();
        assert!(eligible.is_empty());
    }

    #[tokio::test]
    async fn save_upserts_on_conflict() {
        let repo = TursoLimitOrderRepository::new(SwapDatabase::new_in_memory().await.unwrap());
        repo.save(&order("lo-1", LimitOrderStatus::Armed, None)).await.unwrap();
        let mut updated = order("lo-1", LimitOrderStatus::Dead, None);
        updated.retry_count = 5;
        repo.save(&updated).await.unwrap();

        let eligible = repo.list_eligible(Timestamp::now()).await.unwrap();
        assert!(eligible.is_empty());
    }
}
