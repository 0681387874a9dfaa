//! Turso-backed `OrderRepository`, `WatchedOrderRepository`, and
//! `StatusLogRepository` adapters.
//!
//! Grounded on `execution::persistence::StatePersistence::{save_order,
//! load_active_orders, row_to_order_snapshot}`: decimal/timestamp columns
//! round-tripped through `TEXT`, one connection per operation.

use async_trait::async_trait;
use turso::{Row, Value};

use crate::application::ports::{OrderRepository, PersistenceError, StatusLogRepository, WatchedOrderRepository};
use crate::domain::order::{Order, OrderStatus, StatusLogEntry, WatchedOrder};
use crate::domain::shared::{Amount, AssetSymbol, ExternalOrderId, Network, Timestamp, UserId};

use super::db::SwapDatabase;

/// Adapter over the `orders`, `watched_orders`, and `status_log` tables.
#[derive(Debug, Clone)]
pub struct TursoOrderRepository {
    db: SwapDatabase,
}

impl TursoOrderRepository {
    /// Build an adapter over the given database handle.
    #[must_use]
    pub const fn new(db: SwapDatabase) -> Self {
        Self { db }
    }

    /// A user's orders, newest first, for the `GET /api/swap-history`
    /// boundary endpoint (spec §6). Not part of `OrderRepository` itself,
    /// since the tick-loop components never need to page through a single
    /// user's history.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` on a query failure.
    pub async fn list_by_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<Order>, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(user_id.as_str().to_string()), Value::Integer(i64::from(limit))];
        let mut rows = conn
            .query(
                "SELECT external_order_id, user_id, source_asset, source_network, source_amount,
                    destination_asset, destination_network, expected_settle_amount,
                    deposit_address, deposit_memo, status, created_at, updated_at
                 FROM orders WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
                params,
            )
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let mut orders = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            orders.push(row_to_order(&row)?);
        }
        Ok(orders)
    }
}

pub(super) fn status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Waiting => "waiting",
        OrderStatus::Processing => "processing",
        OrderStatus::Settled => "settled",
        OrderStatus::Refunded => "refunded",
        OrderStatus::Failed => "failed",
        OrderStatus::Expired => "expired",
    }
}

pub(super) fn status_from_str(raw: &str) -> Result<OrderStatus, PersistenceError> {
    match raw {
        "pending" => Ok(OrderStatus::Pending),
        "waiting" => Ok(OrderStatus::Waiting),
        "processing" => Ok(OrderStatus::Processing),
        "settled" => Ok(OrderStatus::Settled),
        "refunded" => Ok(OrderStatus::Refunded),
        "failed" => Ok(OrderStatus::Failed),
        "expired" => Ok(OrderStatus::Expired),
        other => Err(PersistenceError::Decode(format!("unknown order status: {other}"))),
    }
}

fn row_to_order(row: &Row) -> Result<Order, PersistenceError> {
    let decode = |msg: &str| move |e: turso::Error| PersistenceError::Decode(format!("{msg}: {e}"));
    let source_amount: String = row.get(4).map_err(decode("source_amount"))?;
    let expected_settle_amount: String = row.get(7).map_err(decode("expected_settle_amount"))?;
    let status: String = row.get(10).map_err(decode("status"))?;
    let created_at: String = row.get(11).map_err(decode("created_at"))?;
    let updated_at: String = row.get(12).map_err(decode("updated_at"))?;

    Ok(Order {
        external_order_id: ExternalOrderId::new(row.get::<String>(0).map_err(decode("external_order_id"))?),
        user_id: UserId::new(row.get::<String>(1).map_err(decode("user_id"))?),
        source_asset: AssetSymbol::new(row.get::<String>(2).map_err(decode("source_asset"))?),
        source_network: Network::new(row.get::<String>(3).map_err(decode("source_network"))?),
        source_amount: Amount::parse(&source_amount)
            .map_err(|e| PersistenceError::Decode(format!("source_amount: {e}")))?,
        destination_asset: AssetSymbol::new(row.get::<String>(5).map_err(decode("destination_asset"))?),
        destination_network: Network::new(row.get::<String>(6).map_err(decode("destination_network"))?),
        expected_settle_amount: Amount::parse(&expected_settle_amount)
            .map_err(|e| PersistenceError::Decode(format!("expected_settle_amount: {e}")))?,
        deposit_address: row.get(8).map_err(decode("deposit_address"))?,
        deposit_memo: row.get::<Option<String>>(9).map_err(decode("deposit_memo"))?,
        status: status_from_str(&status)?,
        created_at: Timestamp::parse(&created_at).map_err(|e| PersistenceError::Decode(format!("created_at: {e}")))?,
        updated_at: Timestamp::parse(&updated_at).map_err(|e| PersistenceError::Decode(format!("updated_at: {e}")))?,
    })
}

#[async_trait]
impl OrderRepository for TursoOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
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
        ];
        conn.execute(
            "INSERT INTO orders (
                external_order_id, user_id, source_asset, source_network, source_amount,
                destination_asset, destination_network, expected_settle_amount,
                deposit_address, deposit_memo, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        tracing::debug!(order_id = %order.external_order_id, "order inserted");
        Ok(())
    }

    async fn get(&self, id: &ExternalOrderId) -> Result<Option<Order>, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(id.as_str().to_string())];
        let mut rows = conn
            .query(
                "SELECT external_order_id, user_id, source_asset, source_network, source_amount,
                    destination_asset, destination_network, expected_settle_amount,
                    deposit_address, deposit_memo, status, created_at, updated_at
                 FROM orders WHERE external_order_id = ?",
                params,
            )
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        match rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            Some(row) => Ok(Some(row_to_order(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: &ExternalOrderId,
        status: OrderStatus,
        updated_at: Timestamp,
    ) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(status_to_str(status).to_string()),
            Value::Text(updated_at.to_rfc3339()),
            Value::Text(id.as_str().to_string()),
        ];
        let changed = conn
            .execute("UPDATE orders SET status = ?, updated_at = ? WHERE external_order_id = ?", params)
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    async fn list_non_terminal(&self) -> Result<Vec<Order>, PersistenceError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT external_order_id, user_id, source_asset, source_network, source_amount,
                    destination_asset, destination_network, expected_settle_amount,
                    deposit_address, deposit_memo, status, created_at, updated_at
                 FROM orders WHERE status NOT IN ('settled', 'refunded', 'failed', 'expired')",
                (),
            )
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let mut orders = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            orders.push(row_to_order(&row)?);
        }
        tracing::info!(count = orders.len(), "loaded non-terminal orders");
        Ok(orders)
    }
}

#[async_trait]
impl WatchedOrderRepository for TursoOrderRepository {
    async fn insert_if_absent(&self, watched: &WatchedOrder) -> Result<bool, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(watched.external_order_id.as_str().to_string()),
            Value::Text(watched.user_id.as_str().to_string()),
            Value::Text(status_to_str(watched.last_status).to_string()),
            Value::Text(watched.created_at.to_rfc3339()),
        ];
        let changed = conn
            .execute(
                "INSERT INTO watched_orders (external_order_id, user_id, last_status, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (external_order_id) DO NOTHING",
                params,
            )
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    async fn update_status(&self, id: &ExternalOrderId, status: OrderStatus) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(status_to_str(status).to_string()), Value::Text(id.as_str().to_string())];
        conn.execute("UPDATE watched_orders SET last_status = ? WHERE external_order_id = ?", params)
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<WatchedOrder>, PersistenceError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query("SELECT external_order_id, user_id, last_status, created_at FROM watched_orders", ())
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let mut watched = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            let decode = |msg: &str| move |e: turso::Error| PersistenceError::Decode(format!("{msg}: {e}"));
            let last_status: String = row.get(2).map_err(decode("last_status"))?;
            let created_at: String = row.get(3).map_err(decode("created_at"))?;
            watched.push(WatchedOrder {
                external_order_id: ExternalOrderId::new(row.get::<String>(0).map_err(decode("external_order_id"))?),
                user_id: UserId::new(row.get::<String>(1).map_err(decode("user_id"))?),
                last_status: status_from_str(&last_status)?,
                created_at: Timestamp::parse(&created_at)
                    .map_err(|e| PersistenceError::Decode(format!("created_at: {e}")))?,
            });
        }
        tracing::info!(count = watched.len(), "loaded watched orders");
        Ok(watched)
    }
}

#[async_trait]
impl StatusLogRepository for TursoOrderRepository {
    async fn append(&self, entry: &StatusLogEntry) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(entry.external_order_id.as_str().to_string()),
            Value::Text(status_to_str(entry.old_status).to_string()),
            Value::Text(status_to_str(entry.new_status).to_string()),
            Value::Text(entry.emitted_at.to_rfc3339()),
            Value::Text(entry.payload_fingerprint.clone()),
        ];
        conn.execute(
            "INSERT INTO status_log (external_order_id, old_status, new_status, emitted_at, payload_fingerprint)
             VALUES (?, ?, ?, ?, ?)",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }
}
