//! Turso-backed `PriceSnapshotRepository` (consumer side only; the refresh
//! job that writes `price_snapshots` is out of scope for this crate).

use async_trait::async_trait;
use turso::Value;

use crate::application::ports::{PersistenceError, PriceSnapshotRepository};
use crate::domain::price::PriceSnapshot;
use crate::domain::shared::{Amount, AssetSymbol, Network, Timestamp};

use super::db::SwapDatabase;

/// Adapter over the `price_snapshots` table.
#[derive(Debug, Clone)]
pub struct TursoPriceSnapshotRepository {
    db: SwapDatabase,
}

impl TursoPriceSnapshotRepository {
    /// Build an adapter over the given database handle.
    #[must_use]
    pub const fn new(db: SwapDatabase) -> Self {
        Self { db }
    }

    /// Write or replace a cached price snapshot. Used by tests and by the
    /// out-of-scope refresh job's integration point.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` on a query failure.
    pub async fn upsert(&self, snapshot: &PriceSnapshot) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(snapshot.asset.as_str().to_string()),
            Value::Text(snapshot.network.as_str().to_string()),
            Value::Text(snapshot.price.to_string()),
            Value::Text(snapshot.updated_at.to_rfc3339()),
            Value::Text(snapshot.expires_at.to_rfc3339()),
        ];
        conn.execute(
            "INSERT INTO price_snapshots (asset, network, price, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (asset, network) DO UPDATE SET
                price = excluded.price,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PriceSnapshotRepository for TursoPriceSnapshotRepository {
    async fn get(&self, asset: &AssetSymbol, network: &Network) -> Result<Option<PriceSnapshot>, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(asset.as_str().to_string()), Value::Text(network.as_str().to_string())];
        let mut rows = conn
            .query(
                "SELECT asset, network, price, updated_at, expires_at FROM price_snapshots WHERE asset = ? AND network = ?",
                params,
            )
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? else {
            return Ok(None);
        };
        let decode = |msg: &str| move |e: turso::Error| PersistenceError::Decode(format!("{msg}: {e}"));
        let price: String = row.get(2).map_err(decode("price"))?;
        let updated_at: String = row.get(3).map_err(decode("updated_at"))?;
        let expires_at: String = row.get(4).map_err(decode("expires_at"))?;

        Ok(Some(PriceSnapshot {
            asset: AssetSymbol::new(row.get::<String>(0).map_err(decode("asset"))?),
            network: Network::new(row.get::<String>(1).map_err(decode("network"))?),
            price: Amount::parse(&price).map_err(|e| PersistenceError::Decode(format!("price: {e}")))?,
            updated_at: Timestamp::parse(&updated_at)
                .map_err(|e| PersistenceError::Decode(format!("updated_at: {e}")))?,
            expires_at: Timestamp::parse(&expires_at)
                .map_err(|e| PersistenceError::Decode(format!("expires_at: {e}")))?,
        }))
    }
}
