//! Turso-backed `UserDirectoryPort`, plus the minimal `user_settings` reads
//! the boundary REST API needs (spec §6, `GET /api/user/settings`).

use async_trait::async_trait;
use rust_decimal::Decimal;
use turso::Value;

use crate::application::ports::{PersistenceError, UserDirectoryPort, UserSettlementInfo};
use crate::domain::shared::UserId;

use super::db::SwapDatabase;

/// A user's slippage tolerance, stored as a fixed-point decimal fraction
/// (e.g. `0.01` for 1%), per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSettings {
    /// Slippage tolerance, as a fraction (`0.01` == 1%).
    pub slippage_tolerance: Decimal,
}

/// Adapter over the `users` and `user_settings` tables.
#[derive(Debug, Clone)]
pub struct TursoUserRepository {
    db: SwapDatabase,
}

impl TursoUserRepository {
    /// Build an adapter over the given database handle.
    #[must_use]
    pub const fn new(db: SwapDatabase) -> Self {
        Self { db }
    }

    /// Read a user's settings, if the row exists.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` on a query failure or
    /// `PersistenceError::Decode` if the stored tolerance is not a valid
    /// decimal.
    pub async fn settings(&self, user_id: &UserId) -> Result<Option<UserSettings>, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(user_id.as_str().to_string())];
        let mut rows = conn
            .query("SELECT slippage_tolerance FROM user_settings WHERE user_id = ?", params)
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? else {
            return Ok(None);
        };
        let raw: String = row
            .get(0)
            .map_err(|e| PersistenceError::Decode(format!("slippage_tolerance: {e}")))?;
        let slippage_tolerance = raw
            .parse()
            .map_err(|e| PersistenceError::Decode(format!("slippage_tolerance: {e}")))?;
        Ok(Some(UserSettings { slippage_tolerance }))
    }
}

#[async_trait]
impl UserDirectoryPort for TursoUserRepository {
    async fn settlement_info(&self, user_id: &UserId) -> Result<UserSettlementInfo, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(user_id.as_str().to_string())];
        let mut rows = conn
            .query("SELECT settlement_address, refund_address FROM users WHERE id = ?", params)
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? else {
            return Err(PersistenceError::NotFound(format!("user {user_id}")));
        };
        Ok(UserSettlementInfo {
            settlement_address: row
                .get::<Option<String>>(0)
                .map_err(|e| PersistenceError::Decode(format!("settlement_address: {e}")))?,
            refund_address: row
                .get::<Option<String>>(1)
                .map_err(|e| PersistenceError::Decode(format!("refund_address: {e}")))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(db: &SwapDatabase, id: &str, settlement: Option<&str>) {
        let conn = db.connect().unwrap();
        conn.execute(
            "INSERT INTO users (id, settlement_address, refund_address) VALUES (?, ?, ?)",
            vec![
                Value::Text(id.to_string()),
                settlement.map_or(Value::Null, |s| Value::Text(s.to_string())),
                Value::Null,
            ],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn settlement_info_missing_user_errors() {
        let repo = TursoUserRepository::new(SwapDatabase::new_in_memory().await.unwrap());
        assert!(repo.settlement_info(&UserId::new("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn settlement_info_returns_addresses() {
        let db = SwapDatabase::new_in_memory().await.unwrap();
        seed_user(&db, "u-1", Some("0xabc")).await;
        let repo = TursoUserRepository::new(db);
        let info = repo.settlement_info(&UserId::new("u-1")).await.unwrap();
        assert_eq!(info.settlement_address.as_deref(), Some("0xabc"));
        assert!(info.refund_address.is_none());
    }

    #[tokio::test]
    async fn settings_missing_row_returns_none() {
        let repo = TursoUserRepository::new(SwapDatabase::new_in_memory().await.unwrap());
        assert!(repo.settings(&UserId::new("u-1")).await.unwrap().is_none());
    }
}
