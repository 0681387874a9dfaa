//! Minimal persistence for the admin coin-credit endpoints (spec §6) and the
//! admin audit log (spec §9 Open Question, resolved as a dedicated
//! insert-only table). These exist only to satisfy the boundary API's
//! persistence contract and the audit invariant (spec §8 invariant 6); the
//! reward-point rules and admin dashboard themselves are out of scope.

use async_trait::async_trait;
use rust_decimal::Decimal;
use turso::Value;

use crate::application::ports::PersistenceError;
use crate::domain::shared::{Timestamp, UserId};

use super::db::SwapDatabase;

/// An admin action against a user's test-credit balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinGiftAction {
    /// Credit the user.
    Gift,
    /// Debit the user.
    Deduct,
    /// Reset the user's balance to a fixed baseline.
    Reset,
}

impl CoinGiftAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Gift => "gift",
            Self::Deduct => "deduct",
            Self::Reset => "reset",
        }
    }

    /// The signed multiplier this action applies to `amount` when computing
    /// a net balance delta (spec §8 invariant 6).
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Gift => 1,
            Self::Deduct => -1,
            Self::Reset => 0,
        }
    }
}

/// Append-only log of admin coin actions and the admin audit trail.
#[async_trait]
pub trait AdminLedgerPort: Send + Sync {
    /// Record one admin coin action against a target user.
    async fn record_coin_action(
        &self,
        target_user_id: &UserId,
        admin_id: &UserId,
        action: CoinGiftAction,
        amount: Decimal,
        note: Option<&str>,
        now: Timestamp,
    ) -> Result<(), PersistenceError>;

    /// Record the same admin coin action against every user in `target_user_ids`,
    /// within a single transaction: all recipients are credited together or
    /// none are.
    async fn record_coin_action_batch(
        &self,
        target_user_ids: &[UserId],
        admin_id: &UserId,
        action: CoinGiftAction,
        amount: Decimal,
        note: Option<&str>,
        now: Timestamp,
    ) -> Result<(), PersistenceError>;

    /// The net balance delta recorded so far for a user (spec §8 invariant 6:
    /// must equal `current_balance - initial_balance`).
    async fn net_balance_delta(&self, user_id: &UserId) -> Result<Decimal, PersistenceError>;

    /// Every user ID that has ever received a coin action, for `gift-all`
    /// broadcast and stats purposes.
    async fn all_user_ids(&self) -> Result<Vec<UserId>, PersistenceError>;

    /// Append one entry to the immutable admin audit log.
    async fn append_audit(&self, admin_id: &UserId, action: &str, detail: &str, now: Timestamp) -> Result<(), PersistenceError>;
}

/// Turso-backed implementation.
#[derive(Debug, Clone)]
pub struct TursoAdminLedger {
    db: SwapDatabase,
}

impl TursoAdminLedger {
    /// Build an adapter over the given database handle.
    #[must_use]
    pub const fn new(db: SwapDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AdminLedgerPort for TursoAdminLedger {
    async fn record_coin_action(
        &self,
        target_user_id: &UserId,
        admin_id: &UserId,
        action: CoinGiftAction,
        amount: Decimal,
        note: Option<&str>,
        now: Timestamp,
    ) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(target_user_id.as_str().to_string()),
            Value::Text(admin_id.as_str().to_string()),
            Value::Text(action.as_str().to_string()),
            Value::Text(amount.to_string()),
            note.map_or(Value::Null, |n| Value::Text(n.to_string())),
            Value::Text(now.to_rfc3339()),
        ];
        conn.execute(
            "INSERT INTO coin_gift_logs (target_user_id, admin_id, action, amount, note, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        tracing::info!(target = %target_user_id, admin = %admin_id, action = action.as_str(), "coin action recorded");
        Ok(())
    }

    async fn record_coin_action_batch(
        &self,
        target_user_ids: &[UserId],
        admin_id: &UserId,
        action: CoinGiftAction,
        amount: Decimal,
        note: Option<&str>,
        now: Timestamp,
    ) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        for target_user_id in target_user_ids {
            let params: Vec<Value> = vec![
                Value::Text(target_user_id.as_str().to_string()),
                Value::Text(admin_id.as_str().to_string()),
                Value::Text(action.as_str().to_string()),
                Value::Text(amount.to_string()),
                note.map_or(Value::Null, |n| Value::Text(n.to_string())),
                Value::Text(now.to_rfc3339()),
            ];
            if let Err(e) = conn
                .execute(
                    "INSERT INTO coin_gift_logs (target_user_id, admin_id, action, amount, note, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    params,
                )
                .await
            {
                let _ = conn.execute_batch("ROLLBACK").await;
                return Err(PersistenceError::Database(e.to_string()));
            }
        }

        conn.execute_batch("COMMIT")
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        tracing::info!(admin = %admin_id, action = action.as_str(), recipients = target_user_ids.len(), "batch coin action recorded");
        Ok(())
    }

    async fn net_balance_delta(&self, user_id: &UserId) -> Result<Decimal, PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(user_id.as_str().to_string())];
        let mut rows = conn
            .query("SELECT action, amount FROM coin_gift_logs WHERE target_user_id = ?", params)
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let mut total = Decimal::ZERO;
        while let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            let action: String = row.get(0).map_err(|e| PersistenceError::Decode(format!("action: {e}")))?;
            let amount_raw: String = row.get(1).map_err(|e| PersistenceError::Decode(format!("amount: {e}")))?;
            let amount: Decimal = amount_raw.parse().map_err(|e| PersistenceError::Decode(format!("amount: {e}")))?;
            let sign = match action.as_str() {
                "gift" => CoinGiftAction::Gift.sign(),
                "deduct" => CoinGiftAction::Deduct.sign(),
                "reset" => CoinGiftAction::Reset.sign(),
                other => return Err(PersistenceError::Decode(format!("unknown coin action: {other}"))),
            };
            total += amount * Decimal::from(sign);
        }
        Ok(total)
    }

    async fn all_user_ids(&self) -> Result<Vec<UserId>, PersistenceError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query("SELECT id FROM users", ())
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| PersistenceError::Database(e.to_string()))? {
            ids.push(UserId::new(row.get::<String>(0).map_err(|e| PersistenceError::Decode(format!("id: {e}")))?));
        }
        Ok(ids)
    }

    async fn append_audit(&self, admin_id: &UserId, action: &str, detail: &str, now: Timestamp) -> Result<(), PersistenceError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(admin_id.as_str().to_string()),
            Value::Text(action.to_string()),
            Value::Text(detail.to_string()),
            Value::Text(now.to_rfc3339()),
        ];
        conn.execute(
            "INSERT INTO admin_audit_log (admin_id, action, detail, created_at) VALUES (?, ?, ?, ?)",
            params,
        )
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Ok(())
    }
}
