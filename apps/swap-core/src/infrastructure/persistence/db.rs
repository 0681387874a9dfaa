//! Turso-backed database handle and startup migrations.
//!
//! Grounded on `execution::persistence::StatePersistence`: a thin wrapper
//! around a `turso::Database` that connects per-operation (connections are
//! cheap and local for an embedded engine) and runs idempotent `CREATE TABLE
//! IF NOT EXISTS` migrations once at startup.

use turso::Builder;

use crate::application::ports::PersistenceError;

impl From<turso::Error> for PersistenceError {
    fn from(err: turso::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Owns the Turso database handle shared by every repository adapter.
#[derive(Debug, Clone)]
pub struct SwapDatabase {
    db: turso::Database,
}

impl SwapDatabase {
    /// Open (creating if absent) a local database file and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if the file cannot be opened or
    /// a migration statement fails.
    pub async fn new_local(path: &str) -> Result<Self, PersistenceError> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Self::run_migrations(&db).await?;
        Ok(Self { db })
    }

    /// Open an in-memory database, for tests.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if a migration statement fails.
    pub async fn new_in_memory() -> Result<Self, PersistenceError> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| PersistenceError::Database(e.to_string()))?;
        Self::run_migrations(&db).await?;
        Ok(Self { db })
    }

    /// A fresh connection to the underlying database. Turso connections are
    /// cheap and local; every repository call takes its own.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Database` if a connection cannot be opened.
    pub(super) fn connect(&self) -> Result<turso::Connection, PersistenceError> {
        self.db.connect().map_err(Into::into)
    }

    async fn run_migrations(db: &turso::Database) -> Result<(), PersistenceError> {
        let conn = db.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS orders (
                external_order_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                source_asset TEXT NOT NULL,
                source_network TEXT NOT NULL,
                source_amount TEXT NOT NULL,
                destination_asset TEXT NOT NULL,
                destination_network TEXT NOT NULL,
                expected_settle_amount TEXT NOT NULL,
                deposit_address TEXT NOT NULL,
                deposit_memo TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_orders_non_terminal
             ON orders(status)
             WHERE status NOT IN ('settled', 'refunded', 'failed', 'expired');

            CREATE TABLE IF NOT EXISTS watched_orders (
                external_order_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                last_status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_watched_orders_external_id
             ON watched_orders(external_order_id);

            CREATE TABLE IF NOT EXISTS status_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_order_id TEXT NOT NULL,
                old_status TEXT NOT NULL,
                new_status TEXT NOT NULL,
                emitted_at TEXT NOT NULL,
                payload_fingerprint TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_status_log_order
             ON status_log(external_order_id);

            CREATE TABLE IF NOT EXISTS dca_plans (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                source_asset TEXT NOT NULL,
                source_network TEXT NOT NULL,
                destination_asset TEXT NOT NULL,
                destination_network TEXT NOT NULL,
                amount_per_execution TEXT NOT NULL,
                interval_hours INTEGER NOT NULL,
                next_execution_at TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                executed_count INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_dca_plans_due
             ON dca_plans(is_active, next_execution_at);

            CREATE TABLE IF NOT EXISTS limit_orders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                source_asset TEXT NOT NULL,
                source_network TEXT NOT NULL,
                destination_asset TEXT NOT NULL,
                destination_network TEXT NOT NULL,
                amount TEXT NOT NULL,
                target_price TEXT NOT NULL,
                condition TEXT NOT NULL,
                reference_asset TEXT NOT NULL,
                reference_network TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                retry_after TEXT,
                last_error TEXT,
                spawned_order_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_limit_orders_eligible
             ON limit_orders(status, retry_after);

            CREATE INDEX IF NOT EXISTS idx_limit_orders_spawned_order
             ON limit_orders(spawned_order_id);

            CREATE TABLE IF NOT EXISTS price_snapshots (
                asset TEXT NOT NULL,
                network TEXT NOT NULL,
                price TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                PRIMARY KEY (asset, network)
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                settlement_address TEXT,
                refund_address TEXT
            );

            CREATE TABLE IF NOT EXISTS user_settings (
                user_id TEXT PRIMARY KEY,
                slippage_tolerance TEXT NOT NULL DEFAULT '0.0100'
            );

            CREATE TABLE IF NOT EXISTS coin_gift_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_user_id TEXT NOT NULL,
                admin_id TEXT NOT NULL,
                action TEXT NOT NULL,
                amount TEXT NOT NULL,
                note TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_coin_gift_logs_target
             ON coin_gift_logs(target_user_id);
            CREATE INDEX IF NOT EXISTS idx_coin_gift_logs_admin
             ON coin_gift_logs(admin_id);
            CREATE INDEX IF NOT EXISTS idx_coin_gift_logs_created_at
             ON coin_gift_logs(created_at);

            CREATE TABLE IF NOT EXISTS admin_audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                admin_id TEXT NOT NULL,
                action TEXT NOT NULL,
                detail TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .await
        .map_err(|e| PersistenceError::Database(e.to_string()))?;

        tracing::info!("swap-core persistence migrations complete");
        Ok(())
    }
}
