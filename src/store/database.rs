use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::default_plans;
use crate::error::CheckoutError;

#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn new(database_path: &str) -> Result<Self, CheckoutError> {
        // 确保数据库文件的目录存在
        if let Some(parent) = std::path::Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created database directory: {}", parent.display());
            }
        }

        let conn = Connection::open(database_path)?;
        tracing::info!("Database initialized at: {}", database_path);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS membership_plans (
                type TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                price TEXT NOT NULL,
                description TEXT,
                features TEXT NOT NULL DEFAULT '[]',
                is_active INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_no TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                plan_type TEXT NOT NULL,
                amount TEXT NOT NULL,
                status TEXT NOT NULL,
                trade_no TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
            CREATE TABLE IF NOT EXISTS user_memberships (
                user_id TEXT PRIMARY KEY,
                plan_type TEXT NOT NULL,
                order_id INTEGER NOT NULL,
                activated_at TEXT NOT NULL,
                expires_at TEXT
            );
            CREATE TABLE IF NOT EXISTS membership_grants (
                order_id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                plan_type TEXT NOT NULL,
                granted_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS activation_failures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                order_no TEXT NOT NULL,
                user_id TEXT NOT NULL,
                plan_type TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;

        let store = Self {
            connection: Arc::new(Mutex::new(conn)),
        };
        store.seed_default_plans().await?;
        Ok(store)
    }

    async fn seed_default_plans(&self) -> Result<(), CheckoutError> {
        let count: i64 = {
            let conn = self.connection.lock().await;
            conn.query_row("SELECT COUNT(*) FROM membership_plans", [], |row| {
                row.get(0)
            })?
        };
        if count > 0 {
            return Ok(());
        }
        for plan in default_plans() {
            self.upsert_plan(&plan).await?;
        }
        tracing::info!("Seeded default membership plans");
        Ok(())
    }
}
