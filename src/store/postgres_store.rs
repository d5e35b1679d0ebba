use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_postgres::{Client, NoTls};

use crate::error::CheckoutError;

pub struct PgPool {
    clients: Vec<Arc<Client>>,
    next: AtomicUsize,
}

impl PgPool {
    async fn connect_many(
        pg_url: &str,
        schema: &Option<String>,
        size: usize,
    ) -> Result<Self, CheckoutError> {
        let mut clients = Vec::with_capacity(size.max(1));
        for _ in 0..size.max(1) {
            let (client, connection) = tokio_postgres::connect(pg_url, NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("postgres connection error: {}", e);
                }
            });
            if let Some(s) = schema {
                if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(CheckoutError::Config(format!("invalid pg_schema `{}`", s)));
                }
                client
                    .execute(&format!("SET search_path TO {}", s), &[])
                    .await?;
            }
            let client = Arc::new(client);
            crate::db::postgres::spawn_keepalive(Arc::clone(&client), 240, 420);
            clients.push(client);
        }
        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    pub fn pick(&self) -> Arc<Client> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len().max(1);
        Arc::clone(&self.clients[idx])
    }
}

/// Postgres 后端。`membership_plans` 表与 `activate_membership` 存储过程由外部维护，
/// 这里只确保订单相关的表存在。
#[derive(Clone)]
pub struct PgStore {
    pub pool: Arc<PgPool>,
}

impl PgStore {
    pub async fn connect(
        pg_url: &str,
        schema: &Option<String>,
        pool_size: usize,
    ) -> Result<Self, CheckoutError> {
        let pool = PgPool::connect_many(pg_url, schema, pool_size).await?;
        let store = Self {
            pool: Arc::new(pool),
        };
        let client = store.pool.pick();
        client
            .batch_execute(
                r#"CREATE TABLE IF NOT EXISTS orders (
                id BIGSERIAL PRIMARY KEY,
                order_no TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                plan_type TEXT NOT NULL,
                amount NUMERIC(12, 2) NOT NULL,
                status TEXT NOT NULL,
                trade_no TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
            CREATE TABLE IF NOT EXISTS activation_failures (
                id BIGSERIAL PRIMARY KEY,
                order_id BIGINT NOT NULL,
                order_no TEXT NOT NULL,
                user_id TEXT NOT NULL,
                plan_type TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );"#,
            )
            .await?;
        tracing::info!("PostgreSQL order tables ready");
        Ok(store)
    }
}
