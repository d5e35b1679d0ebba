pub mod database;
pub mod database_entitlements;
pub mod database_orders;
pub mod database_plans;
pub mod postgres_entitlements;
pub mod postgres_orders;
pub mod postgres_plans;
pub mod postgres_store;
pub mod time;

pub use database::SqliteStore;
pub use postgres_store::PgStore;
