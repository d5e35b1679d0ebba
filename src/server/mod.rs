pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::catalog::PlanStore;
use crate::config::Settings;
use crate::config::settings::CorsConfig;
use crate::entitlement::EntitlementActivator;
use crate::error::Result as AppResult;
use crate::orders::OrderStore;
use crate::payment::{OrderIssuer, SettlementReceiver};
use crate::store::{PgStore, SqliteStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub plans: Arc<dyn PlanStore>,
    pub orders: Arc<dyn OrderStore>,
    pub issuer: Arc<OrderIssuer>,
    pub receiver: Arc<SettlementReceiver>,
}

impl AppState {
    /// 两个处理器共享同一份显式构造的配置
    pub fn new(
        config: Settings,
        plans: Arc<dyn PlanStore>,
        orders: Arc<dyn OrderStore>,
        activator: Arc<dyn EntitlementActivator>,
    ) -> AppResult<Self> {
        let issuer = OrderIssuer::new(config.payment.clone(), plans.clone(), orders.clone())?;
        let receiver = SettlementReceiver::new(
            config.payment.merchant_id.clone(),
            orders.clone(),
            activator,
            crate::crypto::RequestSigner::md5(config.payment.merchant_key.clone()),
        );
        Ok(Self {
            config,
            plans,
            orders,
            issuer: Arc::new(issuer),
            receiver: Arc::new(receiver),
        })
    }
}

pub async fn create_app(config: Settings) -> AppResult<Router> {
    // 配置了 pg_url 时只用 PostgreSQL（不回落 SQLite）
    let (plans, orders, activator): (
        Arc<dyn PlanStore>,
        Arc<dyn OrderStore>,
        Arc<dyn EntitlementActivator>,
    ) = if let Some(pg_url) = &config.storage.pg_url {
        let pool_size = config.storage.pg_pool_size.unwrap_or(4);
        let pg = Arc::new(PgStore::connect(pg_url, &config.storage.pg_schema, pool_size).await?);
        tracing::info!("Using PostgreSQL for plans, orders and memberships");
        (pg.clone(), pg.clone(), pg)
    } else {
        let db = Arc::new(SqliteStore::new(&config.storage.database_path).await?);
        tracing::info!("Using SQLite at {}", config.storage.database_path);
        (db.clone(), db.clone(), db)
    };

    tracing::info!(
        merchant_id = %config.payment.merchant_id,
        mode = ?config.payment.mode,
        gateway = %config.payment.gateway_url,
        "payment gateway configured"
    );

    let state = AppState::new(config, plans, orders, activator)?;
    Ok(build_router(Arc::new(state)))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);
    // 网关回调是服务端到服务端，不挂 CORS
    let routes = handlers::routes()
        .layer(cors)
        .merge(handlers::notify_routes());

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: axum::http::Uri) -> crate::error::CheckoutError {
    crate::error::CheckoutError::NotFound(uri.path().to_string())
}

fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin `{}`", o);
                None
            }
        })
        .collect();
    if origins.is_empty() {
        tracing::warn!("cors.allowed_origins is empty; browsers on other origins will be refused");
    }
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::list(origins))
}
