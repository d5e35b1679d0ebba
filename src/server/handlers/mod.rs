use axum::{Router, routing::get};
use std::sync::Arc;

use crate::server::AppState;

pub(crate) mod auth;
mod pay_notify;
mod pay_orders;
mod plans;

/// 面向浏览器的接口（挂 CORS 白名单）
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/pay/plans", get(plans::list_plans))
        .route("/pay/orders", axum::routing::post(pay_orders::create_order))
        .route("/pay/orders/{order_no}", get(pay_orders::get_order))
}

/// 支付网关异步通知；GET 与 POST 两种投递方式都要支持
pub fn notify_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/pay/notify",
        get(pay_notify::notify_get).post(pay_notify::notify_post),
    )
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}
