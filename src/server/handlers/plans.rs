use axum::{Json, extract::State};
use std::sync::Arc;

use crate::error::CheckoutError;
use crate::server::AppState;

pub async fn list_plans(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, CheckoutError> {
    let plans = app_state.plans.list_active_plans().await?;
    Ok(Json(serde_json::json!({ "plans": plans })))
}
