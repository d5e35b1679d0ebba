use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::require_user;
use crate::catalog::format_money;
use crate::error::CheckoutError;
use crate::orders::Order;
use crate::payment::IssuedOrder;
use crate::server::AppState;
use crate::store::time::to_iso8601_utc_string;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    // 缺省时按空字符串处理，统一落到 UnknownProduct
    #[serde(default)]
    pub product_id: String,
}

pub async fn create_order(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<IssuedOrder>, CheckoutError> {
    // 先认证再看请求体：未登录一律 401
    let claims = require_user(&headers, &app_state.config.auth)?;
    let Json(payload) = payload.map_err(|e| CheckoutError::BadRequest(e.body_text()))?;
    let issued = app_state
        .issuer
        .issue(&payload.product_id, &claims.sub)
        .await?;
    Ok(Json(issued))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_no: String,
    pub plan_type: String,
    pub amount: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Order> for OrderView {
    fn from(o: &Order) -> Self {
        Self {
            order_no: o.order_no.clone(),
            plan_type: o.plan_type.as_str().to_string(),
            amount: format_money(o.amount),
            status: o.status.as_str().to_string(),
            created_at: to_iso8601_utc_string(&o.created_at),
            updated_at: to_iso8601_utc_string(&o.updated_at),
        }
    }
}

/// 支付完成页轮询订单状态；他人的订单一律按不存在处理
pub async fn get_order(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(order_no): Path<String>,
) -> Result<Json<OrderView>, CheckoutError> {
    let claims = require_user(&headers, &app_state.config.auth)?;
    let order = app_state
        .orders
        .get_order(&order_no)
        .await?
        .filter(|o| o.user_id == claims.sub)
        .ok_or_else(|| CheckoutError::OrderNotFound(order_no.clone()))?;
    Ok(Json(OrderView::from(&order)))
}

#[cfg(test)]
mod tests {
    use super::super::auth::test_token;
    use crate::orders::OrderStore;
    use crate::server::test_app::test_app;
    use crate::test_support::TEST_ORIGIN;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    async fn json_of(res: Response) -> serde_json::Value {
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn create_request(token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/pay/orders")
            .header("content-type", "application/json")
            .header("origin", TEST_ORIGIN);
        if let Some(t) = token {
            builder = builder.header("authorization", format!("Bearer {}", t));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn create_order_returns_payment_url_and_order_no() {
        let app = test_app().await;
        let token = test_token("user-1", &app.state.config.auth);
        let res = app
            .router
            .clone()
            .oneshot(create_request(Some(&token), r#"{"productId":"annual"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some(TEST_ORIGIN)
        );
        let v = json_of(res).await;
        let order_no = v["orderNo"].as_str().unwrap();
        let url = v["paymentUrl"].as_str().unwrap();
        assert!(order_no.starts_with("order_"));
        assert!(url.contains("money=99.00"));
        assert!(url.contains(order_no));
        assert!(!url.contains(crate::test_support::TEST_MERCHANT_KEY));

        let order = app.store.get_order(order_no).await.unwrap().unwrap();
        assert_eq!(order.user_id, "user-1");
    }

    #[tokio::test]
    async fn create_order_without_token_is_401() {
        let app = test_app().await;
        let res = app
            .router
            .clone()
            .oneshot(create_request(None, r#"{"productId":"annual"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(json_of(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn missing_token_wins_over_body_problems() {
        let app = test_app().await;
        let res = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/pay/orders")
                    .body(Body::from("productId=annual"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(json_of(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn malformed_bodies_are_json_400() {
        let app = test_app().await;
        let token = test_token("user-1", &app.state.config.auth);

        let res = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/pay/orders")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::from(r#"{"productId":"annual"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(json_of(res).await["error"].is_string());

        for body in [r#"{"productId":5}"#, "not json"] {
            let res = app
                .router
                .clone()
                .oneshot(create_request(Some(&token), body))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", body);
            assert!(json_of(res).await["error"].is_string(), "{}", body);
        }
    }

    #[tokio::test]
    async fn unknown_product_is_400() {
        let app = test_app().await;
        let token = test_token("user-1", &app.state.config.auth);
        for body in [r#"{"productId":"monthly"}"#, r#"{}"#] {
            let res = app
                .router
                .clone()
                .oneshot(create_request(Some(&token), body))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{}", body);
        }
    }

    #[tokio::test]
    async fn order_status_is_visible_to_owner_only() {
        let app = test_app().await;
        let owner = test_token("user-1", &app.state.config.auth);
        let issued = app.state.issuer.issue("lifetime", "user-1").await.unwrap();

        let get = |token: String| {
            Request::builder()
                .uri(format!("/api/pay/orders/{}", issued.order_no))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        };

        let res = app.router.clone().oneshot(get(owner)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_of(res).await;
        assert_eq!(v["status"], "pending");
        assert_eq!(v["amount"], "399.00");
        assert_eq!(v["planType"], "lifetime");

        let other = test_token("user-2", &app.state.config.auth);
        let res = app.router.clone().oneshot(get(other)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
