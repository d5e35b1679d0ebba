use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::payment::receiver::SettlementOutcome;
use crate::server::AppState;

pub async fn notify_get(
    State(app_state): State<Arc<AppState>>,
    Query(fields): Query<HashMap<String, String>>,
) -> Response {
    handle(&app_state, fields).await
}

pub async fn notify_post(
    State(app_state): State<Arc<AppState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    handle(&app_state, fields).await
}

/// 网关只认字面量 `success`，其余任何响应都会触发重试
async fn handle(app_state: &AppState, fields: HashMap<String, String>) -> Response {
    match app_state.receiver.receive(&fields).await {
        Ok(outcome) => {
            match &outcome {
                SettlementOutcome::Ignored { trade_status } => {
                    tracing::debug!(%trade_status, "settlement notification acknowledged")
                }
                SettlementOutcome::Settled { order_no }
                | SettlementOutcome::ActivationDeferred { order_no }
                | SettlementOutcome::AlreadySettled { order_no } => {
                    tracing::debug!(%order_no, ?outcome, "settlement notification handled")
                }
            }
            (StatusCode::OK, "success").into_response()
        }
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!("settlement notification failed: {}", e);
            } else {
                tracing::warn!("settlement notification refused: {}", e);
            }
            (status, format!("fail: {}", e.public_message())).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::PlanType;
    use crate::orders::{OrderStatus, OrderStore};
    use crate::server::test_app::test_app;
    use crate::test_support::signed_notification;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use std::collections::HashMap;
    use tower::ServiceExt;

    async fn text_of(res: Response) -> String {
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn encode(fields: &HashMap<String, String>) -> String {
        reqwest::Url::parse_with_params("http://x/", fields.iter())
            .unwrap()
            .query()
            .unwrap_or_default()
            .to_string()
    }

    fn post_form(fields: &HashMap<String, String>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/pay/notify")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(encode(fields)))
            .unwrap()
    }

    #[tokio::test]
    async fn annual_purchase_end_to_end() {
        let app = test_app().await;
        let issued = app.state.issuer.issue("annual", "user-1").await.unwrap();
        assert!(issued.payment_url.contains("money=99.00"));

        let fields = signed_notification(&issued.order_no, "TRADE_SUCCESS", "99.00");
        let res = app.router.clone().oneshot(post_form(&fields)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text_of(res).await, "success");

        let order = app.store.get_order(&issued.order_no).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        let calls = app.activator.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "user-1");
        assert_eq!(calls[0].1, PlanType::Annual);
        assert_eq!(calls[0].2, order.id);

        // 同一通知经 GET 重放：仍然 success，不再开通
        let res = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/pay/notify?{}", encode(&fields)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(text_of(res).await, "success");
        assert_eq!(app.activator.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_refused() {
        let app = test_app().await;
        let issued = app.state.issuer.issue("annual", "user-1").await.unwrap();
        let mut fields = signed_notification(&issued.order_no, "TRADE_SUCCESS", "99.00");
        fields.insert("money".into(), "0.01".into());

        let res = app.router.clone().oneshot(post_form(&fields)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(text_of(res).await.starts_with("fail: "));
        let order = app.store.get_order(&issued.order_no).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_order_is_404() {
        let app = test_app().await;
        let fields = signed_notification("order_0000", "TRADE_SUCCESS", "99.00");
        let res = app.router.clone().oneshot(post_form(&fields)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(text_of(res).await.starts_with("fail: "));
    }

    #[tokio::test]
    async fn non_success_status_is_acknowledged() {
        let app = test_app().await;
        let issued = app.state.issuer.issue("annual", "user-1").await.unwrap();
        let fields = signed_notification(&issued.order_no, "TRADE_PENDING", "99.00");
        let res = app.router.clone().oneshot(post_form(&fields)).await.unwrap();
        assert_eq!(text_of(res).await, "success");
        let order = app.store.get_order(&issued.order_no).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(app.activator.calls().await.is_empty());
    }

    #[tokio::test]
    async fn notify_is_not_restricted_by_cors() {
        let app = test_app().await;
        let fields = signed_notification("order_0000", "TRADE_PENDING", "99.00");
        let mut req = post_form(&fields);
        req.headers_mut()
            .insert("origin", "https://gateway.example.net".parse().unwrap());
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get("access-control-allow-origin").is_none());
    }
}
