use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckoutError {
    // 下单侧
    #[error("请先登录: {0}")]
    Unauthenticated(String),

    #[error("未知的商品ID: {0}")]
    UnknownProduct(String),

    #[error("支付网关暂时无法访问: {0}")]
    GatewayUnreachable(String),

    #[error("支付网关拒绝了订单: {0}")]
    GatewayRejected(String),

    // 回调侧
    #[error("签名校验失败: {0}")]
    SignatureInvalid(String),

    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    #[error("会员开通失败: {0}")]
    ActivationFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("请求格式错误: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Time parse error: {0}")]
    TimeParse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl CheckoutError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CheckoutError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CheckoutError::UnknownProduct(_)
            | CheckoutError::SignatureInvalid(_)
            | CheckoutError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CheckoutError::OrderNotFound(_) | CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
            CheckoutError::GatewayUnreachable(_) | CheckoutError::GatewayRejected(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 面向调用方的文案；基础设施错误只记录日志，不把细节暴露给客户端
    pub fn public_message(&self) -> String {
        match self {
            CheckoutError::Http(_)
            | CheckoutError::Json(_)
            | CheckoutError::Db(_)
            | CheckoutError::Postgres(_)
            | CheckoutError::Io(_)
            | CheckoutError::TimeParse(_)
            | CheckoutError::Config(_)
            | CheckoutError::Internal(_)
            | CheckoutError::ActivationFailed(_) => "服务器内部错误，请稍后再试".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }
        let body = Json(serde_json::json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
