use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;

use crate::catalog::PlanType;
use crate::config::Settings;
use crate::config::settings::{
    AuthConfig, CorsConfig, PaymentConfig, PaymentMode, ServerConfig, StorageConfig,
};
use crate::crypto::{Params, RequestSigner};
use crate::entitlement::EntitlementActivator;
use crate::error::CheckoutError;
use crate::store::SqliteStore;

pub const TEST_MERCHANT_ID: &str = "1001";
pub const TEST_MERCHANT_KEY: &str = "test-merchant-key-0123456789";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_ORIGIN: &str = "http://localhost:32100";

pub async fn sqlite_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkout.db");
    let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
    (dir, Arc::new(store))
}

pub fn payment_config(gateway_url: &str) -> PaymentConfig {
    PaymentConfig {
        merchant_id: TEST_MERCHANT_ID.into(),
        merchant_key: TEST_MERCHANT_KEY.into(),
        gateway_url: gateway_url.into(),
        notify_url: "https://api.example.com/pay/notify".into(),
        return_url: "https://www.example.com/payment-success".into(),
        payment_type: "alipay".into(),
        mode: PaymentMode::Redirect,
        timeout_secs: 10,
    }
}

pub fn test_settings(database_path: String) -> Settings {
    Settings {
        server: ServerConfig::default(),
        payment: payment_config("https://pay.example.com/submit.php"),
        cors: CorsConfig {
            allowed_origins: vec![TEST_ORIGIN.into()],
        },
        storage: StorageConfig {
            database_path,
            ..StorageConfig::default()
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.into(),
        },
    }
}

/// 在随机端口上启动一个模拟网关，返回 `http://127.0.0.1:<port>`
pub async fn mock_gateway(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// 按网关的方式构造一条已签名的异步通知
pub fn signed_notification(order_no: &str, trade_status: &str, money: &str) -> HashMap<String, String> {
    let params: Params = [
        ("pid", TEST_MERCHANT_ID.to_string()),
        ("trade_no", format!("T_{}", order_no)),
        ("out_trade_no", order_no.to_string()),
        ("type", "alipay".to_string()),
        ("name", "年费会员".to_string()),
        ("money", money.to_string()),
        ("trade_status", trade_status.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let sign = RequestSigner::md5(TEST_MERCHANT_KEY).sign(&params);
    let mut fields: HashMap<String, String> = params.into_iter().collect();
    fields.insert("sign".into(), sign);
    fields.insert("sign_type".into(), "MD5".into());
    fields
}

#[derive(Default)]
pub struct CountingActivator {
    calls: Mutex<Vec<(String, PlanType, i64)>>,
}

impl CountingActivator {
    pub async fn calls(&self) -> Vec<(String, PlanType, i64)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl EntitlementActivator for CountingActivator {
    async fn activate(
        &self,
        user_id: &str,
        plan_type: PlanType,
        order_id: i64,
    ) -> Result<(), CheckoutError> {
        self.calls
            .lock()
            .await
            .push((user_id.to_string(), plan_type, order_id));
        Ok(())
    }
}

pub struct FailingActivator;

#[async_trait]
impl EntitlementActivator for FailingActivator {
    async fn activate(
        &self,
        _user_id: &str,
        _plan_type: PlanType,
        _order_id: i64,
    ) -> Result<(), CheckoutError> {
        Err(CheckoutError::ActivationFailed(
            "membership service unavailable".into(),
        ))
    }
}
