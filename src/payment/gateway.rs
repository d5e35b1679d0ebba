use std::time::Duration;

use serde_json::Value;

use crate::crypto::Params;
use crate::error::CheckoutError;
use crate::http_client::client_for_url_with_timeout;

/// 网关 API 返回中可作为跳转目标的字段，按优先级排列
const TARGET_FIELDS: [&str; 3] = ["payurl", "qrcode", "urlscheme"];

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    api_url: String,
}

impl GatewayClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, CheckoutError> {
        let client = client_for_url_with_timeout(api_url, timeout)?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
        })
    }

    /// 服务端提交签名表单，返回网关给出的支付地址。不做重试。
    pub async fn submit(&self, form: &Params) -> Result<String, CheckoutError> {
        let resp = self
            .client
            .post(&self.api_url)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("gateway request failed: {}", e);
                let reason = if e.is_timeout() { "请求超时" } else { "网络错误" };
                CheckoutError::GatewayUnreachable(reason.into())
            })?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!("gateway responded with HTTP {}", status);
            return Err(CheckoutError::GatewayUnreachable(format!(
                "网关返回 HTTP {}",
                status.as_u16()
            )));
        }

        let body = resp.text().await.map_err(|e| {
            tracing::warn!("failed to read gateway body: {}", e);
            CheckoutError::GatewayUnreachable("读取网关响应失败".into())
        })?;
        parse_gateway_response(&body)
    }
}

fn is_success_code(code: Option<&Value>) -> bool {
    match code {
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => s.trim() == "1",
        _ => false,
    }
}

pub fn parse_gateway_response(body: &str) -> Result<String, CheckoutError> {
    let v: Value = serde_json::from_str(body).map_err(|_| {
        tracing::warn!("gateway returned non-JSON body ({} bytes)", body.len());
        CheckoutError::GatewayUnreachable("网关响应格式错误".into())
    })?;

    if !is_success_code(v.get("code")) {
        let msg = v
            .get("msg")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or("未知错误");
        return Err(CheckoutError::GatewayRejected(msg.to_string()));
    }

    TARGET_FIELDS
        .iter()
        .filter_map(|k| v.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CheckoutError::GatewayRejected("网关未返回支付地址".into()))
}
