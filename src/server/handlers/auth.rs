use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::settings::AuthConfig;
use crate::error::CheckoutError;

type HmacSha256 = Hmac<Sha256>;

/// 允许的时钟偏差（秒）
const CLOCK_SKEW_SECS: i64 = 60;

/// 登录服务签发的访问令牌（HS256）。这里只校验，不负责签发登录态。
/// 其余声明（email 等）直接忽略。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
}

fn mac_for(secret: &str) -> Result<HmacSha256, CheckoutError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CheckoutError::Config(format!("invalid jwt secret: {}", e)))
}

pub fn verify_access_token(
    token: &str,
    auth: &AuthConfig,
) -> Result<AccessTokenClaims, CheckoutError> {
    let invalid = || CheckoutError::Unauthenticated("invalid access token".into());

    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let header: JwtHeader = URL_SAFE_NO_PAD
        .decode(header_b64)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or_else(invalid)?;
    if header.alg != "HS256" {
        return Err(invalid());
    }

    let signature = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| invalid())?;
    let mut mac = mac_for(&auth.jwt_secret)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let claims: AccessTokenClaims = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or_else(invalid)?;

    let now = Utc::now().timestamp();
    if claims.exp <= now {
        return Err(CheckoutError::Unauthenticated("access token expired".into()));
    }
    if claims.iat.is_some_and(|iat| iat > now + CLOCK_SKEW_SECS) {
        return Err(invalid());
    }
    if claims.sub.trim().is_empty() {
        return Err(invalid());
    }
    Ok(claims)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 解析请求方身份；用户 ID 只来自已验证的令牌，不接受请求体里的自报值
pub fn require_user(
    headers: &HeaderMap,
    auth: &AuthConfig,
) -> Result<AccessTokenClaims, CheckoutError> {
    let token = bearer_token(headers)
        .ok_or_else(|| CheckoutError::Unauthenticated("missing bearer token".into()))?;
    verify_access_token(&token, auth)
}

/// 令牌由登录服务签发；这里的签发只给测试构造令牌用
#[cfg(test)]
pub(crate) fn issue_access_token(
    claims: &AccessTokenClaims,
    auth: &AuthConfig,
) -> Result<String, CheckoutError> {
    let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{}.{}", header, payload);

    let mut mac = mac_for(&auth.jwt_secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", signing_input, signature))
}

#[cfg(test)]
pub(crate) fn test_token(user_id: &str, auth: &AuthConfig) -> String {
    let now = Utc::now().timestamp();
    issue_access_token(
        &AccessTokenClaims {
            sub: user_id.into(),
            exp: now + 3600,
            iat: Some(now),
        },
        auth,
    )
    .unwrap()
}
