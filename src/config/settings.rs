use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CheckoutError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub payment: PaymentConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 码支付商户配置。`merchant_key` 是签名与验签共用的唯一信任根，不能下发给前端。
#[derive(Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub merchant_id: String,
    #[serde(default)]
    pub merchant_key: String,
    pub gateway_url: String,
    pub notify_url: String,
    pub return_url: String,
    #[serde(default = "default_payment_type")]
    pub payment_type: String,
    #[serde(default)]
    pub mode: PaymentMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_key", &"****")
            .field("gateway_url", &self.gateway_url)
            .field("notify_url", &self.notify_url)
            .field("return_url", &self.return_url)
            .field("payment_type", &self.payment_type)
            .field("mode", &self.mode)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_payment_type() -> String {
    "alipay".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// 直接把签名后的网关地址返回给前端跳转
    #[default]
    Redirect,
    /// 服务端提交到网关 API，转发网关返回的支付链接
    Relay,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
    #[serde(default)]
    pub pg_url: Option<String>,
    #[serde(default)]
    pub pg_schema: Option<String>,
    #[serde(default)]
    pub pg_pool_size: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "data/checkout.db".to_string(),
            pg_url: None,
            pg_schema: None,
            pg_pool_size: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"****")
            .finish()
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config_path = Self::find_config_file()?;
        let config_content = std::fs::read_to_string(&config_path)?;
        let mut settings = Self::from_toml_str(&config_content)?;
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        settings.validate()?;
        tracing::info!("Loaded configuration from {}", config_path);
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CheckoutError::Config(e.to_string()))
    }

    /// 密钥类配置允许由环境变量覆盖，避免写进配置文件
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("PAY_MERCHANT_ID") {
            self.payment.merchant_id = v;
        }
        if let Some(v) = get("PAY_MERCHANT_KEY") {
            self.payment.merchant_key = v;
        }
        if let Some(v) = get("PAY_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = get("PAY_PG_URL") {
            self.storage.pg_url = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.payment;
        let required = [
            ("payment.merchant_id", &p.merchant_id),
            ("payment.merchant_key", &p.merchant_key),
            ("payment.gateway_url", &p.gateway_url),
            ("payment.notify_url", &p.notify_url),
            ("payment.return_url", &p.return_url),
            ("payment.payment_type", &p.payment_type),
            ("auth.jwt_secret", &self.auth.jwt_secret),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(CheckoutError::Config(format!("missing `{}`", name)));
            }
        }
        reqwest::Url::parse(&p.gateway_url)
            .map_err(|e| CheckoutError::Config(format!("invalid payment.gateway_url: {}", e)))?;
        if p.timeout_secs == 0 {
            return Err(CheckoutError::Config(
                "payment.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    fn find_config_file() -> Result<String> {
        let possible_names = ["custom-config.toml", "config.toml"];

        for name in &possible_names {
            if Path::new(name).exists() {
                return Ok(name.to_string());
            }
        }

        Err(CheckoutError::Config(
            "Configuration file not found. Please create custom-config.toml or config.toml".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[payment]
merchant_id = "1001"
merchant_key = "file-secret"
gateway_url = "https://pay.example.com/mapi.php"
notify_url = "https://api.example.com/pay/notify"
return_url = "https://www.example.com/payment-success"

[cors]
allowed_origins = ["http://localhost:32100"]

[auth]
jwt_secret = "jwt"
"#;

    #[test]
    fn parses_with_defaults() {
        let s = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.payment.payment_type, "alipay");
        assert_eq!(s.payment.mode, PaymentMode::Redirect);
        assert_eq!(s.payment.timeout_secs, 10);
        assert_eq!(s.storage.database_path, "data/checkout.db");
        assert_eq!(s.cors.allowed_origins, vec!["http://localhost:32100"]);
        s.validate().unwrap();
    }

    #[test]
    fn env_overrides_secret() {
        let mut s = Settings::from_toml_str(SAMPLE).unwrap();
        s.apply_env_overrides(|name| match name {
            "PAY_MERCHANT_KEY" => Some("env-secret".into()),
            "PAY_JWT_SECRET" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(s.payment.merchant_key, "env-secret");
        assert_eq!(s.auth.jwt_secret, "jwt");
    }

    #[test]
    fn validate_rejects_missing_secret() {
        let mut s = Settings::from_toml_str(SAMPLE).unwrap();
        s.payment.merchant_key.clear();
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("merchant_key"));
    }

    #[test]
    fn debug_output_masks_secrets() {
        let s = Settings::from_toml_str(SAMPLE).unwrap();
        let dbg = format!("{:?}", s);
        assert!(!dbg.contains("file-secret"));
        assert!(!dbg.contains("\"jwt\""));
    }
}
