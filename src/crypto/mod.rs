use std::collections::BTreeMap;
use std::sync::Arc;

use md5::{Digest, Md5};
use subtle::ConstantTimeEq;

/// 参与签名的参数集合；BTreeMap 保证按键的字典序遍历
pub type Params = BTreeMap<String, String>;

pub const SIGN_FIELD: &str = "sign";
pub const SIGN_TYPE_FIELD: &str = "sign_type";

/// 摘要原语。规范化逻辑与具体哈希算法解耦，网关升级算法时只需替换实现。
pub trait Signer: Send + Sync {
    fn digest_hex(&self, message: &[u8]) -> String;
    fn sign_type(&self) -> &'static str;
}

/// 网关要求的 MD5（小写十六进制）
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Signer;

impl Signer for Md5Signer {
    fn digest_hex(&self, message: &[u8]) -> String {
        hex::encode(Md5::digest(message))
    }

    fn sign_type(&self) -> &'static str {
        "MD5"
    }
}

/// 规范化签名串：按键排序，`key=value` 以 `&` 连接。
/// `sign`、`sign_type` 以及空值字段不参与签名。
pub fn canonical_string(params: &Params) -> String {
    params
        .iter()
        .filter(|(k, v)| k.as_str() != SIGN_FIELD && k.as_str() != SIGN_TYPE_FIELD && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// 日志里只展示签名/密钥的首尾四位
pub fn mask_key(key: &str) -> String {
    if key.len() <= 8 || !key.is_ascii() {
        return "****".to_string();
    }
    format!("{}****{}", &key[..4], &key[key.len() - 4..])
}

#[derive(Clone)]
pub struct RequestSigner {
    signer: Arc<dyn Signer>,
    secret: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("sign_type", &self.signer.sign_type())
            .field("secret", &"****")
            .finish()
    }
}

impl RequestSigner {
    pub fn new(signer: Arc<dyn Signer>, secret: impl Into<String>) -> Self {
        Self {
            signer,
            secret: secret.into(),
        }
    }

    pub fn md5(secret: impl Into<String>) -> Self {
        Self::new(Arc::new(Md5Signer), secret)
    }

    pub fn sign_type(&self) -> &'static str {
        self.signer.sign_type()
    }

    /// 密钥直接拼接在规范串末尾（不编码、不作为字段）
    pub fn sign(&self, params: &Params) -> String {
        let mut message = canonical_string(params);
        message.push_str(&self.secret);
        self.signer.digest_hex(message.as_bytes())
    }

    pub fn verify(&self, params: &Params, provided: &str) -> bool {
        let expected = self.sign(params);
        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}
