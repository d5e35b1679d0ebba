use std::collections::HashMap;

use crate::crypto::{Params, SIGN_FIELD, SIGN_TYPE_FIELD};
use crate::error::CheckoutError;

pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";

/// 网关回调中必须出现且非空的字段；缺任何一个都直接拒绝，不做默认值填充
pub const REQUIRED_FIELDS: [&str; 8] = [
    "pid",
    "trade_no",
    "out_trade_no",
    "type",
    "name",
    "money",
    "trade_status",
    SIGN_FIELD,
];

/// 网关异步通知。验签通过之前所有字段都是不可信输入。
#[derive(Debug, Clone)]
pub struct SettlementNotification {
    pub merchant_id: String,
    pub trade_no: String,
    pub out_trade_no: String,
    pub money: String,
    pub trade_status: String,
    pub sign: String,
    /// 参与验签的原始字段（不含 sign / sign_type）
    pub signed: Params,
}

impl SettlementNotification {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, CheckoutError> {
        for name in REQUIRED_FIELDS {
            if fields.get(name).is_none_or(|v| v.is_empty()) {
                return Err(CheckoutError::SignatureInvalid(format!(
                    "missing field `{}`",
                    name
                )));
            }
        }

        let signed: Params = fields
            .iter()
            .filter(|(k, _)| k.as_str() != SIGN_FIELD && k.as_str() != SIGN_TYPE_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let get = |name: &str| fields[name].clone();
        Ok(Self {
            merchant_id: get("pid"),
            trade_no: get("trade_no"),
            out_trade_no: get("out_trade_no"),
            money: get("money"),
            trade_status: get("trade_status"),
            sign: get(SIGN_FIELD),
            signed,
        })
    }

    pub fn is_trade_success(&self) -> bool {
        self.trade_status == TRADE_SUCCESS
    }
}
