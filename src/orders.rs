use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::catalog::PlanType;
use crate::error::CheckoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub order_no: String,
    pub user_id: String,
    pub plan_type: PlanType,
    pub amount: Decimal,
    pub status: OrderStatus,
    pub trade_no: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: String,
    pub user_id: String,
    pub plan_type: PlanType,
    pub amount: Decimal,
}

/// 条件更新 `pending -> paid` 的结果
#[derive(Debug, Clone)]
pub enum PaidTransition {
    /// 本次调用完成了状态迁移
    Transitioned(Order),
    /// 已经是 paid，未做任何写入
    AlreadyPaid(Order),
    NotFound,
}

/// 订单号：`order_<毫秒时间戳><4位随机数>`，唯一性最终由存储层唯一索引兜底
pub fn generate_order_no(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::rng().random_range(0..10_000);
    format!("order_{}{:04}", now.timestamp_millis(), suffix)
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 订单号冲突时返回 `Ok(None)`
    async fn insert_pending(&self, order: &NewOrder) -> Result<Option<Order>, CheckoutError>;

    async fn get_order(&self, order_no: &str) -> Result<Option<Order>, CheckoutError>;

    /// 仅当当前状态为 pending 时迁移为 paid；必须是单条原子条件更新
    async fn mark_paid_if_pending(
        &self,
        order_no: &str,
        trade_no: &str,
        at: DateTime<Utc>,
    ) -> Result<PaidTransition, CheckoutError>;

    /// 会员开通失败的对账记录
    async fn record_activation_failure(
        &self,
        order: &Order,
        reason: &str,
    ) -> Result<(), CheckoutError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_no_is_time_derived() {
        let now = Utc.with_ymd_and_hms(2026, 1, 20, 10, 20, 30).unwrap();
        let no = generate_order_no(now);
        let digits = no.strip_prefix("order_").unwrap();
        assert_eq!(digits.len(), 13 + 4);
        assert!(digits.starts_with(&now.timestamp_millis().to_string()));
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn status_parse() {
        assert_eq!(OrderStatus::parse("paid"), Some(OrderStatus::Paid));
        assert_eq!(OrderStatus::parse("PAID"), None);
    }
}
