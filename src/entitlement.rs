use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::PlanType;
use crate::error::CheckoutError;

/// 会员开通能力：一次调用要么全部生效要么全部不生效
#[async_trait]
pub trait EntitlementActivator: Send + Sync {
    async fn activate(
        &self,
        user_id: &str,
        plan_type: PlanType,
        order_id: i64,
    ) -> Result<(), CheckoutError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: String,
    pub plan_type: PlanType,
    pub order_id: i64,
    pub activated_at: DateTime<Utc>,
    /// `None` 表示永久会员
    pub expires_at: Option<DateTime<Utc>>,
}

/// 计算新的到期时间：年费从当前有效期末尾顺延；已是永久会员时不会被年费缩短
pub fn next_expiry(
    current: Option<&Membership>,
    plan_type: PlanType,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let days = plan_type.validity_days()?;
    let base = match current {
        Some(m) => match m.expires_at {
            None => return None,
            Some(exp) if exp > now => exp,
            Some(_) => now,
        },
        None => now,
    };
    Some(base + chrono::Duration::days(days))
}

/// 本次开通后的会员等级与到期时间。已有永久会员时，等级不高于它的购买不改变等级与有效期。
pub fn resolve_grant(
    current: Option<&Membership>,
    plan_type: PlanType,
    now: DateTime<Utc>,
) -> (PlanType, Option<DateTime<Utc>>) {
    match current {
        Some(m) if m.expires_at.is_none() && m.plan_type.rank() >= plan_type.rank() => {
            (m.plan_type, None)
        }
        _ => (plan_type, next_expiry(current, plan_type, now)),
    }
}
