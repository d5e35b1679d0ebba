use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CheckoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Annual,
    Lifetime,
    Agent,
}

impl PlanType {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanType::Annual => "annual",
            PlanType::Lifetime => "lifetime",
            PlanType::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "annual" => Some(PlanType::Annual),
            "lifetime" => Some(PlanType::Lifetime),
            "agent" => Some(PlanType::Agent),
            _ => None,
        }
    }

    /// 会员等级：代理商 > 永久 > 年费
    pub fn rank(self) -> u8 {
        match self {
            PlanType::Annual => 1,
            PlanType::Lifetime => 2,
            PlanType::Agent => 3,
        }
    }

    /// 会员有效天数；`None` 表示永久
    pub fn validity_days(self) -> Option<i64> {
        match self {
            PlanType::Annual => Some(365),
            PlanType::Lifetime | PlanType::Agent => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub is_active: bool,
}

impl Plan {
    pub fn amount_string(&self) -> String {
        format_money(self.price)
    }
}

/// 网关金额格式：固定两位小数
pub fn format_money(amount: Decimal) -> String {
    let mut v = amount.round_dp(2);
    v.rescale(2);
    v.to_string()
}

pub fn default_plans() -> Vec<Plan> {
    let plan = |plan_type, name: &str, cents: i64, features: &[&str]| Plan {
        plan_type,
        name: name.to_string(),
        price: Decimal::new(cents, 2),
        description: None,
        features: features.iter().map(|s| s.to_string()).collect(),
        is_active: true,
    };
    vec![
        plan(PlanType::Annual, "年费会员", 9900, &["全部AI功能", "有效期一年"]),
        plan(PlanType::Lifetime, "永久会员", 39900, &["全部AI功能", "永久有效"]),
        plan(PlanType::Agent, "代理商", 199900, &["全部AI功能", "永久有效", "推广返佣"]),
    ]
}

/// 套餐目录只读；价格以这里为准，绝不取自客户端
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn list_active_plans(&self) -> Result<Vec<Plan>, CheckoutError>;
    async fn find_active_plan(&self, plan_type: PlanType) -> Result<Option<Plan>, CheckoutError>;
}
