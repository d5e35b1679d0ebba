use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::catalog::{Plan, PlanStore, PlanType};
use crate::config::settings::{PaymentConfig, PaymentMode};
use crate::crypto::{Params, RequestSigner, SIGN_FIELD, SIGN_TYPE_FIELD};
use crate::error::{CheckoutError, Result};
use crate::orders::{NewOrder, Order, OrderStore, generate_order_no};
use crate::payment::gateway::GatewayClient;

const MAX_ORDER_NO_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedOrder {
    pub order_no: String,
    pub payment_url: String,
}

/// 下单：按目录价格构造并签名支付请求，订单以 pending 状态落库后才返回支付地址
pub struct OrderIssuer {
    plans: Arc<dyn PlanStore>,
    orders: Arc<dyn OrderStore>,
    signer: RequestSigner,
    payment: PaymentConfig,
    gateway: Option<GatewayClient>,
}

impl OrderIssuer {
    pub fn new(
        payment: PaymentConfig,
        plans: Arc<dyn PlanStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Result<Self> {
        let signer = RequestSigner::md5(payment.merchant_key.clone());
        Self::with_signer(payment, plans, orders, signer)
    }

    pub fn with_signer(
        payment: PaymentConfig,
        plans: Arc<dyn PlanStore>,
        orders: Arc<dyn OrderStore>,
        signer: RequestSigner,
    ) -> Result<Self> {
        let gateway = match payment.mode {
            PaymentMode::Redirect => None,
            PaymentMode::Relay => Some(GatewayClient::new(
                &payment.gateway_url,
                Duration::from_secs(payment.timeout_secs),
            )?),
        };
        Ok(Self {
            plans,
            orders,
            signer,
            payment,
            gateway,
        })
    }

    pub async fn issue(&self, product_id: &str, user_id: &str) -> Result<IssuedOrder> {
        if user_id.trim().is_empty() {
            return Err(CheckoutError::Unauthenticated("缺少用户身份".into()));
        }

        let plan = self.resolve_plan(product_id).await?;
        let order = self.create_pending_order(&plan, user_id).await?;

        let mut params = self.signing_params(&plan, &order.order_no);
        let sign = self.signer.sign(&params);
        params.insert(SIGN_FIELD.to_string(), sign);
        params.insert(
            SIGN_TYPE_FIELD.to_string(),
            self.signer.sign_type().to_string(),
        );

        let payment_url = match &self.gateway {
            None => self.redirect_url(&params)?,
            Some(gateway) => gateway.submit(&params).await?,
        };

        tracing::info!(
            order_no = %order.order_no,
            user_id,
            plan = plan.plan_type.as_str(),
            amount = %plan.amount_string(),
            "payment order issued"
        );
        Ok(IssuedOrder {
            order_no: order.order_no,
            payment_url,
        })
    }

    async fn resolve_plan(&self, product_id: &str) -> Result<Plan> {
        let plan_type = PlanType::parse(product_id.trim())
            .ok_or_else(|| CheckoutError::UnknownProduct(product_id.to_string()))?;
        self.plans
            .find_active_plan(plan_type)
            .await?
            .ok_or_else(|| CheckoutError::UnknownProduct(product_id.to_string()))
    }

    async fn create_pending_order(&self, plan: &Plan, user_id: &str) -> Result<Order> {
        for attempt in 1..=MAX_ORDER_NO_ATTEMPTS {
            let new_order = NewOrder {
                order_no: generate_order_no(Utc::now()),
                user_id: user_id.to_string(),
                plan_type: plan.plan_type,
                amount: plan.price,
            };
            if let Some(order) = self.orders.insert_pending(&new_order).await? {
                return Ok(order);
            }
            tracing::warn!(
                attempt,
                order_no = %new_order.order_no,
                "order number collision, regenerating"
            );
        }
        Err(CheckoutError::Internal(
            "failed to allocate a unique order number".into(),
        ))
    }

    /// 参与签名的参数集合；金额与名称只取自目录
    pub fn signing_params(&self, plan: &Plan, order_no: &str) -> Params {
        let p = &self.payment;
        [
            ("money", plan.amount_string()),
            ("name", plan.name.clone()),
            ("notify_url", p.notify_url.clone()),
            ("out_trade_no", order_no.to_string()),
            ("pid", p.merchant_id.clone()),
            ("return_url", p.return_url.clone()),
            ("type", p.payment_type.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn redirect_url(&self, params: &Params) -> Result<String> {
        let url = reqwest::Url::parse_with_params(&self.payment.gateway_url, params.iter())
            .map_err(|e| CheckoutError::Config(format!("invalid gateway_url: {}", e)))?;
        Ok(url.into())
    }
}
