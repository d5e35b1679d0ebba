use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::crypto::{RequestSigner, mask_key};
use crate::entitlement::EntitlementActivator;
use crate::error::{CheckoutError, Result};
use crate::orders::{Order, OrderStore, PaidTransition};
use crate::payment::notification::SettlementNotification;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// pending -> paid，会员已开通
    Settled { order_no: String },
    /// pending -> paid，但会员开通失败，已记录待人工处理
    ActivationDeferred { order_no: String },
    /// 重复通知，订单早已是 paid
    AlreadySettled { order_no: String },
    /// 非成功状态，只确认收到
    Ignored { trade_status: String },
}

/// 异步通知处理：验签 -> 状态过滤 -> 条件更新 -> 开通会员
pub struct SettlementReceiver {
    merchant_id: String,
    orders: Arc<dyn OrderStore>,
    activator: Arc<dyn EntitlementActivator>,
    signer: RequestSigner,
}

impl SettlementReceiver {
    pub fn new(
        merchant_id: impl Into<String>,
        orders: Arc<dyn OrderStore>,
        activator: Arc<dyn EntitlementActivator>,
        signer: RequestSigner,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            orders,
            activator,
            signer,
        }
    }

    pub async fn receive(&self, fields: &HashMap<String, String>) -> Result<SettlementOutcome> {
        let notification = SettlementNotification::from_fields(fields)?;

        if !self.signer.verify(&notification.signed, &notification.sign) {
            tracing::warn!(
                out_trade_no = %notification.out_trade_no,
                sign = %mask_key(&notification.sign),
                "settlement notification rejected: signature mismatch"
            );
            return Err(CheckoutError::SignatureInvalid("signature mismatch".into()));
        }

        // 签名只证明持有密钥；pid 仍须是本商户
        if notification.merchant_id != self.merchant_id {
            tracing::warn!(
                out_trade_no = %notification.out_trade_no,
                pid = %notification.merchant_id,
                "settlement notification rejected: merchant id mismatch"
            );
            return Err(CheckoutError::SignatureInvalid("merchant id mismatch".into()));
        }

        if !notification.is_trade_success() {
            tracing::info!(
                out_trade_no = %notification.out_trade_no,
                trade_status = %notification.trade_status,
                "settlement notification acknowledged without action"
            );
            return Ok(SettlementOutcome::Ignored {
                trade_status: notification.trade_status,
            });
        }

        let transition = self
            .orders
            .mark_paid_if_pending(&notification.out_trade_no, &notification.trade_no, Utc::now())
            .await?;

        match transition {
            PaidTransition::NotFound => {
                tracing::error!(
                    out_trade_no = %notification.out_trade_no,
                    trade_no = %notification.trade_no,
                    "verified settlement for unknown order"
                );
                Err(CheckoutError::OrderNotFound(notification.out_trade_no))
            }
            PaidTransition::AlreadyPaid(order) => {
                tracing::info!(order_no = %order.order_no, "duplicate settlement notification");
                Ok(SettlementOutcome::AlreadySettled {
                    order_no: order.order_no,
                })
            }
            PaidTransition::Transitioned(order) => {
                warn_on_amount_mismatch(&order, &notification);
                Ok(self.activate(order).await)
            }
        }
    }

    /// 开通失败不回滚订单状态，也不向网关报错（重试只会被幂等门拦下），只留对账记录
    async fn activate(&self, order: Order) -> SettlementOutcome {
        match self
            .activator
            .activate(&order.user_id, order.plan_type, order.id)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    order_no = %order.order_no,
                    user_id = %order.user_id,
                    plan = order.plan_type.as_str(),
                    "order settled"
                );
                SettlementOutcome::Settled {
                    order_no: order.order_no,
                }
            }
            Err(e) => {
                tracing::error!(
                    order_no = %order.order_no,
                    order_id = order.id,
                    user_id = %order.user_id,
                    plan = order.plan_type.as_str(),
                    "membership activation failed, manual reconciliation required: {}",
                    e
                );
                if let Err(record_err) = self
                    .orders
                    .record_activation_failure(&order, &e.to_string())
                    .await
                {
                    tracing::error!(
                        order_no = %order.order_no,
                        "failed to record activation failure: {}",
                        record_err
                    );
                }
                SettlementOutcome::ActivationDeferred {
                    order_no: order.order_no,
                }
            }
        }
    }
}

fn warn_on_amount_mismatch(order: &Order, notification: &SettlementNotification) {
    match Decimal::from_str(&notification.money) {
        Ok(paid) if paid == order.amount => {}
        _ => tracing::warn!(
            order_no = %order.order_no,
            expected = %order.amount,
            received = %notification.money,
            "settled amount differs from order amount"
        ),
    }
}
