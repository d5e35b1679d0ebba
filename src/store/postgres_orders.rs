use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_postgres::Row;

use crate::catalog::{PlanType, format_money};
use crate::error::CheckoutError;
use crate::orders::{NewOrder, Order, OrderStatus, OrderStore, PaidTransition};
use crate::store::postgres_store::PgStore;

const ORDER_RETURNING: &str =
    "id, order_no, user_id, plan_type, amount::text, status, trade_no, created_at, updated_at";

fn order_from_row(row: &Row) -> Result<Order, CheckoutError> {
    let order_no: String = row.try_get(1)?;
    let plan_type: String = row.try_get(3)?;
    let amount: String = row.try_get(4)?;
    let status: String = row.try_get(5)?;
    Ok(Order {
        id: row.try_get(0)?,
        plan_type: PlanType::parse(&plan_type)
            .ok_or_else(|| CheckoutError::Config(format!("order {} has unknown plan {}", order_no, plan_type)))?,
        amount: Decimal::from_str(&amount)
            .map_err(|e| CheckoutError::Config(format!("order {} has invalid amount: {}", order_no, e)))?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| CheckoutError::Config(format!("order {} has unknown status {}", order_no, status)))?,
        user_id: row.try_get(2)?,
        trade_no: row.try_get(6)?,
        created_at: row.try_get(7)?,
        updated_at: row.try_get(8)?,
        order_no,
    })
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_pending(&self, order: &NewOrder) -> Result<Option<Order>, CheckoutError> {
        let now = Utc::now();
        let amount = format_money(order.amount);
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!(
                    "INSERT INTO orders (order_no, user_id, plan_type, amount, status, created_at, updated_at)
                     VALUES ($1, $2, $3, $4::text::numeric, $5, $6, $6)
                     ON CONFLICT (order_no) DO NOTHING
                     RETURNING {}",
                    ORDER_RETURNING
                ),
                &[
                    &order.order_no,
                    &order.user_id,
                    &order.plan_type.as_str(),
                    &amount,
                    &OrderStatus::Pending.as_str(),
                    &now,
                ],
            )
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn get_order(&self, order_no: &str) -> Result<Option<Order>, CheckoutError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("SELECT {} FROM orders WHERE order_no = $1", ORDER_RETURNING),
                &[&order_no],
            )
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn mark_paid_if_pending(
        &self,
        order_no: &str,
        trade_no: &str,
        at: DateTime<Utc>,
    ) -> Result<PaidTransition, CheckoutError> {
        let client = self.pool.pick();
        let updated = client
            .query_opt(
                &format!(
                    "UPDATE orders SET status = $1, trade_no = $2, updated_at = $3
                     WHERE order_no = $4 AND status = $5
                     RETURNING {}",
                    ORDER_RETURNING
                ),
                &[
                    &OrderStatus::Paid.as_str(),
                    &trade_no,
                    &at,
                    &order_no,
                    &OrderStatus::Pending.as_str(),
                ],
            )
            .await?;
        if let Some(row) = updated {
            return Ok(PaidTransition::Transitioned(order_from_row(&row)?));
        }

        match self.get_order(order_no).await? {
            None => Ok(PaidTransition::NotFound),
            Some(order) if order.status == OrderStatus::Paid => Ok(PaidTransition::AlreadyPaid(order)),
            Some(order) => Err(CheckoutError::Config(format!(
                "order {} could not transition from {}",
                order_no,
                order.status.as_str()
            ))),
        }
    }

    async fn record_activation_failure(
        &self,
        order: &Order,
        reason: &str,
    ) -> Result<(), CheckoutError> {
        let client = self.pool.pick();
        client
            .execute(
                "INSERT INTO activation_failures (order_id, order_no, user_id, plan_type, reason, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &order.id,
                    &order.order_no,
                    &order.user_id,
                    &order.plan_type.as_str(),
                    &reason,
                    &Utc::now(),
                ],
            )
            .await?;
        Ok(())
    }
}
