use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, OptionalExtension};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::catalog::{PlanType, format_money};
use crate::error::CheckoutError;
use crate::orders::{NewOrder, Order, OrderStatus, OrderStore, PaidTransition};
use crate::store::database::SqliteStore;
use crate::store::time::{parse_datetime_string, to_beijing_string};

const ORDER_COLUMNS: &str =
    "id, order_no, user_id, plan_type, amount, status, trade_no, created_at, updated_at";

type OrderRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
);

fn read_order_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn order_from_row(raw: OrderRow) -> Result<Order, CheckoutError> {
    let (id, order_no, user_id, plan_type, amount, status, trade_no, created_at, updated_at) = raw;
    Ok(Order {
        plan_type: PlanType::parse(&plan_type)
            .ok_or_else(|| CheckoutError::Config(format!("order {} has unknown plan {}", order_no, plan_type)))?,
        amount: Decimal::from_str(&amount)
            .map_err(|e| CheckoutError::Config(format!("order {} has invalid amount: {}", order_no, e)))?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| CheckoutError::Config(format!("order {} has unknown status {}", order_no, status)))?,
        created_at: parse_datetime_string(&created_at)?,
        updated_at: parse_datetime_string(&updated_at)?,
        id,
        order_no,
        user_id,
        trade_no,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

impl SqliteStore {
    async fn fetch_order(&self, order_no: &str) -> Result<Option<Order>, CheckoutError> {
        let row: Option<OrderRow> = {
            let conn = self.connection.lock().await;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM orders WHERE order_no = ?1",
                ORDER_COLUMNS
            ))?;
            stmt.query_row([order_no], read_order_row).optional()?
        };
        row.map(order_from_row).transpose()
    }
}

#[cfg(test)]
impl SqliteStore {
    /// 待人工对账的开通失败记录：(order_no, reason)
    pub async fn list_activation_failures(&self) -> Result<Vec<(String, String)>, CheckoutError> {
        let conn = self.connection.lock().await;
        let mut stmt =
            conn.prepare("SELECT order_no, reason FROM activation_failures ORDER BY id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl OrderStore for SqliteStore {
    async fn insert_pending(&self, order: &NewOrder) -> Result<Option<Order>, CheckoutError> {
        let now = Utc::now();
        let now_s = to_beijing_string(&now);
        let inserted = {
            let conn = self.connection.lock().await;
            conn.execute(
                "INSERT INTO orders (order_no, user_id, plan_type, amount, status, trade_no, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
                rusqlite::params![
                    &order.order_no,
                    &order.user_id,
                    order.plan_type.as_str(),
                    format_money(order.amount),
                    OrderStatus::Pending.as_str(),
                    &now_s,
                ],
            )
        };
        match inserted {
            Ok(_) => self.fetch_order(&order.order_no).await,
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_order(&self, order_no: &str) -> Result<Option<Order>, CheckoutError> {
        self.fetch_order(order_no).await
    }

    async fn mark_paid_if_pending(
        &self,
        order_no: &str,
        trade_no: &str,
        at: DateTime<Utc>,
    ) -> Result<PaidTransition, CheckoutError> {
        let changed = {
            let conn = self.connection.lock().await;
            conn.execute(
                "UPDATE orders SET status = ?1, trade_no = ?2, updated_at = ?3
                 WHERE order_no = ?4 AND status = ?5",
                rusqlite::params![
                    OrderStatus::Paid.as_str(),
                    trade_no,
                    to_beijing_string(&at),
                    order_no,
                    OrderStatus::Pending.as_str(),
                ],
            )?
        };

        let Some(order) = self.fetch_order(order_no).await? else {
            return Ok(PaidTransition::NotFound);
        };
        if changed == 1 {
            Ok(PaidTransition::Transitioned(order))
        } else if order.status == OrderStatus::Paid {
            Ok(PaidTransition::AlreadyPaid(order))
        } else {
            Err(CheckoutError::Config(format!(
                "order {} could not transition from {}",
                order_no,
                order.status.as_str()
            )))
        }
    }

    async fn record_activation_failure(
        &self,
        order: &Order,
        reason: &str,
    ) -> Result<(), CheckoutError> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO activation_failures (order_id, order_no, user_id, plan_type, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                order.id,
                &order.order_no,
                &order.user_id,
                order.plan_type.as_str(),
                reason,
                to_beijing_string(&Utc::now()),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn new_order(no: &str) -> NewOrder {
        NewOrder {
            order_no: no.into(),
            user_id: "user-1".into(),
            plan_type: PlanType::Annual,
            amount: dec!(99),
        }
    }

    #[tokio::test]
    async fn insert_then_get_pending() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let order = store
            .insert_pending(&new_order("order_1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount, dec!(99.00));
        assert!(order.trade_no.is_none());

        let fetched = store.get_order("order_1").await.unwrap().unwrap();
        assert_eq!(fetched.id, order.id);
        assert_eq!(fetched.user_id, "user-1");
    }

    #[tokio::test]
    async fn duplicate_order_no_reports_collision() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        assert!(store.insert_pending(&new_order("dup")).await.unwrap().is_some());
        assert!(store.insert_pending(&new_order("dup")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_update_transitions_once() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        store.insert_pending(&new_order("o1")).await.unwrap();

        let first = store
            .mark_paid_if_pending("o1", "T100", Utc::now())
            .await
            .unwrap();
        let PaidTransition::Transitioned(order) = first else {
            panic!("expected transition, got {:?}", first);
        };
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.trade_no.as_deref(), Some("T100"));

        let second = store
            .mark_paid_if_pending("o1", "T999", Utc::now())
            .await
            .unwrap();
        let PaidTransition::AlreadyPaid(order) = second else {
            panic!("expected already paid, got {:?}", second);
        };
        assert_eq!(order.trade_no.as_deref(), Some("T100"));
    }

    #[tokio::test]
    async fn conditional_update_on_missing_order() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let res = store
            .mark_paid_if_pending("nope", "T1", Utc::now())
            .await
            .unwrap();
        assert!(matches!(res, PaidTransition::NotFound));
    }

    #[tokio::test]
    async fn activation_failures_are_recorded() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let order = store
            .insert_pending(&new_order("o2"))
            .await
            .unwrap()
            .unwrap();
        store
            .record_activation_failure(&order, "rpc timeout")
            .await
            .unwrap();
        let rows = store.list_activation_failures().await.unwrap();
        assert_eq!(rows, vec![("o2".to_string(), "rpc timeout".to_string())]);
    }
}
