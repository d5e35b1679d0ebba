use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;

use crate::catalog::PlanType;
use crate::entitlement::{EntitlementActivator, Membership, resolve_grant};
use crate::error::CheckoutError;
use crate::store::database::SqliteStore;
use crate::store::time::{parse_datetime_string, to_beijing_string};

type MembershipRow = (String, String, i64, String, Option<String>);

fn membership_from_row(raw: MembershipRow) -> Result<Membership, CheckoutError> {
    let (user_id, plan_type, order_id, activated_at, expires_at) = raw;
    Ok(Membership {
        plan_type: PlanType::parse(&plan_type)
            .ok_or_else(|| CheckoutError::Config(format!("unknown plan type {}", plan_type)))?,
        activated_at: parse_datetime_string(&activated_at)?,
        expires_at: expires_at
            .as_deref()
            .map(parse_datetime_string)
            .transpose()?,
        user_id,
        order_id,
    })
}

fn load_membership(
    conn: &rusqlite::Connection,
    user_id: &str,
) -> Result<Option<Membership>, CheckoutError> {
    let row: Option<MembershipRow> = conn
        .query_row(
            "SELECT user_id, plan_type, order_id, activated_at, expires_at
             FROM user_memberships WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?;
    row.map(membership_from_row).transpose()
}

#[cfg(test)]
impl SqliteStore {
    pub async fn get_membership(&self, user_id: &str) -> Result<Option<Membership>, CheckoutError> {
        let conn = self.connection.lock().await;
        load_membership(&conn, user_id)
    }
}

/// 单机部署时的会员开通实现：在一个事务内完成，等价于 Postgres 上的 `activate_membership` 存储过程。
/// 同一订单重复调用不会重复发放。
#[async_trait]
impl EntitlementActivator for SqliteStore {
    async fn activate(
        &self,
        user_id: &str,
        plan_type: PlanType,
        order_id: i64,
    ) -> Result<(), CheckoutError> {
        let now = Utc::now();
        let now_s = to_beijing_string(&now);
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;

        let granted = tx.execute(
            "INSERT OR IGNORE INTO membership_grants (order_id, user_id, plan_type, granted_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![order_id, user_id, plan_type.as_str(), &now_s],
        )?;
        if granted == 0 {
            tracing::info!(order_id, user_id, "membership already granted for order");
            return Ok(());
        }

        let current = load_membership(&tx, user_id)?;
        // 已有更高（或同级）永久会员时只记录订单号
        let (effective_plan, expires_at) = resolve_grant(current.as_ref(), plan_type, now);

        tx.execute(
            "INSERT INTO user_memberships (user_id, plan_type, order_id, activated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                plan_type = excluded.plan_type,
                order_id = excluded.order_id,
                activated_at = excluded.activated_at,
                expires_at = excluded.expires_at",
            rusqlite::params![
                user_id,
                effective_plan.as_str(),
                order_id,
                &now_s,
                expires_at.as_ref().map(to_beijing_string),
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            order_id,
            user_id,
            plan = effective_plan.as_str(),
            "membership activated"
        );
        Ok(())
    }
}
