use async_trait::async_trait;

use crate::catalog::PlanType;
use crate::entitlement::EntitlementActivator;
use crate::error::CheckoutError;
use crate::store::postgres_store::PgStore;

/// 调用外部维护的 `activate_membership(user_id, plan_type, order_id)` 存储过程，返回 boolean
#[async_trait]
impl EntitlementActivator for PgStore {
    async fn activate(
        &self,
        user_id: &str,
        plan_type: PlanType,
        order_id: i64,
    ) -> Result<(), CheckoutError> {
        let client = self.pool.pick();
        let row = client
            .query_one(
                "SELECT activate_membership($1::text, $2::text, $3::bigint)",
                &[&user_id, &plan_type.as_str(), &order_id],
            )
            .await
            .map_err(|e| CheckoutError::ActivationFailed(e.to_string()))?;
        let ok: bool = row
            .try_get(0)
            .map_err(|e| CheckoutError::ActivationFailed(e.to_string()))?;
        if ok {
            Ok(())
        } else {
            Err(CheckoutError::ActivationFailed(format!(
                "activate_membership returned false for order {}",
                order_id
            )))
        }
    }
}
