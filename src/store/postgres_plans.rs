use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_postgres::Row;

use crate::catalog::{Plan, PlanStore, PlanType};
use crate::error::CheckoutError;
use crate::store::postgres_store::PgStore;

// price / features 在库里是 numeric / jsonb，统一转成文本再解析
const PLAN_SELECT: &str = "SELECT type, name, price::text, description, COALESCE(features::text, '[]'), is_active FROM membership_plans";

fn plan_from_row(row: &Row) -> Result<Option<Plan>, CheckoutError> {
    let raw_type: String = row.try_get(0)?;
    let Some(plan_type) = PlanType::parse(&raw_type) else {
        tracing::warn!("skipping unknown plan type in catalog: {}", raw_type);
        return Ok(None);
    };
    let price: String = row.try_get(2)?;
    let price = Decimal::from_str(&price)
        .map_err(|e| CheckoutError::Config(format!("invalid price for {}: {}", raw_type, e)))?;
    let features: String = row.try_get(4)?;
    let features: Vec<String> = serde_json::from_str(&features)
        .map_err(|e| CheckoutError::Internal(format!("invalid features for {}: {}", raw_type, e)))?;
    Ok(Some(Plan {
        plan_type,
        name: row.try_get(1)?,
        price,
        description: row.try_get(3)?,
        features,
        is_active: row.try_get(5)?,
    }))
}

#[async_trait]
impl PlanStore for PgStore {
    async fn list_active_plans(&self) -> Result<Vec<Plan>, CheckoutError> {
        let client = self.pool.pick();
        let rows = client
            .query(
                &format!("{} WHERE is_active = true ORDER BY price", PLAN_SELECT),
                &[],
            )
            .await?;
        let mut plans = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(plan) = plan_from_row(row)? {
                plans.push(plan);
            }
        }
        Ok(plans)
    }

    async fn find_active_plan(&self, plan_type: PlanType) -> Result<Option<Plan>, CheckoutError> {
        let client = self.pool.pick();
        let row = client
            .query_opt(
                &format!("{} WHERE type = $1 AND is_active = true", PLAN_SELECT),
                &[&plan_type.as_str()],
            )
            .await?;
        match row {
            Some(row) => plan_from_row(&row),
            None => Ok(None),
        }
    }
}
