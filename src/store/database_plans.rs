use async_trait::async_trait;
use rusqlite::OptionalExtension;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::catalog::{Plan, PlanStore, PlanType};
use crate::error::CheckoutError;
use crate::store::database::SqliteStore;

const PLAN_COLUMNS: &str = "type, name, price, description, features, is_active";

type PlanRow = (String, String, String, Option<String>, String, bool);

fn read_plan_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlanRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn plan_from_row(raw: PlanRow) -> Result<Plan, CheckoutError> {
    let (plan_type, name, price, description, features, is_active) = raw;
    let plan_type = PlanType::parse(&plan_type)
        .ok_or_else(|| CheckoutError::Config(format!("unknown plan type in catalog: {}", plan_type)))?;
    let price = Decimal::from_str(&price)
        .map_err(|e| CheckoutError::Config(format!("invalid price for {}: {}", plan_type.as_str(), e)))?;
    let features = serde_json::from_str::<Vec<String>>(&features).map_err(|e| {
        CheckoutError::Internal(format!("invalid features for {}: {}", plan_type.as_str(), e))
    })?;
    Ok(Plan {
        plan_type,
        name,
        price,
        description,
        features,
        is_active,
    })
}

impl SqliteStore {
    pub async fn upsert_plan(&self, plan: &Plan) -> Result<(), CheckoutError> {
        let features = serde_json::to_string(&plan.features)?;
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO membership_plans (type, name, price, description, features, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(type) DO UPDATE SET
                name = excluded.name,
                price = excluded.price,
                description = excluded.description,
                features = excluded.features,
                is_active = excluded.is_active",
            rusqlite::params![
                plan.plan_type.as_str(),
                &plan.name,
                plan.amount_string(),
                &plan.description,
                &features,
                plan.is_active,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl PlanStore for SqliteStore {
    async fn list_active_plans(&self) -> Result<Vec<Plan>, CheckoutError> {
        let rows: Vec<PlanRow> = {
            let conn = self.connection.lock().await;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM membership_plans WHERE is_active = 1 ORDER BY CAST(price AS REAL)",
                PLAN_COLUMNS
            ))?;
            let iter = stmt.query_map([], read_plan_row)?;
            iter.collect::<rusqlite::Result<Vec<_>>>()?
        };
        rows.into_iter().map(plan_from_row).collect()
    }

    async fn find_active_plan(&self, plan_type: PlanType) -> Result<Option<Plan>, CheckoutError> {
        let row: Option<PlanRow> = {
            let conn = self.connection.lock().await;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM membership_plans WHERE type = ?1 AND is_active = 1",
                PLAN_COLUMNS
            ))?;
            stmt.query_row([plan_type.as_str()], read_plan_row)
                .optional()?
        };
        row.map(plan_from_row).transpose()
    }
}
