//! Soft-deleted employees, grants and payrolls, kept for a retention window
//! before they are hard-deleted.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use strum_macros::{Display, EnumString};
use tracing::{error, info};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrashEntity {
    Employees,
    Grants,
    Payrolls,
}

impl TrashEntity {
    pub const ALL: [TrashEntity; 3] = [
        TrashEntity::Employees,
        TrashEntity::Grants,
        TrashEntity::Payrolls,
    ];

    pub fn table(self) -> &'static str {
        match self {
            TrashEntity::Employees => "employees",
            TrashEntity::Grants => "grants",
            TrashEntity::Payrolls => "payrolls",
        }
    }

    fn label_expr(self) -> &'static str {
        match self {
            TrashEntity::Employees => "CONCAT(staff_id, ' ', first_name)",
            TrashEntity::Grants => "CONCAT(code, ' ', name)",
            TrashEntity::Payrolls => "CONCAT('employment ', employment_id, ' ', DATE_FORMAT(pay_period_date, '%Y-%m'))",
        }
    }

    /// Extra condition keeping rows that others still reference.
    fn purge_guard(self) -> &'static str {
        match self {
            TrashEntity::Employees => {
                " AND NOT EXISTS (SELECT 1 FROM payrolls p WHERE p.employee_id = employees.id)"
            }
            TrashEntity::Grants | TrashEntity::Payrolls => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct TrashedItem {
    pub id: u64,
    pub entity_type: String,
    pub label: Option<String>,
    pub deleted_at: DateTime<Utc>,
}

fn trashed_select(entity: TrashEntity) -> String {
    format!(
        "SELECT id, '{entity}' AS entity_type, {label} AS label, deleted_at FROM {table} \
         WHERE deleted_at IS NOT NULL AND deleted_at >= NOW() - INTERVAL ? DAY",
        label = entity.label_expr(),
        table = entity.table(),
    )
}

/// Soft-deleted rows still inside the retention window, newest first.
pub async fn list_trashed(
    pool: &MySqlPool,
    entity: Option<TrashEntity>,
    retention_days: u32,
) -> AppResult<Vec<TrashedItem>> {
    let entities: Vec<TrashEntity> = match entity {
        Some(e) => vec![e],
        None => TrashEntity::ALL.to_vec(),
    };
    let sql = format!(
        "{} ORDER BY deleted_at DESC",
        entities
            .iter()
            .map(|e| trashed_select(*e))
            .collect::<Vec<_>>()
            .join(" UNION ALL ")
    );

    let mut query = sqlx::query_as::<_, TrashedItem>(&sql);
    for _ in &entities {
        query = query.bind(retention_days);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Moves a live row into the recycle bin.
pub async fn soft_delete(
    pool: &MySqlPool,
    entity: TrashEntity,
    id: u64,
    actor: &str,
) -> AppResult<()> {
    let sql = format!(
        "UPDATE {} SET deleted_at = NOW(), updated_by = ? WHERE id = ? AND deleted_at IS NULL",
        entity.table()
    );
    let result = sqlx::query(&sql).bind(actor).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound {
            entity: entity_label(entity),
        });
    }
    info!(entity = %entity, id, "Moved to recycle bin");
    Ok(())
}

fn entity_label(entity: TrashEntity) -> &'static str {
    match entity {
        TrashEntity::Employees => "Employee",
        TrashEntity::Grants => "Grant",
        TrashEntity::Payrolls => "Payroll",
    }
}

/// Where a payroll line sits: one line per allocation and month.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PayrollSlot {
    pub id: u64,
    pub employment_id: u64,
    pub employee_funding_allocation_id: Option<u64>,
    pub pay_period_date: NaiveDate,
    pub created_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The live line that keeps a trashed payroll line from coming back, if
/// any. A live line for the same allocation and month blocks it, and so
/// does any line of the same employment and month created after the
/// trashed one was deleted (the month was run again).
pub fn restore_conflict<'a>(trashed: &PayrollSlot, live: &'a [PayrollSlot]) -> Option<&'a PayrollSlot> {
    live.iter().find(|l| {
        l.id != trashed.id
            && l.deleted_at.is_none()
            && l.employment_id == trashed.employment_id
            && l.pay_period_date == trashed.pay_period_date
            && ((trashed.employee_funding_allocation_id.is_some()
                && l.employee_funding_allocation_id == trashed.employee_funding_allocation_id)
                || matches!((l.created_at, trashed.deleted_at), (Some(c), Some(d)) if c >= d))
    })
}

const PAYROLL_SLOT_COLUMNS: &str =
    "id, employment_id, employee_funding_allocation_id, pay_period_date, created_at, deleted_at";

/// Locks the employment the way payroll creation does, then refuses the
/// restore when the month has been paid again meanwhile.
async fn ensure_payroll_restorable(
    conn: &mut MySqlConnection,
    id: u64,
    retention_days: u32,
) -> AppResult<()> {
    let trashed = sqlx::query_as::<_, PayrollSlot>(&format!(
        "SELECT {PAYROLL_SLOT_COLUMNS} FROM payrolls \
         WHERE id = ? AND deleted_at IS NOT NULL AND deleted_at >= NOW() - INTERVAL ? DAY"
    ))
    .bind(id)
    .bind(retention_days)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Trashed item"))?;

    sqlx::query("SELECT id FROM employments WHERE id = ? FOR UPDATE")
        .bind(trashed.employment_id)
        .execute(&mut *conn)
        .await?;

    let live = sqlx::query_as::<_, PayrollSlot>(&format!(
        "SELECT {PAYROLL_SLOT_COLUMNS} FROM payrolls \
         WHERE employment_id = ? AND pay_period_date = ? AND deleted_at IS NULL"
    ))
    .bind(trashed.employment_id)
    .bind(trashed.pay_period_date)
    .fetch_all(&mut *conn)
    .await?;

    if let Some(blocking) = restore_conflict(&trashed, &live) {
        return Err(AppError::Conflict(format!(
            "Payroll {} already covers employment {} for {}",
            blocking.id,
            trashed.employment_id,
            trashed.pay_period_date.format("%Y-%m")
        )));
    }
    Ok(())
}

pub async fn restore(
    pool: &MySqlPool,
    entity: TrashEntity,
    id: u64,
    retention_days: u32,
    actor: &str,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    if entity == TrashEntity::Payrolls {
        ensure_payroll_restorable(&mut tx, id, retention_days).await?;
    }

    let sql = format!(
        "UPDATE {} SET deleted_at = NULL, updated_by = ? \
         WHERE id = ? AND deleted_at IS NOT NULL AND deleted_at >= NOW() - INTERVAL ? DAY",
        entity.table()
    );
    let result = sqlx::query(&sql)
        .bind(actor)
        .bind(id)
        .bind(retention_days)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Trashed item"));
    }
    tx.commit().await?;

    info!(entity = %entity, id, "Restored from recycle bin");
    Ok(())
}

/// Hard-deletes one trashed row.
pub async fn purge_one(pool: &MySqlPool, entity: TrashEntity, id: u64) -> AppResult<()> {
    let exists = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ? AND deleted_at IS NOT NULL)",
        entity.table()
    ))
    .bind(id)
    .fetch_one(pool)
    .await?;
    if !exists {
        return Err(AppError::not_found("Trashed item"));
    }

    let sql = format!(
        "DELETE FROM {table} WHERE id = ? AND deleted_at IS NOT NULL{guard}",
        table = entity.table(),
        guard = entity.purge_guard(),
    );
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(format!(
            "{} {} is still referenced by payroll history",
            entity_label(entity),
            id
        )));
    }
    info!(entity = %entity, id, "Purged from recycle bin");
    Ok(())
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct PurgeReport {
    pub employees: u64,
    pub grants: u64,
    pub payrolls: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.employees + self.grants + self.payrolls
    }
}

/// Hard-deletes everything past retention. Payrolls go first so their
/// employees become purgeable in the same pass.
pub async fn purge_expired(pool: &MySqlPool, retention_days: u32) -> AppResult<PurgeReport> {
    let mut report = PurgeReport::default();
    for entity in [TrashEntity::Payrolls, TrashEntity::Grants, TrashEntity::Employees] {
        let sql = format!(
            "DELETE FROM {table} \
             WHERE deleted_at IS NOT NULL AND deleted_at < NOW() - INTERVAL ? DAY{guard}",
            table = entity.table(),
            guard = entity.purge_guard(),
        );
        let purged = sqlx::query(&sql)
            .bind(retention_days)
            .execute(pool)
            .await?
            .rows_affected();
        match entity {
            TrashEntity::Employees => report.employees = purged,
            TrashEntity::Grants => report.grants = purged,
            TrashEntity::Payrolls => report.payrolls = purged,
        }
    }
    Ok(report)
}

/// Background loop; failures are logged and the next tick tries again.
pub async fn run_purge_loop(pool: MySqlPool, retention_days: u32, interval: Duration) {
    loop {
        actix_web::rt::time::sleep(interval).await;
        match purge_expired(&pool, retention_days).await {
            Ok(report) if report.total() > 0 => info!(
                employees = report.employees,
                grants = report.grants,
                payrolls = report.payrolls,
                "Recycle bin purge complete"
            ),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Recycle bin purge failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_are_tables() {
        assert_eq!("payrolls".parse::<TrashEntity>().unwrap(), TrashEntity::Payrolls);
        assert_eq!(TrashEntity::Grants.table(), "grants");
        assert!("users".parse::<TrashEntity>().is_err());
    }

    #[test]
    fn listing_respects_retention_window() {
        let sql = trashed_select(TrashEntity::Employees);
        assert!(sql.starts_with("SELECT id, 'employees' AS entity_type"));
        assert!(sql.contains("FROM employees"));
        assert!(sql.ends_with("deleted_at >= NOW() - INTERVAL ? DAY"));
    }

    fn slot(id: u64, allocation: Option<u64>, created: &str, deleted: Option<&str>) -> PayrollSlot {
        let at = |s: &str| s.parse::<DateTime<Utc>>().unwrap();
        PayrollSlot {
            id,
            employment_id: 7,
            employee_funding_allocation_id: allocation,
            pay_period_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            created_at: Some(at(created)),
            deleted_at: deleted.map(at),
        }
    }

    #[test]
    fn rerun_month_blocks_restoring_the_old_line() {
        let trashed = slot(1, Some(40), "2025-05-31T10:00:00Z", Some("2025-06-02T09:00:00Z"));
        let rerun = [slot(5, Some(40), "2025-06-02T09:30:00Z", None)];
        assert_eq!(restore_conflict(&trashed, &rerun).map(|s| s.id), Some(5));
    }

    #[test]
    fn sibling_line_of_the_same_run_does_not_block() {
        // Lines 1 and 2 were created together; only line 1 was deleted.
        let trashed = slot(1, Some(40), "2025-05-31T10:00:00Z", Some("2025-06-02T09:00:00Z"));
        let sibling = [slot(2, Some(41), "2025-05-31T10:00:00Z", None)];
        assert!(restore_conflict(&trashed, &sibling).is_none());
    }

    #[test]
    fn line_without_allocation_is_blocked_by_a_later_run() {
        let trashed = slot(1, None, "2025-05-31T10:00:00Z", Some("2025-06-02T09:00:00Z"));
        let earlier = [slot(2, Some(41), "2025-05-31T10:00:00Z", None)];
        assert!(restore_conflict(&trashed, &earlier).is_none());

        let later = [slot(9, Some(41), "2025-06-03T08:00:00Z", None)];
        assert_eq!(restore_conflict(&trashed, &later).map(|s| s.id), Some(9));
    }

    #[test]
    fn other_months_and_employments_never_block() {
        let trashed = slot(1, Some(40), "2025-05-31T10:00:00Z", Some("2025-06-02T09:00:00Z"));
        let mut june = slot(5, Some(40), "2025-06-30T09:30:00Z", None);
        june.pay_period_date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut other = slot(6, Some(40), "2025-06-03T09:30:00Z", None);
        other.employment_id = 8;
        assert!(restore_conflict(&trashed, &[june, other]).is_none());
    }

    #[test]
    fn only_employees_are_guarded_by_payroll_history() {
        assert!(TrashEntity::Employees.purge_guard().contains("payrolls"));
        assert!(TrashEntity::Payrolls.purge_guard().is_empty());
    }
}
