//! Persists payroll computations: one encrypted payroll row plus one funding
//! snapshot per active allocation, all inside a single transaction.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::funding::AllocationSpan;
use super::payroll_calc::{
    Adjustments, AllocationInput, FundingSource, PayPeriod, PayrollComputation, PayrollLine,
    SalaryTerms, compute_payroll,
};
use crate::error::{AppError, AppResult};
use crate::model::employment::{EMPLOYMENT_COLUMNS, Employment};
use crate::model::funding_allocation::{AllocationStatus, AllocationType};
use crate::utils::cipher::SalaryCipher;

/// Allocation joined with whatever is left of its grant and grant item.
#[derive(Debug, sqlx::FromRow)]
struct AllocationSourceRow {
    id: u64,
    allocation_type: String,
    grant_item_id: Option<u64>,
    allocation_grant_id: Option<u64>,
    item_grant_id: Option<u64>,
    fte: f64,
    status: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    grant_code: Option<String>,
    grant_name: Option<String>,
    budgetline_code: Option<String>,
    grant_position: Option<String>,
}

impl AllocationSourceRow {
    fn into_input(self, position_title: &str) -> AppResult<AllocationInput> {
        let status = self.status.parse::<AllocationStatus>().map_err(|_| {
            AppError::Internal(format!("allocation {} has unknown status", self.id))
        })?;
        let allocation_type = self.allocation_type.parse::<AllocationType>().map_err(|_| {
            AppError::Internal(format!("allocation {} has unknown type", self.id))
        })?;

        let grant_id = self.item_grant_id.or(self.allocation_grant_id);
        let source = match (allocation_type, self.grant_code, self.grant_name) {
            (AllocationType::Grant, _, _) if self.grant_item_id.is_none() => None,
            (_, Some(grant_code), Some(grant_name)) => Some(FundingSource {
                allocation_type,
                grant_item_id: self.grant_item_id,
                grant_id,
                grant_code,
                grant_name,
                budgetline_code: self.budgetline_code,
                grant_position: match allocation_type {
                    AllocationType::Grant => self.grant_position,
                    AllocationType::OrgFunded => Some(position_title.to_string()),
                },
            }),
            _ => None,
        };

        Ok(AllocationInput {
            span: AllocationSpan {
                id: Some(self.id),
                fte: self.fte,
                status,
                start_date: self.start_date,
                end_date: self.end_date,
            },
            source,
        })
    }
}

/// An employment with everything payroll needs to price it.
pub struct PayrollContext {
    pub employment: Employment,
    pub allocations: Vec<AllocationInput>,
}

impl PayrollContext {
    pub fn terms(&self) -> SalaryTerms {
        SalaryTerms {
            pass_probation_salary: self.employment.pass_probation_salary,
            probation_salary: self.employment.probation_salary,
            probation_pass_date: self.employment.probation_pass_date,
            pvd: self.employment.pvd,
        }
    }
}

/// Loads the employment (locking it when `for_update`) and its allocations.
pub async fn load_context(
    conn: &mut MySqlConnection,
    employment_id: u64,
    for_update: bool,
) -> AppResult<PayrollContext> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let employment = sqlx::query_as::<_, Employment>(&format!(
        "SELECT {EMPLOYMENT_COLUMNS} FROM employments WHERE id = ?{lock}"
    ))
    .bind(employment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Employment"))?;

    let employee_active = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM employees WHERE id = ? AND deleted_at IS NULL)",
    )
    .bind(employment.employee_id)
    .fetch_one(&mut *conn)
    .await?;
    if !employee_active {
        return Err(AppError::not_found("Employee"));
    }

    let position_title = sqlx::query_scalar::<_, String>("SELECT title FROM positions WHERE id = ?")
        .bind(employment.position_id)
        .fetch_optional(&mut *conn)
        .await?
        .unwrap_or_default();

    let rows = sqlx::query_as::<_, AllocationSourceRow>(
        r#"
        SELECT efa.id, efa.allocation_type, efa.grant_item_id,
               efa.grant_id AS allocation_grant_id, gi.grant_id AS item_grant_id,
               efa.fte, efa.status, efa.start_date, efa.end_date,
               g.code AS grant_code, g.name AS grant_name,
               gi.budgetline_code, gi.grant_position
        FROM employee_funding_allocations efa
        LEFT JOIN grant_items gi ON gi.id = efa.grant_item_id
        LEFT JOIN grants g
               ON g.id = COALESCE(gi.grant_id, efa.grant_id) AND g.deleted_at IS NULL
        WHERE efa.employment_id = ?
        ORDER BY efa.id
        "#,
    )
    .bind(employment_id)
    .fetch_all(&mut *conn)
    .await?;

    let allocations = rows
        .into_iter()
        .map(|row| row.into_input(&position_title))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(PayrollContext {
        employment,
        allocations,
    })
}

/// Values copied into `payroll_grant_allocations` for one payroll line.
/// Owned copies, so later edits to the grant or allocation never reach it.
#[derive(Debug, Clone, PartialEq)]
struct GrantSnapshot {
    allocation_id: u64,
    grant_item_id: Option<u64>,
    grant_id: Option<u64>,
    allocation_type: AllocationType,
    grant_code: String,
    grant_name: String,
    budgetline_code: Option<String>,
    grant_position: Option<String>,
    fte: f64,
    allocated_amount: f64,
}

impl GrantSnapshot {
    fn capture(line: &PayrollLine) -> Self {
        let source = &line.source;
        Self {
            allocation_id: line.allocation_id,
            grant_item_id: source.grant_item_id,
            grant_id: source.grant_id,
            allocation_type: source.allocation_type,
            grant_code: source.grant_code.clone(),
            grant_name: source.grant_name.clone(),
            budgetline_code: source.budgetline_code.clone(),
            grant_position: source.grant_position.clone(),
            fte: line.fte,
            allocated_amount: line.gross_salary_by_fte,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedPayroll {
    pub employment_id: u64,
    pub payroll_ids: Vec<u64>,
    pub computation: PayrollComputation,
}

/// Computes without writing anything.
pub async fn preview_payroll(
    pool: &MySqlPool,
    employment_id: u64,
    pay_period_date: NaiveDate,
    adjustments: Adjustments,
    pvd_rate: f64,
) -> AppResult<PayrollComputation> {
    let period = PayPeriod::containing(pay_period_date)?;
    let mut conn = pool.acquire().await?;
    let context = load_context(&mut conn, employment_id, false).await?;
    Ok(compute_payroll(
        &context.terms(),
        &context.allocations,
        period,
        adjustments,
        pvd_rate,
    )?)
}

/// One employment's payroll for the month containing `pay_period_date`.
#[derive(Debug, Clone)]
pub struct PayrollRequest {
    pub employment_id: u64,
    pub pay_period_date: NaiveDate,
    pub adjustments: Adjustments,
    pub notes: Option<String>,
}

#[instrument(
    name = "payroll_create",
    skip(pool, cipher, request),
    fields(employment_id = request.employment_id, period = %request.pay_period_date)
)]
pub async fn create_payroll_for_employment(
    pool: &MySqlPool,
    cipher: &SalaryCipher,
    request: &PayrollRequest,
    pvd_rate: f64,
    actor: &str,
) -> AppResult<CreatedPayroll> {
    let employment_id = request.employment_id;
    let period = PayPeriod::containing(request.pay_period_date)?;
    let mut tx = pool.begin().await?;

    let context = load_context(&mut tx, employment_id, true).await?;

    let existing = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM payrolls
        WHERE employment_id = ? AND pay_period_date = ? AND deleted_at IS NULL
        "#,
    )
    .bind(employment_id)
    .bind(period.start)
    .fetch_one(&mut *tx)
    .await?;
    if existing > 0 {
        return Err(AppError::Conflict(format!(
            "Payroll for employment {} already exists for {}",
            employment_id,
            period.start.format("%Y-%m")
        )));
    }

    let computation = compute_payroll(
        &context.terms(),
        &context.allocations,
        period,
        request.adjustments,
        pvd_rate,
    )?;

    let base_salary = cipher.encrypt_amount(computation.base_salary)?;
    let mut payroll_ids = Vec::with_capacity(computation.lines.len());

    for line in &computation.lines {
        let payroll_id = sqlx::query(
            r#"
            INSERT INTO payrolls (
                employment_id, employee_id, employee_funding_allocation_id, pay_period_date,
                salary_basis, base_salary, gross_salary_by_fte, bonus, deductions,
                pvd_employee, net_salary, notes, created_by, updated_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(employment_id)
        .bind(context.employment.employee_id)
        .bind(line.allocation_id)
        .bind(period.start)
        .bind(computation.salary_basis.as_ref())
        .bind(&base_salary)
        .bind(cipher.encrypt_amount(line.gross_salary_by_fte)?)
        .bind(cipher.encrypt_amount(line.bonus)?)
        .bind(cipher.encrypt_amount(line.deductions)?)
        .bind(cipher.encrypt_amount(line.pvd_employee)?)
        .bind(cipher.encrypt_amount(line.net_salary)?)
        .bind(request.notes.as_deref())
        .bind(actor)
        .bind(actor)
        .execute(&mut *tx)
        .await?
        .last_insert_id();

        let snapshot = GrantSnapshot::capture(line);
        sqlx::query(
            r#"
            INSERT INTO payroll_grant_allocations (
                payroll_id, employee_funding_allocation_id, grant_item_id, grant_id,
                allocation_type, grant_code, grant_name, budgetline_code, grant_position,
                fte, allocated_amount
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payroll_id)
        .bind(snapshot.allocation_id)
        .bind(snapshot.grant_item_id)
        .bind(snapshot.grant_id)
        .bind(snapshot.allocation_type.as_ref())
        .bind(&snapshot.grant_code)
        .bind(&snapshot.grant_name)
        .bind(&snapshot.budgetline_code)
        .bind(&snapshot.grant_position)
        .bind(snapshot.fte)
        .bind(snapshot.allocated_amount)
        .execute(&mut *tx)
        .await?;

        payroll_ids.push(payroll_id);
    }

    tx.commit().await?;

    info!(
        employment_id,
        payrolls = payroll_ids.len(),
        "Payroll created"
    );

    Ok(CreatedPayroll {
        employment_id,
        payroll_ids,
        computation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payroll_calc::PayrollError;

    fn row(allocation_type: &str) -> AllocationSourceRow {
        AllocationSourceRow {
            id: 4,
            allocation_type: allocation_type.into(),
            grant_item_id: Some(20),
            allocation_grant_id: None,
            item_grant_id: Some(3),
            fte: 0.5,
            status: "active".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: None,
            grant_code: Some("S0031".into()),
            grant_name: Some("Maternal health".into()),
            budgetline_code: Some("BL-7".into()),
            grant_position: Some("Midwife".into()),
        }
    }

    #[test]
    fn grant_allocation_takes_grant_id_from_item() {
        let input = row("grant").into_input("Nurse").unwrap();
        let source = input.source.unwrap();
        assert_eq!(source.grant_id, Some(3));
        assert_eq!(source.grant_position.as_deref(), Some("Midwife"));
        assert_eq!(source.budgetline_code.as_deref(), Some("BL-7"));
    }

    #[test]
    fn org_funded_allocation_uses_position_title() {
        let mut r = row("org_funded");
        r.grant_item_id = None;
        r.item_grant_id = None;
        r.allocation_grant_id = Some(1);
        r.budgetline_code = None;
        r.grant_position = None;
        let source = r.into_input("Nurse").unwrap().source.unwrap();
        assert_eq!(source.grant_id, Some(1));
        assert_eq!(source.grant_position.as_deref(), Some("Nurse"));
    }

    #[test]
    fn missing_grant_leaves_no_source() {
        let mut r = row("grant");
        r.grant_code = None;
        r.grant_name = None;
        assert!(r.into_input("Nurse").unwrap().source.is_none());

        let mut r = row("grant");
        r.grant_item_id = None;
        assert!(r.into_input("Nurse").unwrap().source.is_none());
    }

    fn terms() -> SalaryTerms {
        SalaryTerms {
            pass_probation_salary: 40_000.0,
            probation_salary: None,
            probation_pass_date: None,
            pvd: false,
        }
    }

    #[test]
    fn each_payroll_line_gets_one_snapshot_of_its_source() {
        let mut second = row("org_funded");
        second.id = 5;
        second.grant_item_id = None;
        second.item_grant_id = None;
        second.allocation_grant_id = Some(1);
        second.grant_code = Some("HUB".into());
        second.grant_name = Some("Hub grant".into());
        second.budgetline_code = None;
        second.grant_position = None;

        let inputs = vec![
            row("grant").into_input("Nurse").unwrap(),
            second.into_input("Nurse").unwrap(),
        ];
        let period = PayPeriod::containing(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()).unwrap();
        let computation =
            compute_payroll(&terms(), &inputs, period, Adjustments::default(), 0.075).unwrap();
        let snapshots: Vec<GrantSnapshot> = computation.lines.iter().map(GrantSnapshot::capture).collect();

        assert_eq!(snapshots.len(), computation.lines.len());
        assert_eq!(snapshots[0].allocation_id, 4);
        assert_eq!(snapshots[0].grant_code, "S0031");
        assert_eq!(snapshots[0].budgetline_code.as_deref(), Some("BL-7"));
        assert_eq!(snapshots[0].allocated_amount, 20_000.0);
        assert_eq!(snapshots[1].allocation_id, 5);
        assert_eq!(snapshots[1].grant_position.as_deref(), Some("Nurse"));
        assert_eq!(snapshots[1].allocation_type, AllocationType::OrgFunded);
    }

    #[test]
    fn snapshot_outlives_its_deleted_source() {
        let inputs = vec![row("grant").into_input("Nurse").unwrap()];
        let period = PayPeriod::containing(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()).unwrap();
        let computation =
            compute_payroll(&terms(), &inputs, period, Adjustments::default(), 0.075).unwrap();
        let captured = GrantSnapshot::capture(&computation.lines[0]);
        let before = captured.clone();

        // The grant is deleted afterwards: the source no longer resolves and
        // a new run cannot charge it, but the captured values stand.
        let mut gone = row("grant");
        gone.grant_code = None;
        gone.grant_name = None;
        let rerun = compute_payroll(
            &terms(),
            &[gone.into_input("Nurse").unwrap()],
            period,
            Adjustments::default(),
            0.075,
        );
        assert!(matches!(rerun, Err(PayrollError::MissingFundingSource(4))));
        assert_eq!(captured, before);
        assert_eq!(captured.grant_name, "Maternal health");
    }

    #[test]
    fn snapshot_table_keeps_one_row_per_payroll_and_survives_source_deletes() {
        let schema = include_str!("../../migrations/20250101000005_create_payroll_tables.sql");
        let table = schema
            .split("CREATE TABLE IF NOT EXISTS payroll_grant_allocations")
            .nth(1)
            .and_then(|rest| rest.split("CREATE TABLE").next())
            .unwrap();
        assert!(table.contains("payroll_id BIGINT UNSIGNED NOT NULL UNIQUE"));
        assert!(table.contains("REFERENCES payrolls (id) ON DELETE CASCADE"));
        for source in ["employee_funding_allocations (id)", "grant_items (id)", "grants (id)"] {
            assert!(
                table.contains(&format!("REFERENCES {source} ON DELETE SET NULL")),
                "{source} must not cascade into snapshots"
            );
        }
    }

    #[test]
    fn unknown_status_is_an_internal_error() {
        let mut r = row("grant");
        r.status = "archived".into();
        assert!(matches!(r.into_input("Nurse"), Err(AppError::Internal(_))));
    }
}
