use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::employment::{EMPLOYMENT_COLUMNS, Employment, EmploymentStatus},
    model::funding_allocation::{ALLOCATION_COLUMNS, FundingAllocation},
    services::funding::{AllocationSpan, summarize},
    utils::db_utils::{Filters, Updatable, build_update_sql, execute_update, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

const EMPLOYMENTS: Updatable = Updatable {
    table: "employments",
    columns: &[
        "employment_type",
        "start_date",
        "end_date",
        "probation_pass_date",
        "department_id",
        "position_id",
        "section_department_id",
        "site_id",
        "pass_probation_salary",
        "probation_salary",
        "health_welfare",
        "pvd",
        "saving_fund",
        "status",
    ],
    soft_delete: false,
};

fn validate_create(payload: &CreateEmployment) -> Result<(), ValidationError> {
    if payload.end_date.is_some_and(|end| end < payload.start_date) {
        return Err(ValidationError::new("end_before_start")
            .with_message("end_date must not be before start_date".into()));
    }
    Ok(())
}

#[derive(Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_create", skip_on_field_errors = false))]
pub struct CreateEmployment {
    pub employee_id: u64,
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "full_time")]
    pub employment_type: String,
    #[schema(example = "2025-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "2025-04-01", format = "date", value_type = Option<String>)]
    pub probation_pass_date: Option<NaiveDate>,
    pub department_id: u64,
    pub position_id: u64,
    pub section_department_id: Option<u64>,
    pub site_id: Option<u64>,
    #[validate(range(min = 0.0))]
    #[schema(example = 30000.0)]
    pub pass_probation_salary: f64,
    #[validate(range(min = 0.0))]
    #[schema(example = 27000.0)]
    pub probation_salary: Option<f64>,
    #[serde(default)]
    pub health_welfare: bool,
    #[serde(default)]
    pub pvd: bool,
    #[serde(default)]
    pub saving_fund: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmploymentQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    pub department_id: Option<u64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SummaryQuery {
    /// Defaults to today
    #[param(value_type = Option<String>, format = "date")]
    pub as_of: Option<NaiveDate>,
}

/// Row lock shared with allocation changes. Serializes everything that
/// counts an employee's active employments or FTE.
pub(crate) const LOCK_EMPLOYEE_SQL: &str =
    "SELECT id FROM employees WHERE id = ? AND deleted_at IS NULL FOR UPDATE";

async fn lock_employee(conn: &mut MySqlConnection, employee_id: u64) -> AppResult<()> {
    sqlx::query_scalar::<_, u64>(LOCK_EMPLOYEE_SQL)
        .bind(employee_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Employee"))?;
    Ok(())
}

/// Rejects a second active employment for the same employee. Call with the
/// employee row locked.
async fn ensure_single_active(
    conn: &mut MySqlConnection,
    employee_id: u64,
    except: Option<u64>,
) -> AppResult<()> {
    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM employments WHERE employee_id = ? AND status = 'active' AND id <> ?",
    )
    .bind(employee_id)
    .bind(except.unwrap_or(0))
    .fetch_one(&mut *conn)
    .await?;
    if active > 0 {
        return Err(AppError::Conflict(
            "Employee already has an active employment".into(),
        ));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/employments",
    request_body = CreateEmployment,
    responses(
        (status = 201, description = "Employment created"),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee already has an active employment"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Employment",
    security(("bearer_auth" = []))
)]
pub async fn create_employment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployment>,
) -> AppResult<HttpResponse> {
    auth.require("employment.create")?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    lock_employee(&mut tx, payload.employee_id).await?;
    ensure_single_active(&mut tx, payload.employee_id, None).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO employments
        (employee_id, employment_type, start_date, end_date, probation_pass_date, department_id,
         position_id, section_department_id, site_id, pass_probation_salary, probation_salary,
         health_welfare, pvd, saving_fund, status, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.employment_type.trim())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.probation_pass_date)
    .bind(payload.department_id)
    .bind(payload.position_id)
    .bind(payload.section_department_id)
    .bind(payload.site_id)
    .bind(payload.pass_probation_salary)
    .bind(payload.probation_salary)
    .bind(payload.health_welfare)
    .bind(payload.pvd)
    .bind(payload.saving_fund)
    .bind(EmploymentStatus::Active.as_ref())
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(&mut *tx)
    .await?
    .last_insert_id();
    tx.commit().await?;

    info!(employment_id = id, employee_id = payload.employee_id, "Employment created");
    Ok(HttpResponse::Created().json(json!({ "message": "Employment created", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/employments",
    params(EmploymentQuery),
    responses((status = 200, description = "Paginated employment list", body = Object)),
    tag = "Employment",
    security(("bearer_auth" = []))
)]
pub async fn list_employments(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmploymentQuery>,
) -> AppResult<HttpResponse> {
    auth.require("employment.read")?;

    let mut filters = Filters::new();
    filters
        .eq("employee_id", query.employee_id)
        .eq("department_id", query.department_id)
        .eq("status", query.status.clone());

    let page = fetch_page::<Employment>(
        pool.get_ref(),
        EMPLOYMENT_COLUMNS,
        "employments",
        &filters,
        "id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/employments/{id}",
    params(("id", Path, description = "Employment ID")),
    responses(
        (status = 200, description = "Employment found", body = Employment),
        (status = 404, description = "Employment not found")
    ),
    tag = "Employment",
    security(("bearer_auth" = []))
)]
pub async fn get_employment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("employment.read")?;
    let employment = find_by_id::<Employment>(
        pool.get_ref(),
        EMPLOYMENT_COLUMNS,
        "employments",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Employment"))?;
    Ok(HttpResponse::Ok().json(employment))
}

/// Checks the parts of a partial employment update that the whitelist alone
/// cannot: enum values and non-negative salaries.
fn check_update_values(body: &Value) -> AppResult<()> {
    if let Some(status) = body.get("status") {
        let valid = status
            .as_str()
            .is_some_and(|s| s.parse::<EmploymentStatus>().is_ok());
        if !valid {
            return Err(AppError::field("status", "status must be active or inactive"));
        }
    }
    for field in ["pass_probation_salary", "probation_salary"] {
        if let Some(v) = body.get(field) {
            if v.as_f64().is_some_and(|n| n < 0.0) {
                return Err(AppError::field(field, "salary must not be negative"));
            }
        }
    }
    Ok(())
}

#[utoipa::path(
    put,
    path = "/api/v1/employments/{id}",
    params(("id", Path, description = "Employment ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Employment updated"),
        (status = 404, description = "Employment not found"),
        (status = 409, description = "Employee already has an active employment")
    ),
    tag = "Employment",
    security(("bearer_auth" = []))
)]
pub async fn update_employment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("employment.update")?;
    let employment_id = path.into_inner();
    check_update_values(&body)?;

    let update = build_update_sql(&EMPLOYMENTS, &body, employment_id, &auth.username)?;

    let mut tx = pool.begin().await?;
    if body.get("status").and_then(Value::as_str) == Some(EmploymentStatus::Active.as_ref()) {
        let employee_id = sqlx::query_scalar::<_, u64>("SELECT employee_id FROM employments WHERE id = ?")
            .bind(employment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Employment"))?;
        lock_employee(&mut tx, employee_id).await?;
        ensure_single_active(&mut tx, employee_id, Some(employment_id)).await?;
    }
    let affected = execute_update(&mut *tx, update).await?;
    tx.commit().await?;
    updated(affected, "Employment")
}

/// Fails with 409 once payrolls reference the employment.
#[utoipa::path(
    delete,
    path = "/api/v1/employments/{id}",
    params(("id", Path, description = "Employment ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 409, description = "Employment has payroll history")
    ),
    tag = "Employment",
    security(("bearer_auth" = []))
)]
pub async fn delete_employment(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("employment.delete")?;
    hard_delete(pool.get_ref(), "employments", path.into_inner(), "Employment").await
}

pub(crate) async fn allocations_for(
    pool: &MySqlPool,
    employment_id: u64,
) -> Result<Vec<FundingAllocation>, sqlx::Error> {
    sqlx::query_as::<_, FundingAllocation>(&format!(
        "SELECT {ALLOCATION_COLUMNS} FROM employee_funding_allocations \
         WHERE employment_id = ? ORDER BY start_date, id"
    ))
    .bind(employment_id)
    .fetch_all(pool)
    .await
}

#[utoipa::path(
    get,
    path = "/api/v1/employments/{id}/funding-allocations",
    params(("id", Path, description = "Employment ID")),
    responses((status = 200, description = "All allocations of the employment", body = [FundingAllocation])),
    tag = "Employment",
    security(("bearer_auth" = []))
)]
pub async fn list_employment_allocations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.read")?;
    let allocations = allocations_for(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(allocations))
}

#[utoipa::path(
    get,
    path = "/api/v1/employments/{id}/funding-summary",
    params(("id", Path, description = "Employment ID"), SummaryQuery),
    responses(
        (status = 200, description = "Active FTE as of the date", body = crate::services::funding::FundingSummary),
        (status = 404, description = "Employment not found")
    ),
    tag = "Employment",
    security(("bearer_auth" = []))
)]
pub async fn funding_summary(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<SummaryQuery>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.read")?;
    let employment_id = path.into_inner();

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM employments WHERE id = ?)")
        .bind(employment_id)
        .fetch_one(pool.get_ref())
        .await?;
    if !exists {
        return Err(AppError::not_found("Employment"));
    }

    let spans = allocations_for(pool.get_ref(), employment_id)
        .await?
        .iter()
        .map(AllocationSpan::from_row)
        .collect::<AppResult<Vec<_>>>()?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());

    Ok(HttpResponse::Ok().json(summarize(&spans, as_of)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_must_be_known() {
        assert!(check_update_values(&json!({ "status": "inactive" })).is_ok());
        assert!(check_update_values(&json!({ "status": "terminated" })).is_err());
        assert!(check_update_values(&json!({ "status": 1 })).is_err());
    }

    #[test]
    fn salaries_must_not_be_negative() {
        assert!(check_update_values(&json!({ "probation_salary": 100.5 })).is_ok());
        assert!(check_update_values(&json!({ "pass_probation_salary": -1 })).is_err());
    }

    #[test]
    fn create_rejects_reversed_dates() {
        let payload: CreateEmployment = serde_json::from_value(json!({
            "employee_id": 1,
            "employment_type": "full_time",
            "start_date": "2025-02-01",
            "end_date": "2025-01-01",
            "department_id": 1,
            "position_id": 1,
            "pass_probation_salary": 30000.0
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn active_employment_check_holds_the_employee_lock() {
        assert!(LOCK_EMPLOYEE_SQL.starts_with("SELECT id FROM employees"));
        assert!(LOCK_EMPLOYEE_SQL.ends_with("FOR UPDATE"));
    }
}
