use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::workflow::{HOLIDAY_COMPENSATION_COLUMNS, HolidayCompensationRecord},
    services::approval::{ApprovalGate, set_approval},
    utils::db_utils::{Filters, Updatable, build_update_sql, execute_update, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const RECORDS: Updatable = Updatable {
    table: "holiday_compensation_records",
    columns: &["holiday_date", "worked_date", "compensation_days", "reason"],
    soft_delete: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompensationGate {
    Supervisor,
    Hr,
}

impl CompensationGate {
    fn gate(self) -> ApprovalGate {
        let (flag, date_column) = match self {
            CompensationGate::Supervisor => ("supervisor_approved", "supervisor_approved_date"),
            CompensationGate::Hr => ("hr_approved", "hr_approved_date"),
        };
        ApprovalGate {
            table: "holiday_compensation_records",
            entity: "Holiday compensation record",
            flag,
            date_column: Some(date_column),
            open_condition: None,
        }
    }
}

fn approve_by_default() -> bool {
    true
}

#[derive(Deserialize, ToSchema)]
pub struct ApproveCompensation {
    pub gate: CompensationGate,
    #[serde(default = "approve_by_default")]
    pub approved: bool,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateCompensation {
    pub employee_id: u64,
    #[schema(example = "2026-04-13", format = "date", value_type = String)]
    pub holiday_date: NaiveDate,
    #[schema(example = "2026-04-13", format = "date", value_type = String)]
    pub worked_date: NaiveDate,
    #[validate(range(exclusive_min = 0.0, max = 31.0))]
    #[schema(example = 1.0)]
    pub compensation_days: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CompensationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
}

#[utoipa::path(
    post,
    path = "/api/v1/holiday-compensations",
    request_body = CreateCompensation,
    responses((status = 201, description = "Record created"), (status = 422, description = "Validation failed")),
    tag = "Holiday Compensation",
    security(("bearer_auth" = []))
)]
pub async fn create_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCompensation>,
) -> AppResult<HttpResponse> {
    auth.require("holiday_compensation.create")?;
    payload.validate()?;

    let id = sqlx::query(
        r#"
        INSERT INTO holiday_compensation_records
        (employee_id, holiday_date, worked_date, compensation_days, reason, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.holiday_date)
    .bind(payload.worked_date)
    .bind(payload.compensation_days.unwrap_or(1.0))
    .bind(&payload.reason)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Holiday compensation recorded", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/holiday-compensations",
    params(CompensationQuery),
    responses((status = 200, description = "Paginated records", body = Object)),
    tag = "Holiday Compensation",
    security(("bearer_auth" = []))
)]
pub async fn list_compensations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CompensationQuery>,
) -> AppResult<HttpResponse> {
    auth.require("holiday_compensation.read")?;
    let employee_id = auth.scope_employee(query.employee_id)?;

    let mut filters = Filters::new();
    filters.eq("employee_id", employee_id);

    let page = fetch_page::<HolidayCompensationRecord>(
        pool.get_ref(),
        HOLIDAY_COMPENSATION_COLUMNS,
        "holiday_compensation_records",
        &filters,
        "holiday_date DESC, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/holiday-compensations/{id}",
    params(("id", Path, description = "Record ID")),
    responses((status = 200, description = "Record found", body = HolidayCompensationRecord), (status = 404, description = "Record not found")),
    tag = "Holiday Compensation",
    security(("bearer_auth" = []))
)]
pub async fn get_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("holiday_compensation.read")?;
    let record = find_by_id::<HolidayCompensationRecord>(
        pool.get_ref(),
        HOLIDAY_COMPENSATION_COLUMNS,
        "holiday_compensation_records",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Holiday compensation record"))?;
    auth.scope_employee(Some(record.employee_id))?;
    Ok(HttpResponse::Ok().json(record))
}

#[utoipa::path(
    put,
    path = "/api/v1/holiday-compensations/{id}",
    params(("id", Path, description = "Record ID")),
    request_body = Object,
    responses((status = 200, description = "Record updated"), (status = 404, description = "Record not found")),
    tag = "Holiday Compensation",
    security(("bearer_auth" = []))
)]
pub async fn update_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("holiday_compensation.update")?;
    if body
        .get("compensation_days")
        .and_then(Value::as_f64)
        .is_some_and(|d| d <= 0.0)
    {
        return Err(AppError::field("compensation_days", "compensation_days must be positive"));
    }
    let update = build_update_sql(&RECORDS, &body, path.into_inner(), &auth.username)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    updated(affected, "Holiday compensation record")
}

#[utoipa::path(
    put,
    path = "/api/v1/holiday-compensations/{id}/approve",
    params(("id", Path, description = "Record ID")),
    request_body = ApproveCompensation,
    responses((status = 200, description = "Approval recorded"), (status = 404, description = "Record not found")),
    tag = "Holiday Compensation",
    security(("bearer_auth" = []))
)]
pub async fn approve_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ApproveCompensation>,
) -> AppResult<HttpResponse> {
    auth.require("holiday_compensation.update")?;
    set_approval(
        pool.get_ref(),
        &payload.gate.gate(),
        path.into_inner(),
        payload.approved,
        &auth.username,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Holiday compensation approval recorded" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/holiday-compensations/{id}",
    params(("id", Path, description = "Record ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Record not found")),
    tag = "Holiday Compensation",
    security(("bearer_auth" = []))
)]
pub async fn delete_compensation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("holiday_compensation.delete")?;
    hard_delete(
        pool.get_ref(),
        "holiday_compensation_records",
        path.into_inner(),
        "Holiday compensation record",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_compensation_days_are_rejected() {
        let payload: CreateCompensation = serde_json::from_value(json!({
            "employee_id": 1,
            "holiday_date": "2026-04-13",
            "worked_date": "2026-04-13",
            "compensation_days": 0.0
        }))
        .unwrap();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn hr_gate_uses_hr_columns() {
        assert_eq!(CompensationGate::Hr.gate().flag, "hr_approved");
    }
}
