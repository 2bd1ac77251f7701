//! Leave configuration: leave types, per-year balances and the holiday
//! calendar used when counting leave days.

use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::leave::{
        HOLIDAY_COLUMNS, Holiday, LEAVE_BALANCE_COLUMNS, LEAVE_TYPE_COLUMNS, LeaveBalance,
        LeaveType,
    },
    utils::db_utils::{Filters, Updatable, build_update_sql, execute_update, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const LEAVE_TYPES: Updatable = Updatable {
    table: "leave_types",
    columns: &["name", "default_duration", "description", "requires_attachment"],
    soft_delete: false,
};

const HOLIDAYS: Updatable = Updatable {
    table: "holidays",
    columns: &["holiday_date", "name"],
    soft_delete: false,
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateLeaveType {
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "Annual vacation")]
    pub name: String,
    /// Days granted per year
    #[validate(range(min = 0.0))]
    #[schema(example = 26.0)]
    pub default_duration: f64,
    pub description: Option<String>,
    #[serde(default)]
    pub requires_attachment: bool,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateLeaveBalance {
    pub employee_id: u64,
    pub leave_type_id: u64,
    #[validate(range(min = 2000, max = 2100))]
    #[schema(example = 2025)]
    pub year: u32,
    /// Defaults to the leave type's duration
    #[validate(range(min = 0.0))]
    pub total_days: Option<f64>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct AdjustLeaveBalance {
    #[validate(range(min = 0.0))]
    #[schema(example = 28.0)]
    pub total_days: f64,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateHoliday {
    #[schema(example = "2025-04-14", value_type = String, format = "date")]
    pub holiday_date: NaiveDate,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Songkran")]
    pub name: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BalanceQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    pub leave_type_id: Option<u64>,
    pub year: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HolidayQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Calendar year
    pub year: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/v1/leave-types",
    responses((status = 200, description = "All leave types", body = [LeaveType])),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn list_leave_types(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;
    let types = sqlx::query_as::<_, LeaveType>(&format!(
        "SELECT {LEAVE_TYPE_COLUMNS} FROM leave_types ORDER BY name"
    ))
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(types))
}

#[utoipa::path(
    get,
    path = "/api/v1/leave-types/{id}",
    params(("id", Path, description = "Leave type ID")),
    responses((status = 200, description = "Leave type found", body = LeaveType), (status = 404, description = "Leave type not found")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn get_leave_type(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;
    let leave_type =
        find_by_id::<LeaveType>(pool.get_ref(), LEAVE_TYPE_COLUMNS, "leave_types", path.into_inner(), false)
            .await?
            .ok_or_else(|| AppError::not_found("Leave type"))?;
    Ok(HttpResponse::Ok().json(leave_type))
}

#[utoipa::path(
    post,
    path = "/api/v1/leave-types",
    request_body = CreateLeaveType,
    responses((status = 201, description = "Leave type created"), (status = 409, description = "Name already exists")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn create_leave_type(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeaveType>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    payload.validate()?;

    let id = sqlx::query(
        r#"
        INSERT INTO leave_types (name, default_duration, description, requires_attachment, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.default_duration)
    .bind(&payload.description)
    .bind(payload.requires_attachment)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Leave type created", "id": id })))
}

#[utoipa::path(
    put,
    path = "/api/v1/leave-types/{id}",
    params(("id", Path, description = "Leave type ID")),
    request_body = Object,
    responses((status = 200, description = "Leave type updated"), (status = 404, description = "Leave type not found")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn update_leave_type(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    if body.get("default_duration").and_then(Value::as_f64).is_some_and(|d| d < 0.0) {
        return Err(AppError::field("default_duration", "default_duration must not be negative"));
    }
    let update = build_update_sql(&LEAVE_TYPES, &body, path.into_inner(), &auth.username)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    updated(affected, "Leave type")
}

/// Fails with 409 while requests or balances use the type.
#[utoipa::path(
    delete,
    path = "/api/v1/leave-types/{id}",
    params(("id", Path, description = "Leave type ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 409, description = "Leave type in use")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn delete_leave_type(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.delete")?;
    hard_delete(pool.get_ref(), "leave_types", path.into_inner(), "Leave type").await
}

#[utoipa::path(
    get,
    path = "/api/v1/leave-balances",
    params(BalanceQuery),
    responses((status = 200, description = "Paginated leave balances", body = Object)),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn list_leave_balances(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<BalanceQuery>,
) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;
    let employee_id = auth.scope_employee(query.employee_id)?;

    let mut filters = Filters::new();
    filters
        .eq("employee_id", employee_id)
        .eq("leave_type_id", query.leave_type_id)
        .eq("year", query.year.map(u64::from));

    let page = fetch_page::<LeaveBalance>(
        pool.get_ref(),
        LEAVE_BALANCE_COLUMNS,
        "leave_balances",
        &filters,
        "year DESC, leave_type_id",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/leave-balances/{id}",
    params(("id", Path, description = "Leave balance ID")),
    responses((status = 200, description = "Leave balance found", body = LeaveBalance), (status = 404, description = "Leave balance not found")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn get_leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;
    let balance = find_by_id::<LeaveBalance>(
        pool.get_ref(),
        LEAVE_BALANCE_COLUMNS,
        "leave_balances",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Leave balance"))?;
    auth.scope_employee(Some(balance.employee_id))?;
    Ok(HttpResponse::Ok().json(balance))
}

#[utoipa::path(
    post,
    path = "/api/v1/leave-balances",
    request_body = CreateLeaveBalance,
    responses(
        (status = 201, description = "Leave balance created"),
        (status = 404, description = "Leave type not found"),
        (status = 409, description = "Balance already exists for that year")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn create_leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeaveBalance>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    payload.validate()?;

    let total_days = match payload.total_days {
        Some(days) => days,
        None => sqlx::query_scalar::<_, f64>("SELECT default_duration FROM leave_types WHERE id = ?")
            .bind(payload.leave_type_id)
            .fetch_optional(pool.get_ref())
            .await?
            .ok_or_else(|| AppError::not_found("Leave type"))?,
    };

    let id = sqlx::query(
        r#"
        INSERT INTO leave_balances
        (employee_id, leave_type_id, year, total_days, used_days, remaining_days, created_by, updated_by)
        VALUES (?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.leave_type_id)
    .bind(payload.year)
    .bind(total_days)
    .bind(total_days)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Leave balance created", "id": id })))
}

/// Changes the entitlement; remaining days follow from days already used.
#[utoipa::path(
    put,
    path = "/api/v1/leave-balances/{id}",
    params(("id", Path, description = "Leave balance ID")),
    request_body = AdjustLeaveBalance,
    responses((status = 200, description = "Leave balance updated"), (status = 404, description = "Leave balance not found")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn adjust_leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AdjustLeaveBalance>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    payload.validate()?;
    let balance_id = path.into_inner();

    let affected = sqlx::query(
        r#"
        UPDATE leave_balances
        SET total_days = ?, remaining_days = ? - used_days, updated_by = ?
        WHERE id = ?
        "#,
    )
    .bind(payload.total_days)
    .bind(payload.total_days)
    .bind(&auth.username)
    .bind(balance_id)
    .execute(pool.get_ref())
    .await?
    .rows_affected();

    info!(balance_id, total_days = payload.total_days, "Leave balance adjusted");
    updated(affected, "Leave balance")
}

#[utoipa::path(
    get,
    path = "/api/v1/holidays",
    params(HolidayQuery),
    responses((status = 200, description = "Paginated holidays", body = Object)),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn list_holidays(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HolidayQuery>,
) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;

    let mut filters = Filters::new();
    if let Some(year) = query.year {
        filters.raw("YEAR(holiday_date) = ?", vec![u64::from(year).into()]);
    }

    let page = fetch_page::<Holiday>(
        pool.get_ref(),
        HOLIDAY_COLUMNS,
        "holidays",
        &filters,
        "holiday_date",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/holidays/{id}",
    params(("id", Path, description = "Holiday ID")),
    responses((status = 200, description = "Holiday found", body = Holiday), (status = 404, description = "Holiday not found")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn get_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;
    let holiday = find_by_id::<Holiday>(pool.get_ref(), HOLIDAY_COLUMNS, "holidays", path.into_inner(), false)
        .await?
        .ok_or_else(|| AppError::not_found("Holiday"))?;
    Ok(HttpResponse::Ok().json(holiday))
}

#[utoipa::path(
    post,
    path = "/api/v1/holidays",
    request_body = CreateHoliday,
    responses((status = 201, description = "Holiday created"), (status = 409, description = "Date already registered")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn create_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateHoliday>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    payload.validate()?;

    let id = sqlx::query(
        "INSERT INTO holidays (holiday_date, name, created_by, updated_by) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.holiday_date)
    .bind(payload.name.trim())
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Holiday created", "id": id })))
}

#[utoipa::path(
    put,
    path = "/api/v1/holidays/{id}",
    params(("id", Path, description = "Holiday ID")),
    request_body = Object,
    responses((status = 200, description = "Holiday updated"), (status = 404, description = "Holiday not found")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn update_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    let update = build_update_sql(&HOLIDAYS, &body, path.into_inner(), &auth.username)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    updated(affected, "Holiday")
}

#[utoipa::path(
    delete,
    path = "/api/v1/holidays/{id}",
    params(("id", Path, description = "Holiday ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Holiday not found")),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn delete_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.delete")?;
    hard_delete(pool.get_ref(), "holidays", path.into_inner(), "Holiday").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leave_type_rejects_negative_duration() {
        let payload = CreateLeaveType {
            name: "Study".into(),
            default_duration: -2.0,
            description: None,
            requires_attachment: false,
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn balance_year_is_bounded() {
        let payload: CreateLeaveBalance = serde_json::from_value(json!({
            "employee_id": 1,
            "leave_type_id": 2,
            "year": 1999
        }))
        .unwrap();
        assert!(payload.validate().unwrap_err().field_errors().contains_key("year"));
    }

    #[test]
    fn holiday_updates_only_touch_date_and_name() {
        let err = build_update_sql(&HOLIDAYS, &json!({ "id": 4 }), 1, "hr").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
