use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::workflow::{AcknowledgementStatus, RESIGNATION_COLUMNS, Resignation},
    services::funding::validate_range,
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

const RESIGNATIONS: Updatable = Updatable {
    table: "resignations",
    columns: &[
        "department_id",
        "position_id",
        "resignation_date",
        "last_working_date",
        "reason",
        "reason_details",
    ],
    soft_delete: false,
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateResignation {
    /// Defaults to the caller's own employee record
    pub employee_id: Option<u64>,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    #[schema(example = "2026-05-01", format = "date", value_type = String)]
    pub resignation_date: NaiveDate,
    #[schema(example = "2026-05-31", format = "date", value_type = String)]
    pub last_working_date: NaiveDate,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Career development")]
    pub reason: String,
    pub reason_details: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResignationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    /// pending, acknowledged or rejected
    pub acknowledgement_status: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/resignations",
    request_body = CreateResignation,
    responses((status = 201, description = "Resignation submitted"), (status = 422, description = "Validation failed")),
    tag = "Resignation",
    security(("bearer_auth" = []))
)]
pub async fn create_resignation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateResignation>,
) -> AppResult<HttpResponse> {
    auth.require("resignation.create")?;
    payload.validate()?;
    validate_range(payload.resignation_date, Some(payload.last_working_date))
        .map_err(|_| AppError::field("last_working_date", "last_working_date must not be before resignation_date"))?;

    let employee_id = auth
        .scope_employee(payload.employee_id)?
        .ok_or_else(|| AppError::field("employee_id", "employee_id is required"))?;

    let id = sqlx::query(
        r#"
        INSERT INTO resignations
        (employee_id, department_id, position_id, resignation_date, last_working_date, reason,
         reason_details, acknowledgement_status, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.department_id)
    .bind(payload.position_id)
    .bind(payload.resignation_date)
    .bind(payload.last_working_date)
    .bind(payload.reason.trim())
    .bind(&payload.reason_details)
    .bind(AcknowledgementStatus::Pending.as_ref())
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(resignation_id = id, employee_id, "Resignation submitted");
    Ok(HttpResponse::Created().json(json!({ "message": "Resignation submitted", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/resignations",
    params(ResignationQuery),
    responses((status = 200, description = "Paginated resignations", body = Object)),
    tag = "Resignation",
    security(("bearer_auth" = []))
)]
pub async fn list_resignations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ResignationQuery>,
) -> AppResult<HttpResponse> {
    auth.require("resignation.read")?;
    let employee_id = auth.scope_employee(query.employee_id)?;

    let mut filters = Filters::new();
    filters
        .eq("employee_id", employee_id)
        .eq("acknowledgement_status", query.acknowledgement_status.clone());

    let page = fetch_page::<Resignation>(
        pool.get_ref(),
        RESIGNATION_COLUMNS,
        "resignations",
        &filters,
        "resignation_date DESC, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/resignations/{id}",
    params(("id", Path, description = "Resignation ID")),
    responses((status = 200, description = "Resignation found", body = Resignation), (status = 404, description = "Resignation not found")),
    tag = "Resignation",
    security(("bearer_auth" = []))
)]
pub async fn get_resignation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("resignation.read")?;
    let resignation = find_by_id::<Resignation>(
        pool.get_ref(),
        RESIGNATION_COLUMNS,
        "resignations",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Resignation"))?;
    auth.scope_employee(Some(resignation.employee_id))?;
    Ok(HttpResponse::Ok().json(resignation))
}

#[utoipa::path(
    put,
    path = "/api/v1/resignations/{id}",
    params(("id", Path, description = "Resignation ID")),
    request_body = Object,
    responses((status = 200, description = "Resignation updated"), (status = 404, description = "Resignation not found")),
    tag = "Resignation",
    security(("bearer_auth" = []))
)]
pub async fn update_resignation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("resignation.update")?;
    let update = build_update_sql(&RESIGNATIONS, &body, path.into_inner(), &auth.username)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    updated(affected, "Resignation")
}

/// Moves a pending resignation to `outcome`, recording who decided.
async fn decide(pool: &MySqlPool, id: u64, outcome: AcknowledgementStatus, actor: &str) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE resignations
        SET acknowledgement_status = ?, acknowledged_by = ?, acknowledged_at = NOW(), updated_by = ?
        WHERE id = ? AND acknowledgement_status = ?
        "#,
    )
    .bind(outcome.as_ref())
    .bind(actor)
    .bind(actor)
    .bind(id)
    .bind(AcknowledgementStatus::Pending.as_ref())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT acknowledgement_status FROM resignations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Resignation"))?;
        return Err(AppError::Conflict(format!("Resignation is already {status}")));
    }

    info!(resignation_id = id, outcome = %outcome, "Resignation decided");
    Ok(())
}

#[utoipa::path(
    put,
    path = "/api/v1/resignations/{id}/acknowledge",
    params(("id", Path, description = "Resignation ID")),
    responses(
        (status = 200, description = "Resignation acknowledged"),
        (status = 404, description = "Resignation not found"),
        (status = 409, description = "Resignation is no longer pending")
    ),
    tag = "Resignation",
    security(("bearer_auth" = []))
)]
pub async fn acknowledge_resignation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("resignation.update")?;
    decide(pool.get_ref(), path.into_inner(), AcknowledgementStatus::Acknowledged, &auth.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Resignation acknowledged" })))
}

#[utoipa::path(
    put,
    path = "/api/v1/resignations/{id}/reject",
    params(("id", Path, description = "Resignation ID")),
    responses(
        (status = 200, description = "Resignation rejected"),
        (status = 404, description = "Resignation not found"),
        (status = 409, description = "Resignation is no longer pending")
    ),
    tag = "Resignation",
    security(("bearer_auth" = []))
)]
pub async fn reject_resignation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("resignation.update")?;
    decide(pool.get_ref(), path.into_inner(), AcknowledgementStatus::Rejected, &auth.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Resignation rejected" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/resignations/{id}",
    params(("id", Path, description = "Resignation ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Resignation not found")),
    tag = "Resignation",
    security(("bearer_auth" = []))
)]
pub async fn delete_resignation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("resignation.delete")?;
    hard_delete(pool.get_ref(), "resignations", path.into_inner(), "Resignation").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_is_required() {
        let payload: CreateResignation = serde_json::from_value(json!({
            "resignation_date": "2026-05-01",
            "last_working_date": "2026-05-31",
            "reason": ""
        }))
        .unwrap();
        assert!(payload.validate().unwrap_err().field_errors().contains_key("reason"));
    }

    #[test]
    fn status_is_not_client_writable() {
        let err = build_update_sql(
            &RESIGNATIONS,
            &json!({ "acknowledgement_status": "acknowledged" }),
            1,
            "hr",
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
