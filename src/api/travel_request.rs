use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::workflow::{TRAVEL_REQUEST_COLUMNS, TravelRequest},
    services::approval::{ApprovalGate, set_approval},
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

const TRAVEL_REQUESTS: Updatable = Updatable {
    table: "travel_requests",
    columns: &[
        "department_id",
        "position_id",
        "destination",
        "start_date",
        "end_date",
        "purpose",
        "grant_code",
        "transportation",
        "accommodation",
        "remarks",
    ],
    soft_delete: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TravelGate {
    Supervisor,
    Hr,
}

impl TravelGate {
    fn gate(self) -> ApprovalGate {
        let (flag, date_column) = match self {
            TravelGate::Supervisor => ("supervisor_approved", "supervisor_approved_date"),
            TravelGate::Hr => ("hr_acknowledged", "hr_acknowledged_date"),
        };
        ApprovalGate {
            table: "travel_requests",
            entity: "Travel request",
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
pub struct ApproveTravel {
    pub gate: TravelGate,
    /// `false` revokes an earlier approval
    #[serde(default = "approve_by_default")]
    pub approved: bool,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateTravelRequest {
    /// Defaults to the caller's own employee record
    pub employee_id: Option<u64>,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Chiang Mai field office")]
    pub destination: String,
    #[schema(example = "2026-02-02", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-02-04", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub purpose: Option<String>,
    #[schema(example = "S0031")]
    pub grant_code: Option<String>,
    #[schema(example = "air")]
    pub transportation: Option<String>,
    #[schema(example = "hotel")]
    pub accommodation: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TravelQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    pub supervisor_approved: Option<bool>,
    pub hr_acknowledged: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/api/v1/travel-requests",
    request_body = CreateTravelRequest,
    responses((status = 201, description = "Travel request submitted"), (status = 422, description = "Validation failed")),
    tag = "Travel Request",
    security(("bearer_auth" = []))
)]
pub async fn create_travel_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTravelRequest>,
) -> AppResult<HttpResponse> {
    auth.require("travel_request.create")?;
    payload.validate()?;
    validate_range(payload.start_date, Some(payload.end_date))?;

    let employee_id = auth
        .scope_employee(payload.employee_id)?
        .ok_or_else(|| AppError::field("employee_id", "employee_id is required"))?;

    let id = sqlx::query(
        r#"
        INSERT INTO travel_requests
        (employee_id, department_id, position_id, destination, start_date, end_date, purpose,
         grant_code, transportation, accommodation, remarks, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.department_id)
    .bind(payload.position_id)
    .bind(payload.destination.trim())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(&payload.purpose)
    .bind(&payload.grant_code)
    .bind(&payload.transportation)
    .bind(&payload.accommodation)
    .bind(&payload.remarks)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(travel_request_id = id, employee_id, "Travel request submitted");
    Ok(HttpResponse::Created().json(json!({ "message": "Travel request submitted", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/travel-requests",
    params(TravelQuery),
    responses((status = 200, description = "Paginated travel requests", body = Object)),
    tag = "Travel Request",
    security(("bearer_auth" = []))
)]
pub async fn list_travel_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<TravelQuery>,
) -> AppResult<HttpResponse> {
    auth.require("travel_request.read")?;
    let employee_id = auth.scope_employee(query.employee_id)?;

    let mut filters = Filters::new();
    filters
        .eq("employee_id", employee_id)
        .eq("supervisor_approved", query.supervisor_approved)
        .eq("hr_acknowledged", query.hr_acknowledged);

    let page = fetch_page::<TravelRequest>(
        pool.get_ref(),
        TRAVEL_REQUEST_COLUMNS,
        "travel_requests",
        &filters,
        "start_date DESC, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/travel-requests/{id}",
    params(("id", Path, description = "Travel request ID")),
    responses((status = 200, description = "Travel request found", body = TravelRequest), (status = 404, description = "Travel request not found")),
    tag = "Travel Request",
    security(("bearer_auth" = []))
)]
pub async fn get_travel_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("travel_request.read")?;
    let request = find_by_id::<TravelRequest>(
        pool.get_ref(),
        TRAVEL_REQUEST_COLUMNS,
        "travel_requests",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Travel request"))?;
    auth.scope_employee(Some(request.employee_id))?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    put,
    path = "/api/v1/travel-requests/{id}",
    params(("id", Path, description = "Travel request ID")),
    request_body = Object,
    responses((status = 200, description = "Travel request updated"), (status = 404, description = "Travel request not found")),
    tag = "Travel Request",
    security(("bearer_auth" = []))
)]
pub async fn update_travel_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("travel_request.update")?;
    let update = build_update_sql(&TRAVEL_REQUESTS, &body, path.into_inner(), &auth.username)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    updated(affected, "Travel request")
}

#[utoipa::path(
    put,
    path = "/api/v1/travel-requests/{id}/approve",
    params(("id", Path, description = "Travel request ID")),
    request_body = ApproveTravel,
    responses((status = 200, description = "Approval recorded"), (status = 404, description = "Travel request not found")),
    tag = "Travel Request",
    security(("bearer_auth" = []))
)]
pub async fn approve_travel_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ApproveTravel>,
) -> AppResult<HttpResponse> {
    auth.require("travel_request.update")?;
    let id = path.into_inner();
    set_approval(pool.get_ref(), &payload.gate.gate(), id, payload.approved, &auth.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Travel request approval recorded" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/travel-requests/{id}",
    params(("id", Path, description = "Travel request ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Travel request not found")),
    tag = "Travel Request",
    security(("bearer_auth" = []))
)]
pub async fn delete_travel_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("travel_request.delete")?;
    hard_delete(pool.get_ref(), "travel_requests", path.into_inner(), "Travel request").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hr_gate_maps_to_acknowledgement_columns() {
        let gate = TravelGate::Hr.gate();
        assert_eq!(gate.flag, "hr_acknowledged");
        assert_eq!(gate.date_column, Some("hr_acknowledged_date"));
    }

    #[test]
    fn approval_defaults_to_granting() {
        let body: ApproveTravel = serde_json::from_value(json!({ "gate": "supervisor" })).unwrap();
        assert!(body.approved);
        assert_eq!(body.gate, TravelGate::Supervisor);
    }
}
