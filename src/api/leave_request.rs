use super::hard_delete;
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::leave::{LEAVE_REQUEST_COLUMNS, LeaveGate, LeaveRequest, LeaveStatus},
    services::leave_days::count_leave_days,
    utils::db_utils::{Filters, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateLeaveRequest {
    /// Defaults to the caller's own employee record
    pub employee_id: Option<u64>,
    pub leave_type_id: u64,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
    pub attachment_notes: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct UpdateLeaveRequest {
    pub leave_type_id: Option<u64>,
    #[schema(format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
    pub attachment_notes: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ApproveLeave {
    pub gate: LeaveGate,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LeaveRequestQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_id: Option<u64>,
    pub leave_type_id: Option<u64>,
    /// pending, approved, declined or cancelled
    pub status: Option<String>,
}

fn parse_status(request: &LeaveRequest) -> AppResult<LeaveStatus> {
    request.status.parse::<LeaveStatus>().map_err(|_| {
        AppError::Internal(format!("leave request {} has unknown status", request.id))
    })
}

/// Day count for the range, excluding registered holidays.
async fn working_days(
    conn: &mut MySqlConnection,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<f64> {
    let holidays = sqlx::query_scalar::<_, NaiveDate>(
        "SELECT holiday_date FROM holidays WHERE holiday_date BETWEEN ? AND ?",
    )
    .bind(start)
    .bind(end.max(start))
    .fetch_all(&mut *conn)
    .await?;

    let days = count_leave_days(start, end, &holidays)?;
    if days <= 0.0 {
        return Err(AppError::field(
            "end_date",
            "The selected range contains no working days",
        ));
    }
    Ok(days)
}

async fn check_leave_type(
    conn: &mut MySqlConnection,
    leave_type_id: u64,
    attachment_notes: Option<&str>,
) -> AppResult<()> {
    let requires_attachment =
        sqlx::query_scalar::<_, bool>("SELECT requires_attachment FROM leave_types WHERE id = ?")
            .bind(leave_type_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::field("leave_type_id", "Leave type not found"))?;

    if requires_attachment && attachment_notes.is_none_or(|n| n.trim().is_empty()) {
        return Err(AppError::field(
            "attachment_notes",
            "This leave type requires supporting documents",
        ));
    }
    Ok(())
}

async fn lock_request(conn: &mut MySqlConnection, id: u64) -> AppResult<LeaveRequest> {
    sqlx::query_as::<_, LeaveRequest>(&format!(
        "SELECT {LEAVE_REQUEST_COLUMNS} FROM leave_requests WHERE id = ? FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Leave request"))
}

fn ensure_pending(request: &LeaveRequest) -> AppResult<()> {
    let status = parse_status(request)?;
    if status.is_final() {
        return Err(AppError::Conflict(format!(
            "Leave request is already {status}"
        )));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/leave-requests",
    request_body = CreateLeaveRequest,
    responses(
        (status = 201, description = "Leave request submitted", body = Object, example = json!({
            "message": "Leave request submitted", "id": 1, "total_days": 3.0
        })),
        (status = 403, description = "Employees may only request leave for themselves"),
        (status = 422, description = "Invalid range, leave type or no working days")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn create_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeaveRequest>,
) -> AppResult<HttpResponse> {
    auth.require("leave.create")?;
    payload.validate()?;

    let employee_id = auth
        .scope_employee(payload.employee_id)?
        .ok_or_else(|| AppError::field("employee_id", "employee_id is required"))?;

    let mut conn = pool.acquire().await?;
    check_leave_type(&mut conn, payload.leave_type_id, payload.attachment_notes.as_deref()).await?;
    let total_days = working_days(&mut conn, payload.start_date, payload.end_date).await?;

    let id = sqlx::query(
        r#"
        INSERT INTO leave_requests
        (employee_id, leave_type_id, start_date, end_date, total_days, reason, status,
         attachment_notes, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.leave_type_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(total_days)
    .bind(&payload.reason)
    .bind(LeaveStatus::Pending.as_ref())
    .bind(&payload.attachment_notes)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(&mut *conn)
    .await?
    .last_insert_id();

    info!(leave_request_id = id, employee_id, total_days, "Leave request submitted");
    Ok(HttpResponse::Created().json(json!({
        "message": "Leave request submitted",
        "id": id,
        "total_days": total_days
    })))
}

#[utoipa::path(
    get,
    path = "/api/v1/leave-requests",
    params(LeaveRequestQuery),
    responses((status = 200, description = "Paginated leave requests", body = Object)),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn list_leave_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveRequestQuery>,
) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;
    let employee_id = auth.scope_employee(query.employee_id)?;

    let mut filters = Filters::new();
    filters
        .eq("employee_id", employee_id)
        .eq("leave_type_id", query.leave_type_id)
        .eq("status", query.status.clone());

    let page = fetch_page::<LeaveRequest>(
        pool.get_ref(),
        LEAVE_REQUEST_COLUMNS,
        "leave_requests",
        &filters,
        "start_date DESC, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/leave-requests/{id}",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 404, description = "Leave request not found")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn get_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.read")?;
    let request = find_by_id::<LeaveRequest>(
        pool.get_ref(),
        LEAVE_REQUEST_COLUMNS,
        "leave_requests",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Leave request"))?;
    auth.scope_employee(Some(request.employee_id))?;
    Ok(HttpResponse::Ok().json(request))
}

/// Pending requests only; the day count is recomputed.
#[utoipa::path(
    put,
    path = "/api/v1/leave-requests/{id}",
    params(("id", Path, description = "Leave request ID")),
    request_body = UpdateLeaveRequest,
    responses(
        (status = 200, description = "Leave request updated"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request is no longer pending")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn update_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateLeaveRequest>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    payload.validate()?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let current = lock_request(&mut tx, id).await?;
    ensure_pending(&current)?;

    let leave_type_id = payload.leave_type_id.unwrap_or(current.leave_type_id);
    let start_date = payload.start_date.unwrap_or(current.start_date);
    let end_date = payload.end_date.unwrap_or(current.end_date);
    let reason = payload.reason.clone().or(current.reason);
    let attachment_notes = payload.attachment_notes.clone().or(current.attachment_notes);

    check_leave_type(&mut tx, leave_type_id, attachment_notes.as_deref()).await?;
    let total_days = working_days(&mut tx, start_date, end_date).await?;

    sqlx::query(
        r#"
        UPDATE leave_requests
        SET leave_type_id = ?, start_date = ?, end_date = ?, total_days = ?, reason = ?,
            attachment_notes = ?, updated_by = ?
        WHERE id = ?
        "#,
    )
    .bind(leave_type_id)
    .bind(start_date)
    .bind(end_date)
    .bind(total_days)
    .bind(&reason)
    .bind(&attachment_notes)
    .bind(&auth.username)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Leave request updated successfully",
        "total_days": total_days
    })))
}

/// Charges an approved request against the employee's balance for the year
/// it starts in, opening the balance from the leave type's default duration
/// when none exists.
async fn debit_balance(
    conn: &mut MySqlConnection,
    request: &LeaveRequest,
    actor: &str,
) -> AppResult<()> {
    let year = request.start_date.year() as u32;

    let balance_id = sqlx::query_scalar::<_, u64>(
        r#"
        SELECT id FROM leave_balances
        WHERE employee_id = ? AND leave_type_id = ? AND year = ?
        FOR UPDATE
        "#,
    )
    .bind(request.employee_id)
    .bind(request.leave_type_id)
    .bind(year)
    .fetch_optional(&mut *conn)
    .await?;

    match balance_id {
        Some(balance_id) => {
            sqlx::query(
                r#"
                UPDATE leave_balances
                SET used_days = used_days + ?, remaining_days = total_days - (used_days + ?),
                    updated_by = ?
                WHERE id = ?
                "#,
            )
            .bind(request.total_days)
            .bind(request.total_days)
            .bind(actor)
            .bind(balance_id)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            let entitlement = sqlx::query_scalar::<_, f64>(
                "SELECT default_duration FROM leave_types WHERE id = ?",
            )
            .bind(request.leave_type_id)
            .fetch_one(&mut *conn)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO leave_balances
                (employee_id, leave_type_id, year, total_days, used_days, remaining_days,
                 created_by, updated_by)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(request.employee_id)
            .bind(request.leave_type_id)
            .bind(year)
            .bind(entitlement)
            .bind(request.total_days)
            .bind(entitlement - request.total_days)
            .bind(actor)
            .bind(actor)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Signs off one gate. The request is approved, and the balance debited,
/// once both gates have signed off.
#[utoipa::path(
    put,
    path = "/api/v1/leave-requests/{id}/approve",
    params(("id", Path, description = "Leave request ID")),
    request_body = ApproveLeave,
    responses(
        (status = 200, description = "Gate approved", body = Object, example = json!({
            "message": "Leave request approval recorded", "status": "approved"
        })),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request is no longer pending")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
#[instrument(name = "leave_approve", skip(auth, pool, payload), fields(user = %auth.username))]
pub async fn approve_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ApproveLeave>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let mut request = lock_request(&mut tx, id).await?;
    ensure_pending(&request)?;

    let today = Utc::now().date_naive();
    match payload.gate {
        LeaveGate::Supervisor => {
            request.supervisor_approved = true;
            request.supervisor_approved_date = Some(today);
        }
        LeaveGate::HrSiteAdmin => {
            request.hr_site_admin_approved = true;
            request.hr_site_admin_approved_date = Some(today);
        }
    }
    let status =
        LeaveStatus::from_gates(request.supervisor_approved, request.hr_site_admin_approved);

    let (flag, date_column) = payload.gate.columns();
    sqlx::query(&format!(
        "UPDATE leave_requests SET {flag} = TRUE, {date_column} = ?, status = ?, updated_by = ? WHERE id = ?"
    ))
    .bind(today)
    .bind(status.as_ref())
    .bind(&auth.username)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if status == LeaveStatus::Approved {
        debit_balance(&mut tx, &request, &auth.username).await?;
    }

    tx.commit().await?;

    info!(leave_request_id = id, status = %status, "Leave approval recorded");
    Ok(HttpResponse::Ok().json(json!({
        "message": "Leave request approval recorded",
        "status": status
    })))
}

async fn close_pending(
    pool: &MySqlPool,
    id: u64,
    status: LeaveStatus,
    actor: &str,
    scope: Option<&AuthUser>,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let request = lock_request(&mut tx, id).await?;
    if let Some(auth) = scope {
        auth.scope_employee(Some(request.employee_id))?;
    }
    ensure_pending(&request)?;

    sqlx::query("UPDATE leave_requests SET status = ?, updated_by = ? WHERE id = ?")
        .bind(status.as_ref())
        .bind(actor)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(leave_request_id = id, status = %status, "Leave request closed");
    Ok(())
}

#[utoipa::path(
    put,
    path = "/api/v1/leave-requests/{id}/decline",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request declined"),
        (status = 409, description = "Leave request is no longer pending")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn decline_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.update")?;
    close_pending(pool.get_ref(), path.into_inner(), LeaveStatus::Declined, &auth.username, None).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Leave request declined" })))
}

/// Requesters may withdraw their own pending requests.
#[utoipa::path(
    put,
    path = "/api/v1/leave-requests/{id}/cancel",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request cancelled"),
        (status = 409, description = "Leave request is no longer pending")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn cancel_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.create")?;
    close_pending(
        pool.get_ref(),
        path.into_inner(),
        LeaveStatus::Cancelled,
        &auth.username,
        Some(&auth),
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Leave request cancelled" })))
}

/// Approved requests have been charged to a balance and stay on record.
#[utoipa::path(
    delete,
    path = "/api/v1/leave-requests/{id}",
    params(("id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Approved requests cannot be deleted")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn delete_leave_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("leave.delete")?;
    let id = path.into_inner();

    let status = sqlx::query_scalar::<_, String>("SELECT status FROM leave_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Leave request"))?;
    if status == LeaveStatus::Approved.as_ref() {
        return Err(AppError::Conflict("Approved leave requests cannot be deleted".into()));
    }

    hard_delete(pool.get_ref(), "leave_requests", id, "Leave request").await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: &str) -> LeaveRequest {
        LeaveRequest {
            id: 7,
            employee_id: 1,
            leave_type_id: 1,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(),
            total_days: 3.0,
            reason: None,
            status: status.into(),
            supervisor_approved: false,
            supervisor_approved_date: None,
            hr_site_admin_approved: false,
            hr_site_admin_approved_date: None,
            attachment_notes: None,
            created_by: None,
            updated_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn only_pending_requests_can_change() {
        assert!(ensure_pending(&request("pending")).is_ok());
        assert!(matches!(
            ensure_pending(&request("approved")),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            ensure_pending(&request("declined")),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn corrupt_status_is_an_internal_error() {
        assert!(matches!(
            ensure_pending(&request("archived")),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn gate_parses_from_snake_case() {
        let body: ApproveLeave =
            serde_json::from_value(json!({ "gate": "hr_site_admin" })).unwrap();
        assert_eq!(body.gate, LeaveGate::HrSiteAdmin);
    }
}
