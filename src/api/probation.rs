//! Probation history of an employment. Every event is a new record; the most
//! recent one is the only active record.

use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::employment::{EMPLOYMENT_COLUMNS, Employment},
    model::workflow::{PROBATION_COLUMNS, ProbationEvent, ProbationRecord},
    utils::db_utils::{Filters, Updatable, build_update_sql, execute_update, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const PROBATION_RECORDS: Updatable = Updatable {
    table: "probation_records",
    columns: &["decision_reason", "evaluation_notes"],
    soft_delete: false,
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct StartProbation {
    pub employment_id: u64,
    /// Defaults to the employment start date
    #[schema(format = "date", value_type = Option<String>)]
    pub probation_start_date: Option<NaiveDate>,
    /// Last day on probation
    #[schema(example = "2026-06-30", format = "date", value_type = String)]
    pub probation_end_date: NaiveDate,
    pub evaluation_notes: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct ExtendProbation {
    pub employment_id: u64,
    #[schema(example = "2026-09-30", format = "date", value_type = String)]
    pub new_end_date: NaiveDate,
    #[validate(length(min = 1))]
    pub decision_reason: String,
    pub evaluation_notes: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct DecideProbation {
    pub employment_id: u64,
    /// Defaults to today
    #[schema(format = "date", value_type = Option<String>)]
    pub decision_date: Option<NaiveDate>,
    pub decision_reason: Option<String>,
    pub evaluation_notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProbationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employment_id: Option<u64>,
    pub employee_id: Option<u64>,
    pub is_active: Option<bool>,
}

/// The new record's extension number, after checking the new end date moves
/// probation forward.
fn next_extension(current: &ProbationRecord, new_end_date: NaiveDate) -> AppResult<u32> {
    if new_end_date <= current.probation_end_date {
        return Err(AppError::field(
            "new_end_date",
            format!(
                "new_end_date must be after the current end date {}",
                current.probation_end_date
            ),
        ));
    }
    Ok(current.extension_number + 1)
}

fn ensure_undecided(current: &ProbationRecord) -> AppResult<()> {
    let event = current.event_type.parse::<ProbationEvent>().map_err(|_| {
        AppError::Internal(format!("probation record {} has unknown event type", current.id))
    })?;
    match event {
        ProbationEvent::Passed | ProbationEvent::Failed => Err(AppError::Conflict(format!(
            "Probation has already been {event}"
        ))),
        ProbationEvent::Initial | ProbationEvent::Extension => Ok(()),
    }
}

async fn lock_employment(conn: &mut MySqlConnection, employment_id: u64) -> AppResult<Employment> {
    sqlx::query_as::<_, Employment>(&format!(
        "SELECT {EMPLOYMENT_COLUMNS} FROM employments WHERE id = ? FOR UPDATE"
    ))
    .bind(employment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Employment"))
}

async fn active_record(conn: &mut MySqlConnection, employment_id: u64) -> AppResult<ProbationRecord> {
    sqlx::query_as::<_, ProbationRecord>(&format!(
        "SELECT {PROBATION_COLUMNS} FROM probation_records \
         WHERE employment_id = ? AND is_active = TRUE ORDER BY id DESC LIMIT 1"
    ))
    .bind(employment_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Active probation record"))
}

struct NewEvent<'a> {
    employment: &'a Employment,
    event: ProbationEvent,
    decision_date: Option<NaiveDate>,
    probation_start_date: NaiveDate,
    probation_end_date: NaiveDate,
    extension_number: u32,
    decision_reason: Option<&'a str>,
    evaluation_notes: Option<&'a str>,
}

/// Deactivates earlier records and inserts the new active one.
async fn record_event(conn: &mut MySqlConnection, event: NewEvent<'_>, actor: &str) -> AppResult<u64> {
    sqlx::query(
        "UPDATE probation_records SET is_active = FALSE, updated_by = ? WHERE employment_id = ? AND is_active = TRUE",
    )
    .bind(actor)
    .bind(event.employment.id)
    .execute(&mut *conn)
    .await?;

    let id = sqlx::query(
        r#"
        INSERT INTO probation_records
        (employment_id, employee_id, event_type, event_date, decision_date, probation_start_date,
         probation_end_date, extension_number, decision_reason, evaluation_notes, is_active,
         created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?, ?)
        "#,
    )
    .bind(event.employment.id)
    .bind(event.employment.employee_id)
    .bind(event.event.as_ref())
    .bind(Utc::now().date_naive())
    .bind(event.decision_date)
    .bind(event.probation_start_date)
    .bind(event.probation_end_date)
    .bind(event.extension_number)
    .bind(event.decision_reason)
    .bind(event.evaluation_notes)
    .bind(actor)
    .bind(actor)
    .execute(&mut *conn)
    .await?
    .last_insert_id();

    info!(
        probation_record_id = id,
        employment_id = event.employment.id,
        event = %event.event,
        "Probation event recorded"
    );
    Ok(id)
}

/// Opens probation for an employment; the pass date becomes the day after it ends.
#[utoipa::path(
    post,
    path = "/api/v1/probation-records",
    request_body = StartProbation,
    responses(
        (status = 201, description = "Probation started"),
        (status = 404, description = "Employment not found"),
        (status = 422, description = "Invalid dates")
    ),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn start_probation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<StartProbation>,
) -> AppResult<HttpResponse> {
    auth.require("probation.create")?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let employment = lock_employment(&mut tx, payload.employment_id).await?;
    let start = payload.probation_start_date.unwrap_or(employment.start_date);
    if payload.probation_end_date < start {
        return Err(AppError::field(
            "probation_end_date",
            "probation_end_date must not be before the probation start",
        ));
    }

    let id = record_event(
        &mut tx,
        NewEvent {
            employment: &employment,
            event: ProbationEvent::Initial,
            decision_date: None,
            probation_start_date: start,
            probation_end_date: payload.probation_end_date,
            extension_number: 0,
            decision_reason: None,
            evaluation_notes: payload.evaluation_notes.as_deref(),
        },
        &auth.username,
    )
    .await?;
    set_pass_date(&mut tx, employment.id, day_after(payload.probation_end_date)?, &auth.username).await?;

    tx.commit().await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Probation started", "id": id })))
}

fn day_after(date: NaiveDate) -> AppResult<NaiveDate> {
    date.checked_add_days(Days::new(1))
        .ok_or_else(|| AppError::field("probation_end_date", "Date is out of range"))
}

async fn set_pass_date(
    conn: &mut MySqlConnection,
    employment_id: u64,
    pass_date: NaiveDate,
    actor: &str,
) -> AppResult<()> {
    sqlx::query("UPDATE employments SET probation_pass_date = ?, updated_by = ? WHERE id = ?")
        .bind(pass_date)
        .bind(actor)
        .bind(employment_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/probation-records/extend",
    request_body = ExtendProbation,
    responses(
        (status = 201, description = "Probation extended"),
        (status = 404, description = "No active probation"),
        (status = 409, description = "Probation already decided"),
        (status = 422, description = "New end date is not later")
    ),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn extend_probation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<ExtendProbation>,
) -> AppResult<HttpResponse> {
    auth.require("probation.update")?;
    payload.validate()?;

    let mut tx = pool.begin().await?;
    let employment = lock_employment(&mut tx, payload.employment_id).await?;
    let current = active_record(&mut tx, employment.id).await?;
    ensure_undecided(&current)?;
    let extension_number = next_extension(&current, payload.new_end_date)?;

    let id = record_event(
        &mut tx,
        NewEvent {
            employment: &employment,
            event: ProbationEvent::Extension,
            decision_date: Some(Utc::now().date_naive()),
            probation_start_date: current.probation_start_date,
            probation_end_date: payload.new_end_date,
            extension_number,
            decision_reason: Some(payload.decision_reason.as_str()),
            evaluation_notes: payload.evaluation_notes.as_deref(),
        },
        &auth.username,
    )
    .await?;
    set_pass_date(&mut tx, employment.id, day_after(payload.new_end_date)?, &auth.username).await?;

    tx.commit().await?;
    Ok(HttpResponse::Created().json(json!({
        "message": "Probation extended",
        "id": id,
        "extension_number": extension_number
    })))
}

async fn decide(
    pool: &MySqlPool,
    payload: &DecideProbation,
    event: ProbationEvent,
    actor: &str,
) -> AppResult<u64> {
    let decision_date = payload.decision_date.unwrap_or_else(|| Utc::now().date_naive());

    let mut tx = pool.begin().await?;
    let employment = lock_employment(&mut tx, payload.employment_id).await?;
    let current = active_record(&mut tx, employment.id).await?;
    ensure_undecided(&current)?;

    let id = record_event(
        &mut tx,
        NewEvent {
            employment: &employment,
            event,
            decision_date: Some(decision_date),
            probation_start_date: current.probation_start_date,
            probation_end_date: current.probation_end_date,
            extension_number: current.extension_number,
            decision_reason: payload.decision_reason.as_deref(),
            evaluation_notes: payload.evaluation_notes.as_deref(),
        },
        actor,
    )
    .await?;

    if event == ProbationEvent::Passed && employment.probation_pass_date.is_none() {
        set_pass_date(&mut tx, employment.id, decision_date, actor).await?;
    }

    tx.commit().await?;
    Ok(id)
}

#[utoipa::path(
    post,
    path = "/api/v1/probation-records/pass",
    request_body = DecideProbation,
    responses(
        (status = 201, description = "Probation passed"),
        (status = 404, description = "No active probation"),
        (status = 409, description = "Probation already decided")
    ),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn pass_probation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<DecideProbation>,
) -> AppResult<HttpResponse> {
    auth.require("probation.update")?;
    payload.validate()?;
    let id = decide(pool.get_ref(), &payload, ProbationEvent::Passed, &auth.username).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Probation passed", "id": id })))
}

#[utoipa::path(
    post,
    path = "/api/v1/probation-records/fail",
    request_body = DecideProbation,
    responses(
        (status = 201, description = "Probation failed"),
        (status = 404, description = "No active probation"),
        (status = 409, description = "Probation already decided")
    ),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn fail_probation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<DecideProbation>,
) -> AppResult<HttpResponse> {
    auth.require("probation.update")?;
    payload.validate()?;
    let id = decide(pool.get_ref(), &payload, ProbationEvent::Failed, &auth.username).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Probation failed", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/probation-records",
    params(ProbationQuery),
    responses((status = 200, description = "Paginated probation records", body = Object)),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn list_probation_records(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ProbationQuery>,
) -> AppResult<HttpResponse> {
    auth.require("probation.read")?;
    let employee_id = auth.scope_employee(query.employee_id)?;

    let mut filters = Filters::new();
    filters
        .eq("employment_id", query.employment_id)
        .eq("employee_id", employee_id)
        .eq("is_active", query.is_active);

    let page = fetch_page::<ProbationRecord>(
        pool.get_ref(),
        PROBATION_COLUMNS,
        "probation_records",
        &filters,
        "employment_id, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/probation-records/{id}",
    params(("id", Path, description = "Probation record ID")),
    responses((status = 200, description = "Probation record found", body = ProbationRecord), (status = 404, description = "Probation record not found")),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn get_probation_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("probation.read")?;
    let record = find_by_id::<ProbationRecord>(
        pool.get_ref(),
        PROBATION_COLUMNS,
        "probation_records",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Probation record"))?;
    auth.scope_employee(Some(record.employee_id))?;
    Ok(HttpResponse::Ok().json(record))
}

/// Only notes and reasons are editable; dates change through events.
#[utoipa::path(
    put,
    path = "/api/v1/probation-records/{id}",
    params(("id", Path, description = "Probation record ID")),
    request_body = Object,
    responses((status = 200, description = "Probation record updated"), (status = 404, description = "Probation record not found")),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn update_probation_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("probation.update")?;
    let update = build_update_sql(&PROBATION_RECORDS, &body, path.into_inner(), &auth.username)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    updated(affected, "Probation record")
}

#[utoipa::path(
    delete,
    path = "/api/v1/probation-records/{id}",
    params(("id", Path, description = "Probation record ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Probation record not found")),
    tag = "Probation",
    security(("bearer_auth" = []))
)]
pub async fn delete_probation_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("probation.delete")?;
    hard_delete(pool.get_ref(), "probation_records", path.into_inner(), "Probation record").await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    fn record(event_type: &str, extension_number: u32) -> ProbationRecord {
        ProbationRecord {
            id: 1,
            employment_id: 2,
            employee_id: 3,
            event_type: event_type.into(),
            event_date: d(1, 1),
            decision_date: None,
            probation_start_date: d(1, 1),
            probation_end_date: d(3, 31),
            extension_number,
            decision_reason: None,
            evaluation_notes: None,
            is_active: true,
            created_by: None,
            updated_by: None,
            created_at: None,
        }
    }

    #[test]
    fn extension_bumps_the_number() {
        assert_eq!(next_extension(&record("initial", 0), d(6, 30)).unwrap(), 1);
        assert_eq!(next_extension(&record("extension", 1), d(6, 30)).unwrap(), 2);
    }

    #[test]
    fn extension_must_move_the_end_forward() {
        assert!(next_extension(&record("initial", 0), d(3, 31)).is_err());
        assert!(next_extension(&record("initial", 0), d(2, 1)).is_err());
    }

    #[test]
    fn decided_probation_is_closed() {
        assert!(ensure_undecided(&record("extension", 1)).is_ok());
        assert!(matches!(
            ensure_undecided(&record("passed", 0)),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            ensure_undecided(&record("failed", 0)),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn pass_date_is_the_day_after_probation_ends() {
        assert_eq!(day_after(d(3, 31)).unwrap(), d(4, 1));
    }
}
