use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::workflow::{PERSONNEL_ACTION_COLUMNS, PersonnelAction, PersonnelActionType},
    services::approval::{ApprovalGate, set_approval},
    utils::db_utils::{
        BindSql, Filters, SqlValue, Updatable, build_update_sql, execute_update, fetch_page,
        find_by_id,
    },
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const PERSONNEL_ACTIONS: Updatable = Updatable {
    table: "personnel_actions",
    columns: &[
        "action_type",
        "effective_date",
        "new_department_id",
        "new_position_id",
        "new_site_id",
        "new_salary",
        "reason",
    ],
    soft_delete: false,
};

const NOT_IMPLEMENTED: &str = "implemented_at IS NULL";

/// The four sign-offs a personnel action needs before it can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PersonnelGate {
    DeptHead,
    Coo,
    Hr,
    Accountant,
}

impl PersonnelGate {
    fn gate(self) -> ApprovalGate {
        let flag = match self {
            PersonnelGate::DeptHead => "dept_head_approval",
            PersonnelGate::Coo => "coo_approval",
            PersonnelGate::Hr => "hr_approval",
            PersonnelGate::Accountant => "accountant_approval",
        };
        ApprovalGate {
            table: "personnel_actions",
            entity: "Personnel action",
            flag,
            date_column: None,
            open_condition: Some(NOT_IMPLEMENTED),
        }
    }
}

fn approve_by_default() -> bool {
    true
}

#[derive(Deserialize, ToSchema)]
pub struct ApprovePersonnelAction {
    pub gate: PersonnelGate,
    #[serde(default = "approve_by_default")]
    pub approved: bool,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreatePersonnelAction {
    pub employment_id: u64,
    pub action_type: PersonnelActionType,
    #[schema(example = "2026-03-01", format = "date", value_type = String)]
    pub effective_date: NaiveDate,
    pub new_department_id: Option<u64>,
    pub new_position_id: Option<u64>,
    pub new_site_id: Option<u64>,
    #[validate(range(min = 0.0))]
    #[schema(example = 32000.0)]
    pub new_salary: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PersonnelActionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employment_id: Option<u64>,
    pub action_type: Option<String>,
    /// Only implemented (`true`) or only open (`false`) actions
    pub implemented: Option<bool>,
}

/// Employment columns a personnel action can change, paired with the
/// proposed values that are present.
fn employment_changes(action: &PersonnelAction) -> Vec<(&'static str, SqlValue)> {
    [
        ("department_id", action.new_department_id.map(SqlValue::from)),
        ("position_id", action.new_position_id.map(SqlValue::from)),
        ("site_id", action.new_site_id.map(SqlValue::from)),
        ("pass_probation_salary", action.new_salary.map(SqlValue::from)),
    ]
    .into_iter()
    .filter_map(|(column, value)| value.map(|v| (column, v)))
    .collect()
}

async fn ensure_open(pool: &MySqlPool, id: u64) -> AppResult<()> {
    let open = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT ({NOT_IMPLEMENTED}) FROM personnel_actions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Personnel action"))?;
    if !open {
        return Err(AppError::Conflict(
            "Personnel action has already been implemented".into(),
        ));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/personnel-actions",
    request_body = CreatePersonnelAction,
    responses((status = 201, description = "Personnel action created"), (status = 422, description = "Validation failed")),
    tag = "Personnel Action",
    security(("bearer_auth" = []))
)]
pub async fn create_personnel_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePersonnelAction>,
) -> AppResult<HttpResponse> {
    auth.require("personnel_action.create")?;
    payload.validate()?;

    let id = sqlx::query(
        r#"
        INSERT INTO personnel_actions
        (employment_id, action_type, effective_date, new_department_id, new_position_id,
         new_site_id, new_salary, reason, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employment_id)
    .bind(payload.action_type.as_ref())
    .bind(payload.effective_date)
    .bind(payload.new_department_id)
    .bind(payload.new_position_id)
    .bind(payload.new_site_id)
    .bind(payload.new_salary)
    .bind(&payload.reason)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(personnel_action_id = id, action_type = %payload.action_type, "Personnel action created");
    Ok(HttpResponse::Created().json(json!({ "message": "Personnel action created", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/personnel-actions",
    params(PersonnelActionQuery),
    responses((status = 200, description = "Paginated personnel actions", body = Object)),
    tag = "Personnel Action",
    security(("bearer_auth" = []))
)]
pub async fn list_personnel_actions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PersonnelActionQuery>,
) -> AppResult<HttpResponse> {
    auth.require("personnel_action.read")?;

    let mut filters = Filters::new();
    filters
        .eq("employment_id", query.employment_id)
        .eq("action_type", query.action_type.clone());
    match query.implemented {
        Some(true) => {
            filters.raw("implemented_at IS NOT NULL", vec![]);
        }
        Some(false) => {
            filters.raw(NOT_IMPLEMENTED, vec![]);
        }
        None => {}
    }

    let page = fetch_page::<PersonnelAction>(
        pool.get_ref(),
        PERSONNEL_ACTION_COLUMNS,
        "personnel_actions",
        &filters,
        "effective_date DESC, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/personnel-actions/{id}",
    params(("id", Path, description = "Personnel action ID")),
    responses((status = 200, description = "Personnel action found", body = PersonnelAction), (status = 404, description = "Personnel action not found")),
    tag = "Personnel Action",
    security(("bearer_auth" = []))
)]
pub async fn get_personnel_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("personnel_action.read")?;
    let action = find_by_id::<PersonnelAction>(
        pool.get_ref(),
        PERSONNEL_ACTION_COLUMNS,
        "personnel_actions",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Personnel action"))?;
    Ok(HttpResponse::Ok().json(action))
}

#[utoipa::path(
    put,
    path = "/api/v1/personnel-actions/{id}",
    params(("id", Path, description = "Personnel action ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Personnel action updated"),
        (status = 404, description = "Personnel action not found"),
        (status = 409, description = "Already implemented")
    ),
    tag = "Personnel Action",
    security(("bearer_auth" = []))
)]
pub async fn update_personnel_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("personnel_action.update")?;
    let id = path.into_inner();
    if let Some(action_type) = body.get("action_type").and_then(Value::as_str) {
        action_type
            .parse::<PersonnelActionType>()
            .map_err(|_| AppError::field("action_type", "Unknown action type"))?;
    }
    ensure_open(pool.get_ref(), id).await?;

    let update = build_update_sql(&PERSONNEL_ACTIONS, &body, id, &auth.username)?;
    let affected = execute_update(pool.get_ref(), update).await?;
    updated(affected, "Personnel action")
}

#[utoipa::path(
    put,
    path = "/api/v1/personnel-actions/{id}/approve",
    params(("id", Path, description = "Personnel action ID")),
    request_body = ApprovePersonnelAction,
    responses(
        (status = 200, description = "Approval recorded"),
        (status = 404, description = "Personnel action not found"),
        (status = 409, description = "Already implemented")
    ),
    tag = "Personnel Action",
    security(("bearer_auth" = []))
)]
pub async fn approve_personnel_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ApprovePersonnelAction>,
) -> AppResult<HttpResponse> {
    auth.require("personnel_action.update")?;
    set_approval(
        pool.get_ref(),
        &payload.gate.gate(),
        path.into_inner(),
        payload.approved,
        &auth.username,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Personnel action approval recorded" })))
}

/// Applies the proposed changes to the employment once every approval is in.
#[utoipa::path(
    post,
    path = "/api/v1/personnel-actions/{id}/implement",
    params(("id", Path, description = "Personnel action ID")),
    responses(
        (status = 200, description = "Changes applied to the employment"),
        (status = 404, description = "Personnel action not found"),
        (status = 409, description = "Missing approvals or already implemented")
    ),
    tag = "Personnel Action",
    security(("bearer_auth" = []))
)]
#[instrument(name = "personnel_action_implement", skip(auth, pool), fields(user = %auth.username))]
pub async fn implement_personnel_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("personnel_action.update")?;
    let id = path.into_inner();

    let mut tx = pool.begin().await?;
    let action = sqlx::query_as::<_, PersonnelAction>(&format!(
        "SELECT {PERSONNEL_ACTION_COLUMNS} FROM personnel_actions WHERE id = ? FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Personnel action"))?;

    if action.implemented_at.is_some() {
        return Err(AppError::Conflict(
            "Personnel action has already been implemented".into(),
        ));
    }
    if !action.fully_approved() {
        return Err(AppError::Conflict(
            "All four approvals are required before implementation".into(),
        ));
    }

    let changes = employment_changes(&action);
    if !changes.is_empty() {
        let assignments = changes
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let values: Vec<SqlValue> = changes.into_iter().map(|(_, v)| v).collect();

        let result = sqlx::query(&format!(
            "UPDATE employments SET {assignments}, updated_by = ? WHERE id = ?"
        ))
        .bind_all(&values)
        .bind(&auth.username)
        .bind(action.employment_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Employment"));
        }
    }

    sqlx::query("UPDATE personnel_actions SET implemented_at = NOW(), updated_by = ? WHERE id = ?")
        .bind(&auth.username)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(personnel_action_id = id, employment_id = action.employment_id, "Personnel action implemented");
    Ok(HttpResponse::Ok().json(json!({ "message": "Personnel action implemented" })))
}

#[utoipa::path(
    delete,
    path = "/api/v1/personnel-actions/{id}",
    params(("id", Path, description = "Personnel action ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Personnel action not found"),
        (status = 409, description = "Implemented actions are kept")
    ),
    tag = "Personnel Action",
    security(("bearer_auth" = []))
)]
pub async fn delete_personnel_action(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("personnel_action.delete")?;
    let id = path.into_inner();
    ensure_open(pool.get_ref(), id).await?;
    hard_delete(pool.get_ref(), "personnel_actions", id, "Personnel action").await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> PersonnelAction {
        PersonnelAction {
            id: 1,
            employment_id: 9,
            action_type: "transfer".into(),
            effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            new_department_id: None,
            new_position_id: Some(4),
            new_site_id: Some(2),
            new_salary: None,
            reason: None,
            dept_head_approval: true,
            coo_approval: true,
            hr_approval: true,
            accountant_approval: false,
            implemented_at: None,
            created_by: None,
            updated_by: None,
            created_at: None,
        }
    }

    #[test]
    fn only_proposed_fields_are_applied() {
        let changes = employment_changes(&action());
        assert_eq!(
            changes,
            vec![
                ("position_id", SqlValue::U64(4)),
                ("site_id", SqlValue::U64(2)),
            ]
        );
    }

    #[test]
    fn new_salary_updates_the_pass_probation_salary() {
        let mut a = action();
        a.new_position_id = None;
        a.new_site_id = None;
        a.new_salary = Some(41000.0);
        assert_eq!(
            employment_changes(&a),
            vec![("pass_probation_salary", SqlValue::F64(41000.0))]
        );
    }

    #[test]
    fn needs_all_four_approvals() {
        let mut a = action();
        assert!(!a.fully_approved());
        a.accountant_approval = true;
        assert!(a.fully_approved());
    }

    #[test]
    fn every_gate_is_locked_after_implementation() {
        for gate in [
            PersonnelGate::DeptHead,
            PersonnelGate::Coo,
            PersonnelGate::Hr,
            PersonnelGate::Accountant,
        ] {
            let gate = gate.gate();
            assert_eq!(gate.open_condition, Some(NOT_IMPLEMENTED));
            assert!(gate.date_column.is_none());
        }
    }
}
