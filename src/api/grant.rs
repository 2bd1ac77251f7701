use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::grant::{GRANT_COLUMNS, GRANT_ITEM_COLUMNS, Grant, GrantItem},
    services::recycle_bin::{TrashEntity, soft_delete},
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

const GRANTS: Updatable = Updatable {
    table: "grants",
    columns: &["code", "name", "organization", "description", "end_date", "is_hub"],
    soft_delete: true,
};

const GRANT_ITEMS: Updatable = Updatable {
    table: "grant_items",
    columns: &[
        "grant_position",
        "grant_salary",
        "grant_benefit",
        "grant_level_of_effort",
        "grant_position_number",
        "budgetline_code",
    ],
    soft_delete: false,
};

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateGrant {
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "S0031")]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub organization: Option<String>,
    pub description: Option<String>,
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_hub: bool,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateGrantItem {
    #[validate(length(max = 255))]
    #[schema(example = "Medic")]
    pub grant_position: Option<String>,
    #[validate(range(min = 0.0))]
    pub grant_salary: Option<f64>,
    #[validate(range(min = 0.0))]
    pub grant_benefit: Option<f64>,
    #[validate(range(min = 0.0, max = 1.0))]
    #[schema(example = 0.5)]
    pub grant_level_of_effort: Option<f64>,
    pub grant_position_number: Option<u32>,
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "1.2.1.3")]
    pub budgetline_code: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct GrantQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub is_hub: Option<bool>,
    /// Matches code, name and organization
    pub search: Option<String>,
}

/// Non-null `(grant_id, grant_position, budgetline_code)` must be unique.
async fn ensure_unique_budget_line(
    pool: &MySqlPool,
    grant_id: u64,
    grant_position: Option<&str>,
    budgetline_code: Option<&str>,
    except: Option<u64>,
) -> AppResult<()> {
    let (Some(position), Some(code)) = (grant_position, budgetline_code) else {
        return Ok(());
    };
    let taken = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM grant_items
            WHERE grant_id = ? AND grant_position = ? AND budgetline_code = ? AND id <> ?
        )
        "#,
    )
    .bind(grant_id)
    .bind(position)
    .bind(code)
    .bind(except.unwrap_or(0))
    .fetch_one(pool)
    .await?;
    if taken {
        return Err(AppError::field(
            "budgetline_code",
            "This grant already has the position on this budget line",
        ));
    }
    Ok(())
}

async fn live_grant_exists(pool: &MySqlPool, grant_id: u64) -> AppResult<()> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM grants WHERE id = ? AND deleted_at IS NULL)",
    )
    .bind(grant_id)
    .fetch_one(pool)
    .await?;
    if !exists {
        return Err(AppError::not_found("Grant"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/grants",
    request_body = CreateGrant,
    responses(
        (status = 201, description = "Grant created"),
        (status = 409, description = "Grant code already exists")
    ),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn create_grant(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateGrant>,
) -> AppResult<HttpResponse> {
    auth.require("grant.create")?;
    payload.validate()?;

    let id = sqlx::query(
        r#"
        INSERT INTO grants (code, name, organization, description, end_date, is_hub, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.code.trim())
    .bind(payload.name.trim())
    .bind(&payload.organization)
    .bind(&payload.description)
    .bind(payload.end_date)
    .bind(payload.is_hub)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(grant_id = id, "Grant created");
    Ok(HttpResponse::Created().json(json!({ "message": "Grant created", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/grants",
    params(GrantQuery),
    responses((status = 200, description = "Paginated grant list", body = Object)),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn list_grants(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<GrantQuery>,
) -> AppResult<HttpResponse> {
    auth.require("grant.read")?;

    let mut filters = Filters::new();
    filters
        .raw("deleted_at IS NULL", vec![])
        .eq("is_hub", query.is_hub)
        .search(&["code", "name", "organization"], query.search.as_deref());

    let page = fetch_page::<Grant>(
        pool.get_ref(),
        GRANT_COLUMNS,
        "grants",
        &filters,
        "code",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/grants/{id}",
    params(("id", Path, description = "Grant ID")),
    responses(
        (status = 200, description = "Grant found", body = Grant),
        (status = 404, description = "Grant not found")
    ),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn get_grant(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("grant.read")?;
    let grant = find_by_id::<Grant>(pool.get_ref(), GRANT_COLUMNS, "grants", path.into_inner(), true)
        .await?
        .ok_or_else(|| AppError::not_found("Grant"))?;
    Ok(HttpResponse::Ok().json(grant))
}

#[utoipa::path(
    put,
    path = "/api/v1/grants/{id}",
    params(("id", Path, description = "Grant ID")),
    request_body = Object,
    responses((status = 200, description = "Grant updated"), (status = 404, description = "Grant not found")),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn update_grant(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("grant.update")?;
    let update = build_update_sql(&GRANTS, &body, path.into_inner(), &auth.username)?;
    updated(execute_update(pool.get_ref(), update).await?, "Grant")
}

/// Moves the grant to the recycle bin. Existing payroll snapshots keep their
/// copied grant values.
#[utoipa::path(
    delete,
    path = "/api/v1/grants/{id}",
    params(("id", Path, description = "Grant ID")),
    responses((status = 200, description = "Moved to recycle bin"), (status = 404, description = "Grant not found")),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn delete_grant(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("grant.delete")?;
    soft_delete(pool.get_ref(), TrashEntity::Grants, path.into_inner(), &auth.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Grant moved to recycle bin" })))
}

// -------------------- Grant items --------------------

#[utoipa::path(
    get,
    path = "/api/v1/grants/{id}/items",
    params(("id", Path, description = "Grant ID")),
    responses((status = 200, description = "Items of the grant", body = [GrantItem])),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn list_grant_items(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("grant.read")?;
    let grant_id = path.into_inner();
    live_grant_exists(pool.get_ref(), grant_id).await?;

    let items = sqlx::query_as::<_, GrantItem>(&format!(
        "SELECT {GRANT_ITEM_COLUMNS} FROM grant_items WHERE grant_id = ? ORDER BY budgetline_code, id"
    ))
    .bind(grant_id)
    .fetch_all(pool.get_ref())
    .await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    post,
    path = "/api/v1/grants/{id}/items",
    params(("id", Path, description = "Grant ID")),
    request_body = CreateGrantItem,
    responses(
        (status = 201, description = "Grant item created"),
        (status = 404, description = "Grant not found"),
        (status = 422, description = "Duplicate budget line or invalid values")
    ),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn create_grant_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateGrantItem>,
) -> AppResult<HttpResponse> {
    auth.require("grant.create")?;
    payload.validate()?;
    let grant_id = path.into_inner();
    live_grant_exists(pool.get_ref(), grant_id).await?;

    ensure_unique_budget_line(
        pool.get_ref(),
        grant_id,
        payload.grant_position.as_deref(),
        payload.budgetline_code.as_deref(),
        None,
    )
    .await?;

    let id = sqlx::query(
        r#"
        INSERT INTO grant_items
        (grant_id, grant_position, grant_salary, grant_benefit, grant_level_of_effort,
         grant_position_number, budgetline_code, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(grant_id)
    .bind(&payload.grant_position)
    .bind(payload.grant_salary)
    .bind(payload.grant_benefit)
    .bind(payload.grant_level_of_effort)
    .bind(payload.grant_position_number)
    .bind(&payload.budgetline_code)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Grant item created", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/grant-items/{id}",
    params(("id", Path, description = "Grant item ID")),
    responses(
        (status = 200, description = "Grant item found", body = GrantItem),
        (status = 404, description = "Grant item not found")
    ),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn get_grant_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("grant.read")?;
    let item = find_by_id::<GrantItem>(
        pool.get_ref(),
        GRANT_ITEM_COLUMNS,
        "grant_items",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Grant item"))?;
    Ok(HttpResponse::Ok().json(item))
}

/// The budget line a partial update would leave behind.
fn merged_budget_line(current: &GrantItem, body: &Value) -> (Option<String>, Option<String>) {
    let pick = |field: &str, existing: &Option<String>| match body.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) => None,
        _ => existing.clone(),
    };
    (
        pick("grant_position", &current.grant_position),
        pick("budgetline_code", &current.budgetline_code),
    )
}

#[utoipa::path(
    put,
    path = "/api/v1/grant-items/{id}",
    params(("id", Path, description = "Grant item ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Grant item updated"),
        (status = 404, description = "Grant item not found"),
        (status = 422, description = "Duplicate budget line")
    ),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn update_grant_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("grant.update")?;
    let item_id = path.into_inner();

    let current = find_by_id::<GrantItem>(pool.get_ref(), GRANT_ITEM_COLUMNS, "grant_items", item_id, false)
        .await?
        .ok_or_else(|| AppError::not_found("Grant item"))?;

    if let Some(loe) = body.get("grant_level_of_effort").and_then(Value::as_f64) {
        if !(0.0..=1.0).contains(&loe) {
            return Err(AppError::field(
                "grant_level_of_effort",
                "Level of effort must be between 0 and 1",
            ));
        }
    }

    let (position, code) = merged_budget_line(&current, &body);
    ensure_unique_budget_line(
        pool.get_ref(),
        current.grant_id,
        position.as_deref(),
        code.as_deref(),
        Some(item_id),
    )
    .await?;

    let update = build_update_sql(&GRANT_ITEMS, &body, item_id, &auth.username)?;
    updated(execute_update(pool.get_ref(), update).await?, "Grant item")
}

/// Allocations charged to the item lose their link; payroll snapshots keep
/// their copied values.
#[utoipa::path(
    delete,
    path = "/api/v1/grant-items/{id}",
    params(("id", Path, description = "Grant item ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Grant item not found")),
    tag = "Grant",
    security(("bearer_auth" = []))
)]
pub async fn delete_grant_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("grant.delete")?;
    hard_delete(pool.get_ref(), "grant_items", path.into_inner(), "Grant item").await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> GrantItem {
        GrantItem {
            id: 3,
            grant_id: 1,
            grant_position: Some("Medic".into()),
            grant_salary: Some(20_000.0),
            grant_benefit: None,
            grant_level_of_effort: Some(1.0),
            grant_position_number: Some(2),
            budgetline_code: Some("1.2.1".into()),
            created_by: None,
            updated_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let (position, code) = merged_budget_line(&item(), &json!({ "grant_salary": 1.0 }));
        assert_eq!(position.as_deref(), Some("Medic"));
        assert_eq!(code.as_deref(), Some("1.2.1"));
    }

    #[test]
    fn merge_applies_new_and_cleared_values() {
        let (position, code) = merged_budget_line(
            &item(),
            &json!({ "grant_position": "Nurse", "budgetline_code": null }),
        );
        assert_eq!(position.as_deref(), Some("Nurse"));
        assert_eq!(code, None);
    }

    #[test]
    fn level_of_effort_is_a_fraction() {
        let item: CreateGrantItem = serde_json::from_value(json!({
            "grant_position": "Medic",
            "grant_level_of_effort": 1.5
        }))
        .unwrap();
        assert!(item.validate().is_err());
    }
}
