//! User accounts and role permission grants.

use crate::{
    auth::auth::AuthUser,
    auth::permissions::PermissionCache,
    error::{AppError, AppResult},
    model::permission::is_known,
    model::role::Role,
    utils::db_utils::{Filters, fetch_page},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::collections::HashSet;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const USER_COLUMNS: &str = "id, username, role_id, employee_id, is_active, last_login_at, created_at";

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserSummary {
    pub id: u64,
    pub username: String,
    pub role_id: u8,
    pub employee_id: Option<u64>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub role_id: Option<u8>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateUser {
    /// 1 admin, 2 hr, 3 employee, 4 system, 5 api user
    #[schema(example = 2)]
    pub role_id: Option<u8>,
    pub employee_id: Option<u64>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct RolePermissions {
    #[schema(example = json!(["payroll.read", "employee.read"]))]
    pub permissions: Vec<String>,
}

fn parse_role(role_id: u8) -> AppResult<Role> {
    Role::from_id(role_id).ok_or_else(|| AppError::field("role_id", "Unknown role"))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(UserQuery),
    responses((status = 200, description = "Paginated user accounts", body = Object)),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserQuery>,
) -> AppResult<HttpResponse> {
    auth.require("user.read")?;

    let mut filters = Filters::new();
    filters
        .eq("role_id", query.role_id.map(u64::from))
        .eq("is_active", query.is_active)
        .search(&["username"], query.search.as_deref());

    let page = fetch_page::<UserSummary>(
        pool.get_ref(),
        USER_COLUMNS,
        "users",
        &filters,
        "id",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Deactivating an account also revokes its refresh tokens.
#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id", Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Unknown role")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUser>,
) -> AppResult<HttpResponse> {
    auth.require("user.update")?;
    let user_id = path.into_inner();
    let role = payload.role_id.map(parse_role).transpose()?;
    if user_id == auth.user_id && payload.is_active == Some(false) {
        return Err(AppError::BadRequest("You cannot deactivate your own account".into()));
    }

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE users
        SET role_id = COALESCE(?, role_id),
            employee_id = COALESCE(?, employee_id),
            is_active = COALESCE(?, is_active)
        WHERE id = ?
        "#,
    )
    .bind(role.map(Role::id))
    .bind(payload.employee_id)
    .bind(payload.is_active)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("User"));
    }

    if payload.is_active == Some(false) {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(user_id, by = %auth.username, "User account updated");
    Ok(HttpResponse::Ok().json(json!({ "message": "User updated successfully" })))
}

#[utoipa::path(
    get,
    path = "/api/v1/roles/{role_id}/permissions",
    params(("role_id", Path, description = "Role ID")),
    responses((status = 200, description = "Permission names granted to the role", body = [String])),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn get_role_permissions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<PermissionCache>,
    path: web::Path<u8>,
) -> AppResult<HttpResponse> {
    auth.require("user.read")?;
    let role = parse_role(path.into_inner())?;
    let set = cache.permissions_for(pool.get_ref(), role).await?;
    let mut names: Vec<&String> = set.iter().collect();
    names.sort();
    Ok(HttpResponse::Ok().json(names))
}

/// Replaces the role's grants. Takes effect immediately for new requests.
#[utoipa::path(
    put,
    path = "/api/v1/roles/{role_id}/permissions",
    params(("role_id", Path, description = "Role ID")),
    request_body = RolePermissions,
    responses(
        (status = 200, description = "Grants replaced"),
        (status = 422, description = "Unknown role or permission")
    ),
    tag = "User",
    security(("bearer_auth" = []))
)]
pub async fn set_role_permissions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<PermissionCache>,
    path: web::Path<u8>,
    payload: web::Json<RolePermissions>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    auth.require("user.update")?;
    let role = parse_role(path.into_inner())?;

    let wanted: HashSet<String> = payload.permissions.iter().map(|p| p.trim().to_string()).collect();
    if let Some(unknown) = wanted.iter().find(|p| !is_known(p)) {
        return Err(AppError::field("permissions", format!("Unknown permission `{unknown}`")));
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM role_has_permissions WHERE role_id = ?")
        .bind(role.id())
        .execute(&mut *tx)
        .await?;
    for name in &wanted {
        sqlx::query(
            r#"
            INSERT INTO role_has_permissions (role_id, permission_id)
            SELECT ?, id FROM permissions WHERE name = ?
            "#,
        )
        .bind(role.id())
        .bind(name)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    cache.invalidate(role).await;

    info!(role = role.id(), by = %auth.username, "Role permissions replaced");
    Ok(HttpResponse::Ok().json(json!({ "message": "Role permissions updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_roles_are_rejected() {
        assert_eq!(parse_role(2).unwrap(), Role::Hr);
        assert!(matches!(parse_role(9), Err(AppError::Validation(_))));
    }
}
