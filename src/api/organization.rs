use super::{hard_delete, updated};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::organization::{Department, Position, SectionDepartment, Site},
    utils::db_utils::{
        Filters, Updatable, build_update_sql, execute_update, fetch_page, find_by_id,
    },
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const SITE_COLUMNS: &str = "id, code, name, created_by, updated_by, created_at";
const DEPARTMENT_COLUMNS: &str = "id, name, description, created_by, updated_by, created_at";
const SECTION_COLUMNS: &str = "id, department_id, name, created_by, updated_by, created_at";
const POSITION_COLUMNS: &str =
    "id, department_id, title, level, is_manager, created_by, updated_by, created_at";

const SITES: Updatable = Updatable {
    table: "sites",
    columns: &["code", "name"],
    soft_delete: false,
};
const DEPARTMENTS: Updatable = Updatable {
    table: "departments",
    columns: &["name", "description"],
    soft_delete: false,
};
const SECTIONS: Updatable = Updatable {
    table: "section_departments",
    columns: &["department_id", "name"],
    soft_delete: false,
};
const POSITIONS: Updatable = Updatable {
    table: "positions",
    columns: &["department_id", "title", "level", "is_manager"],
    soft_delete: false,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrgQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Only for positions and section departments
    pub department_id: Option<u64>,
    pub search: Option<String>,
}

impl OrgQuery {
    fn page(&self) -> PageQuery {
        PageQuery::new(self.page, self.per_page)
    }
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateSite {
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "MRM")]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Mae Ramat")]
    pub name: String,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateDepartment {
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Human Resources")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreateSectionDepartment {
    pub department_id: u64,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreatePosition {
    pub department_id: u64,
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Medic")]
    pub title: String,
    #[validate(range(min = 1, max = 20))]
    pub level: Option<u32>,
    pub is_manager: Option<bool>,
}

// -------------------- Sites --------------------

#[utoipa::path(
    get,
    path = "/api/v1/sites",
    params(OrgQuery),
    responses((status = 200, description = "Paginated site list", body = Object)),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn list_sites(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OrgQuery>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;

    let mut filters = Filters::new();
    filters.search(&["code", "name"], query.search.as_deref());
    let page = fetch_page::<Site>(pool.get_ref(), SITE_COLUMNS, "sites", &filters, "name", &query.page()).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/sites/{id}",
    params(("id", Path, description = "Site ID")),
    responses(
        (status = 200, description = "Site found", body = Site),
        (status = 404, description = "Site not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_site(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;
    let site = find_by_id::<Site>(pool.get_ref(), SITE_COLUMNS, "sites", path.into_inner(), false)
        .await?
        .ok_or_else(|| AppError::not_found("Site"))?;
    Ok(HttpResponse::Ok().json(site))
}

#[utoipa::path(
    post,
    path = "/api/v1/sites",
    request_body = CreateSite,
    responses(
        (status = 201, description = "Site created"),
        (status = 409, description = "Site code already exists")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_site(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSite>,
) -> AppResult<HttpResponse> {
    auth.require("organization.create")?;
    payload.validate()?;

    let id = sqlx::query("INSERT INTO sites (code, name, created_by, updated_by) VALUES (?, ?, ?, ?)")
        .bind(payload.code.trim())
        .bind(payload.name.trim())
        .bind(&auth.username)
        .bind(&auth.username)
        .execute(pool.get_ref())
        .await?
        .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Site created", "id": id })))
}

#[utoipa::path(
    put,
    path = "/api/v1/sites/{id}",
    params(("id", Path, description = "Site ID")),
    request_body = Object,
    responses((status = 200, description = "Site updated"), (status = 404, description = "Site not found")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_site(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("organization.update")?;
    let update = build_update_sql(&SITES, &body, path.into_inner(), &auth.username)?;
    updated(execute_update(pool.get_ref(), update).await?, "Site")
}

#[utoipa::path(
    delete,
    path = "/api/v1/sites/{id}",
    params(("id", Path, description = "Site ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Site not found")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn delete_site(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.delete")?;
    hard_delete(pool.get_ref(), "sites", path.into_inner(), "Site").await
}

// -------------------- Departments --------------------

#[utoipa::path(
    get,
    path = "/api/v1/departments",
    params(OrgQuery),
    responses((status = 200, description = "Paginated department list", body = Object)),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn list_departments(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OrgQuery>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;

    let mut filters = Filters::new();
    filters.search(&["name"], query.search.as_deref());
    let page = fetch_page::<Department>(
        pool.get_ref(),
        DEPARTMENT_COLUMNS,
        "departments",
        &filters,
        "name",
        &query.page(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/departments/{id}",
    params(("id", Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department found", body = Department),
        (status = 404, description = "Department not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;
    let department = find_by_id::<Department>(
        pool.get_ref(),
        DEPARTMENT_COLUMNS,
        "departments",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Department"))?;
    Ok(HttpResponse::Ok().json(department))
}

#[utoipa::path(
    post,
    path = "/api/v1/departments",
    request_body = CreateDepartment,
    responses((status = 201, description = "Department created"), (status = 409, description = "Department name already exists")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateDepartment>,
) -> AppResult<HttpResponse> {
    auth.require("organization.create")?;
    payload.validate()?;

    let id = sqlx::query(
        "INSERT INTO departments (name, description, created_by, updated_by) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Department created", "id": id })))
}

#[utoipa::path(
    put,
    path = "/api/v1/departments/{id}",
    params(("id", Path, description = "Department ID")),
    request_body = Object,
    responses((status = 200, description = "Department updated"), (status = 404, description = "Department not found")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("organization.update")?;
    let update = build_update_sql(&DEPARTMENTS, &body, path.into_inner(), &auth.username)?;
    updated(execute_update(pool.get_ref(), update).await?, "Department")
}

/// Fails with 409 while positions or employments still reference it.
#[utoipa::path(
    delete,
    path = "/api/v1/departments/{id}",
    params(("id", Path, description = "Department ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Department is still referenced")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.delete")?;
    hard_delete(pool.get_ref(), "departments", path.into_inner(), "Department").await
}

// -------------------- Section departments --------------------

#[utoipa::path(
    get,
    path = "/api/v1/section-departments",
    params(OrgQuery),
    responses((status = 200, description = "Paginated section department list", body = Object)),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn list_section_departments(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OrgQuery>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;

    let mut filters = Filters::new();
    filters
        .eq("department_id", query.department_id)
        .search(&["name"], query.search.as_deref());
    let page = fetch_page::<SectionDepartment>(
        pool.get_ref(),
        SECTION_COLUMNS,
        "section_departments",
        &filters,
        "name",
        &query.page(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/section-departments/{id}",
    params(("id", Path, description = "Section department ID")),
    responses(
        (status = 200, description = "Section department found", body = SectionDepartment),
        (status = 404, description = "Section department not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_section_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;
    let section = find_by_id::<SectionDepartment>(
        pool.get_ref(),
        SECTION_COLUMNS,
        "section_departments",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Section department"))?;
    Ok(HttpResponse::Ok().json(section))
}

#[utoipa::path(
    post,
    path = "/api/v1/section-departments",
    request_body = CreateSectionDepartment,
    responses((status = 201, description = "Section department created")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_section_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSectionDepartment>,
) -> AppResult<HttpResponse> {
    auth.require("organization.create")?;
    payload.validate()?;

    let id = sqlx::query(
        "INSERT INTO section_departments (department_id, name, created_by, updated_by) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.department_id)
    .bind(payload.name.trim())
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Section department created", "id": id })))
}

#[utoipa::path(
    put,
    path = "/api/v1/section-departments/{id}",
    params(("id", Path, description = "Section department ID")),
    request_body = Object,
    responses((status = 200, description = "Section department updated")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_section_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("organization.update")?;
    let update = build_update_sql(&SECTIONS, &body, path.into_inner(), &auth.username)?;
    updated(execute_update(pool.get_ref(), update).await?, "Section department")
}

#[utoipa::path(
    delete,
    path = "/api/v1/section-departments/{id}",
    params(("id", Path, description = "Section department ID")),
    responses((status = 200, description = "Successfully deleted")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn delete_section_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.delete")?;
    hard_delete(pool.get_ref(), "section_departments", path.into_inner(), "Section department").await
}

// -------------------- Positions --------------------

#[utoipa::path(
    get,
    path = "/api/v1/positions",
    params(OrgQuery),
    responses((status = 200, description = "Paginated position list", body = Object)),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn list_positions(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OrgQuery>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;

    let mut filters = Filters::new();
    filters
        .eq("department_id", query.department_id)
        .search(&["title"], query.search.as_deref());
    let page = fetch_page::<Position>(
        pool.get_ref(),
        POSITION_COLUMNS,
        "positions",
        &filters,
        "level, title",
        &query.page(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/positions/{id}",
    params(("id", Path, description = "Position ID")),
    responses(
        (status = 200, description = "Position found", body = Position),
        (status = 404, description = "Position not found")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn get_position(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.read")?;
    let position =
        find_by_id::<Position>(pool.get_ref(), POSITION_COLUMNS, "positions", path.into_inner(), false)
            .await?
            .ok_or_else(|| AppError::not_found("Position"))?;
    Ok(HttpResponse::Ok().json(position))
}

#[utoipa::path(
    post,
    path = "/api/v1/positions",
    request_body = CreatePosition,
    responses((status = 201, description = "Position created")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn create_position(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePosition>,
) -> AppResult<HttpResponse> {
    auth.require("organization.create")?;
    payload.validate()?;

    let id = sqlx::query(
        r#"
        INSERT INTO positions (department_id, title, level, is_manager, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.department_id)
    .bind(payload.title.trim())
    .bind(payload.level.unwrap_or(1))
    .bind(payload.is_manager.unwrap_or(false))
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    Ok(HttpResponse::Created().json(json!({ "message": "Position created", "id": id })))
}

#[utoipa::path(
    put,
    path = "/api/v1/positions/{id}",
    params(("id", Path, description = "Position ID")),
    request_body = Object,
    responses((status = 200, description = "Position updated")),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn update_position(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("organization.update")?;
    let update = build_update_sql(&POSITIONS, &body, path.into_inner(), &auth.username)?;
    updated(execute_update(pool.get_ref(), update).await?, "Position")
}

/// Fails with 409 while employments still reference it.
#[utoipa::path(
    delete,
    path = "/api/v1/positions/{id}",
    params(("id", Path, description = "Position ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 409, description = "Position is still referenced")
    ),
    tag = "Organization",
    security(("bearer_auth" = []))
)]
pub async fn delete_position(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("organization.delete")?;
    hard_delete(pool.get_ref(), "positions", path.into_inner(), "Position").await
}
