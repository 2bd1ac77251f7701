use super::updated;
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::employee::{EMPLOYEE_COLUMNS, Employee},
    services::recycle_bin::{TrashEntity, soft_delete},
    utils::db_utils::{Filters, Updatable, build_update_sql, execute_update, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const EMPLOYEES: Updatable = Updatable {
    table: "employees",
    columns: &[
        "staff_id",
        "site_id",
        "first_name",
        "last_name",
        "gender",
        "date_of_birth",
        "nationality",
        "status",
        "email",
        "phone",
        "bank_name",
        "bank_branch",
        "bank_account_name",
        "bank_account_number",
        "emergency_contact_name",
        "emergency_contact_relationship",
        "emergency_contact_phone",
    ],
    soft_delete: true,
};

#[derive(Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateEmployee {
    #[validate(length(min = 1, max = 50))]
    #[schema(example = "0001", value_type = String)]
    pub staff_id: String,
    pub site_id: Option<u64>,
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "first name", value_type = String)]
    pub first_name: String,
    pub last_name: Option<String>,
    #[schema(example = "female")]
    pub gender: Option<String>,
    #[schema(example = "1990-01-15", format = "date", value_type = Option<String>)]
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    #[validate(email)]
    #[schema(example = "john@email.com", format = "email")]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bank_name: Option<String>,
    pub bank_branch: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub site_id: Option<u64>,
    pub status: Option<String>,
    /// Matches staff id, names and email
    pub search: Option<String>,
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/v1/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = Object, example = json!({
            "message": "Employee created", "id": 1
        })),
        (status = 409, description = "Staff id already exists"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    auth.require("employee.create")?;
    payload.validate()?;

    let id = sqlx::query(
        r#"
        INSERT INTO employees
        (staff_id, site_id, first_name, last_name, gender, date_of_birth, nationality, email,
         phone, bank_name, bank_branch, bank_account_name, bank_account_number,
         emergency_contact_name, emergency_contact_relationship, emergency_contact_phone,
         created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.staff_id.trim())
    .bind(payload.site_id)
    .bind(payload.first_name.trim())
    .bind(&payload.last_name)
    .bind(&payload.gender)
    .bind(payload.date_of_birth)
    .bind(&payload.nationality)
    .bind(&payload.email)
    .bind(&payload.phone)
    .bind(&payload.bank_name)
    .bind(&payload.bank_branch)
    .bind(&payload.bank_account_name)
    .bind(&payload.bank_account_number)
    .bind(&payload.emergency_contact_name)
    .bind(&payload.emergency_contact_relationship)
    .bind(&payload.emergency_contact_phone)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(employee_id = id, "Employee created");
    Ok(HttpResponse::Created().json(json!({ "message": "Employee created", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = Object)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    auth.require("employee.read")?;

    let mut filters = Filters::new();
    filters
        .raw("deleted_at IS NULL", vec![])
        .eq("site_id", query.site_id)
        .eq("status", query.status.clone())
        .search(
            &["staff_id", "first_name", "last_name", "email"],
            query.search.as_deref(),
        );

    let page = fetch_page::<Employee>(
        pool.get_ref(),
        EMPLOYEE_COLUMNS,
        "employees",
        &filters,
        "id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found", body = Object, example = json!({
            "message": "Employee not found"
        }))
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("employee.read")?;
    let employee_id = path.into_inner();

    let employee =
        find_by_id::<Employee>(pool.get_ref(), EMPLOYEE_COLUMNS, "employees", employee_id, true)
            .await?
            .ok_or_else(|| AppError::not_found("Employee"))?;

    Ok(HttpResponse::Ok().json(employee))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    request_body = Object,
    responses(
        (status = 200, description = "Employee updated successfully", body = Object, example = json!({
            "message": "Employee updated successfully"
        })),
        (status = 400, description = "Field cannot be updated"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require("employee.update")?;

    let update = build_update_sql(&EMPLOYEES, &body, path.into_inner(), &auth.username)?;
    updated(execute_update(pool.get_ref(), update).await?, "Employee")
}

/// Moves the employee to the recycle bin.
#[utoipa::path(
    delete,
    path = "/api/v1/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Moved to recycle bin"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("employee.delete")?;

    soft_delete(pool.get_ref(), TrashEntity::Employees, path.into_inner(), &auth.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Employee moved to recycle bin" })))
}
