pub mod employee;
pub mod employment;
pub mod funding_allocation;
pub mod grant;
pub mod holiday_compensation;
pub mod leave;
pub mod leave_request;
pub mod organization;
pub mod payroll;
pub mod payroll_batch;
pub mod personnel_action;
pub mod probation;
pub mod recycle_bin;
pub mod resignation;
pub mod travel_request;
pub mod user;

use actix_web::HttpResponse;
use serde_json::json;
use sqlx::MySqlPool;

use crate::error::{AppError, AppResult};

/// Response for a whitelisted partial update.
pub(crate) fn updated(affected: u64, entity: &'static str) -> AppResult<HttpResponse> {
    if affected == 0 {
        return Err(AppError::not_found(entity));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": format!("{entity} updated successfully") })))
}

/// Hard delete by id; FK violations surface as 409.
pub(crate) async fn hard_delete(
    pool: &MySqlPool,
    table: &str,
    id: u64,
    entity: &'static str,
) -> AppResult<HttpResponse> {
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found(entity));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
