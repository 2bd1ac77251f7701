use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::payroll::{BATCH_COLUMNS, PayrollBatch},
    services::payroll_batch::start_batch,
    utils::cipher::SalaryCipher,
    utils::db_utils::find_by_id,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct StartBatch {
    /// Any date inside the month to pay
    #[schema(example = "2025-03-01", value_type = String, format = "date")]
    pub pay_period_date: NaiveDate,
}

/// Queues payroll for every active employment in the period. Poll the
/// returned batch for progress.
#[utoipa::path(
    post,
    path = "/api/v1/payroll-batches",
    request_body = StartBatch,
    responses((status = 202, description = "Batch accepted")),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn create_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cipher: web::Data<SalaryCipher>,
    config: web::Data<Config>,
    payload: web::Json<StartBatch>,
) -> AppResult<HttpResponse> {
    auth.require("payroll.create")?;

    let batch_id = start_batch(
        pool.get_ref().clone(),
        cipher.get_ref().clone(),
        config.pvd_rate,
        payload.pay_period_date,
        auth.username.clone(),
    )
    .await?;

    info!(batch_id, user = %auth.username, "Payroll batch queued");
    Ok(HttpResponse::Accepted().json(json!({ "message": "Payroll batch started", "id": batch_id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/payroll-batches/{id}",
    params(("id", Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch progress", body = PayrollBatch),
        (status = 404, description = "Batch not found")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_batch(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("payroll.read")?;
    let batch = find_by_id::<PayrollBatch>(
        pool.get_ref(),
        BATCH_COLUMNS,
        "payroll_batches",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Payroll batch"))?;
    Ok(HttpResponse::Ok().json(batch))
}
