use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult},
    model::payroll::{
        EncryptedPayroll, PAYROLL_COLUMNS, Payroll, PayrollGrantAllocation, SNAPSHOT_COLUMNS,
    },
    services::payroll_calc::{Adjustments, PayPeriod, PayrollComputation},
    services::payroll_run::{
        CreatedPayroll, PayrollRequest, create_payroll_for_employment, preview_payroll,
    },
    services::recycle_bin::{TrashEntity, soft_delete},
    utils::cipher::SalaryCipher,
    utils::db_utils::{Filters, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Deserialize, Validate, ToSchema)]
pub struct CreatePayroll {
    #[schema(example = 12)]
    pub employment_id: u64,

    /// Any date inside the month to pay
    #[schema(example = "2025-03-01", value_type = String, format = "date")]
    pub pay_period_date: NaiveDate,

    #[validate(range(min = 0.0))]
    #[schema(example = 500.0)]
    pub bonus: Option<f64>,

    #[validate(range(min = 0.0))]
    #[schema(example = 200.0)]
    pub deductions: Option<f64>,

    pub notes: Option<String>,
}

impl CreatePayroll {
    fn adjustments(&self) -> Adjustments {
        Adjustments {
            bonus: self.bonus.unwrap_or(0.0),
            deductions: self.deductions.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PayrollQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employment_id: Option<u64>,
    pub employee_id: Option<u64>,
    /// Any date inside the month
    #[param(value_type = Option<String>, format = "date")]
    pub pay_period_date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct PayrollDetail {
    #[serde(flatten)]
    pub payroll: Payroll,
    /// Funding source as it was when the payroll was created
    pub funding_snapshot: Option<PayrollGrantAllocation>,
}

#[utoipa::path(
    post,
    path = "/api/v1/payrolls",
    request_body = CreatePayroll,
    responses(
        (status = 201, description = "One payroll per active allocation created", body = CreatedPayroll),
        (status = 404, description = "Employment or employee not found"),
        (status = 409, description = "Payroll already exists for the period"),
        (status = 422, description = "No active funding or invalid amounts")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn create_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cipher: web::Data<SalaryCipher>,
    config: web::Data<Config>,
    payload: web::Json<CreatePayroll>,
) -> AppResult<HttpResponse> {
    auth.require("payroll.create")?;
    payload.validate()?;

    let request = PayrollRequest {
        employment_id: payload.employment_id,
        pay_period_date: payload.pay_period_date,
        adjustments: payload.adjustments(),
        notes: payload.notes.clone(),
    };
    let created = create_payroll_for_employment(
        pool.get_ref(),
        cipher.get_ref(),
        &request,
        config.pvd_rate,
        &auth.username,
    )
    .await?;

    Ok(HttpResponse::Created().json(created))
}

/// Runs the calculation without saving anything.
#[utoipa::path(
    post,
    path = "/api/v1/payrolls/preview",
    request_body = CreatePayroll,
    responses(
        (status = 200, description = "Computed payroll", body = PayrollComputation),
        (status = 404, description = "Employment not found"),
        (status = 422, description = "No active funding or invalid amounts")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn preview(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<CreatePayroll>,
) -> AppResult<HttpResponse> {
    auth.require("payroll.read")?;
    payload.validate()?;

    let computation = preview_payroll(
        pool.get_ref(),
        payload.employment_id,
        payload.pay_period_date,
        payload.adjustments(),
        config.pvd_rate,
    )
    .await?;
    Ok(HttpResponse::Ok().json(computation))
}

#[utoipa::path(
    get,
    path = "/api/v1/payrolls",
    params(PayrollQuery),
    responses((status = 200, description = "Paginated payroll list with decrypted amounts", body = Object)),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn list_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cipher: web::Data<SalaryCipher>,
    query: web::Query<PayrollQuery>,
) -> AppResult<HttpResponse> {
    auth.require("payroll.read")?;
    let employee_id = auth.scope_employee(query.employee_id)?;
    let period = query
        .pay_period_date
        .map(PayPeriod::containing)
        .transpose()?
        .map(|p| p.start);

    let mut filters = Filters::new();
    filters
        .raw("deleted_at IS NULL", vec![])
        .eq("employment_id", query.employment_id)
        .eq("employee_id", employee_id)
        .eq("pay_period_date", period);

    let page = fetch_page::<EncryptedPayroll>(
        pool.get_ref(),
        PAYROLL_COLUMNS,
        "payrolls",
        &filters,
        "pay_period_date DESC, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?
    .try_map(|row| row.decrypt(cipher.get_ref()))?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/payrolls/{id}",
    params(("id", Path, description = "Payroll ID")),
    responses(
        (status = 200, description = "Payroll with its funding snapshot", body = PayrollDetail),
        (status = 404, description = "Payroll not found")
    ),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn get_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cipher: web::Data<SalaryCipher>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("payroll.read")?;
    let payroll_id = path.into_inner();

    let row = find_by_id::<EncryptedPayroll>(
        pool.get_ref(),
        PAYROLL_COLUMNS,
        "payrolls",
        payroll_id,
        true,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Payroll"))?;
    auth.scope_employee(Some(row.employee_id))?;

    let funding_snapshot = sqlx::query_as::<_, PayrollGrantAllocation>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM payroll_grant_allocations WHERE payroll_id = ?"
    ))
    .bind(payroll_id)
    .fetch_optional(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(PayrollDetail {
        payroll: row.decrypt(cipher.get_ref())?,
        funding_snapshot,
    }))
}

/// Moves the payroll to the recycle bin.
#[utoipa::path(
    delete,
    path = "/api/v1/payrolls/{id}",
    params(("id", Path, description = "Payroll ID")),
    responses((status = 200, description = "Payroll moved to the recycle bin"), (status = 404, description = "Payroll not found")),
    tag = "Payroll",
    security(("bearer_auth" = []))
)]
pub async fn delete_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("payroll.delete")?;
    soft_delete(pool.get_ref(), TrashEntity::Payrolls, path.into_inner(), &auth.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Payroll moved to recycle bin" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn adjustments_default_to_zero() {
        let payload: CreatePayroll = serde_json::from_value(json!({
            "employment_id": 3,
            "pay_period_date": "2025-03-15"
        }))
        .unwrap();
        let adjustments = payload.adjustments();
        assert_eq!(adjustments.bonus, 0.0);
        assert_eq!(adjustments.deductions, 0.0);
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn negative_bonus_is_rejected() {
        let payload: CreatePayroll = serde_json::from_value(json!({
            "employment_id": 3,
            "pay_period_date": "2025-03-15",
            "bonus": -1.0
        }))
        .unwrap();
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("bonus"));
    }
}
