use super::{employment::LOCK_EMPLOYEE_SQL, hard_delete};
use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::funding_allocation::{
        ALLOCATION_COLUMNS, AllocationStatus, AllocationType, FundingAllocation,
    },
    services::funding::{AllocationSpan, check_capacity, validate_fte, validate_range},
    utils::db_utils::{Filters, fetch_page, find_by_id},
    utils::pagination::PageQuery,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateAllocation {
    pub employment_id: u64,
    pub allocation_type: AllocationType,
    /// Required for `grant` allocations
    pub grant_item_id: Option<u64>,
    /// Hub grant, required for `org_funded` allocations
    pub grant_id: Option<u64>,
    #[schema(example = 0.6)]
    pub fte: f64,
    #[schema(example = "2025-01-01", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
}

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAllocation {
    pub fte: Option<f64>,
    #[schema(format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    /// `null` makes the allocation open-ended
    #[serde(default, deserialize_with = "double_option")]
    #[schema(format = "date", value_type = Option<String>)]
    pub end_date: Option<Option<NaiveDate>>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAllocationStatus {
    pub status: AllocationStatus,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AllocationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employment_id: Option<u64>,
    pub employee_id: Option<u64>,
    pub allocation_type: Option<String>,
    pub status: Option<String>,
}

/// Every allocation of the employee, across all of their employments. FTE
/// capacity is an employee-wide limit, so an older employment's open
/// allocations still count.
const EMPLOYEE_ALLOCATIONS_SQL: &str = "WHERE employee_id = ?";

/// Locks the employee that owns the employment so concurrent allocation
/// changes are serialized, then returns the employee id and every
/// allocation the employee holds.
async fn lock_employee_allocations(
    conn: &mut MySqlConnection,
    employment_id: u64,
) -> AppResult<(u64, Vec<AllocationSpan>)> {
    let employee_id =
        sqlx::query_scalar::<_, u64>("SELECT employee_id FROM employments WHERE id = ?")
            .bind(employment_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::not_found("Employment"))?;

    // Same lock employment creation takes.
    sqlx::query(LOCK_EMPLOYEE_SQL)
        .bind(employee_id)
        .execute(&mut *conn)
        .await?;

    let rows = sqlx::query_as::<_, FundingAllocation>(&format!(
        "SELECT {ALLOCATION_COLUMNS} FROM employee_funding_allocations {EMPLOYEE_ALLOCATIONS_SQL}"
    ))
    .bind(employee_id)
    .fetch_all(&mut *conn)
    .await?;

    let spans = rows
        .iter()
        .map(AllocationSpan::from_row)
        .collect::<AppResult<Vec<_>>>()?;
    Ok((employee_id, spans))
}

/// Grant allocations need a live grant item; org-funded ones a live hub grant.
async fn check_source(
    conn: &mut MySqlConnection,
    allocation_type: AllocationType,
    grant_item_id: Option<u64>,
    grant_id: Option<u64>,
) -> AppResult<()> {
    match allocation_type {
        AllocationType::Grant => {
            let item_id = grant_item_id
                .ok_or_else(|| AppError::field("grant_item_id", "Grant allocations need a grant item"))?;
            let live = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM grant_items gi
                    JOIN grants g ON g.id = gi.grant_id AND g.deleted_at IS NULL
                    WHERE gi.id = ?
                )
                "#,
            )
            .bind(item_id)
            .fetch_one(&mut *conn)
            .await?;
            if !live {
                return Err(AppError::field("grant_item_id", "Grant item not found"));
            }
        }
        AllocationType::OrgFunded => {
            let grant_id = grant_id
                .ok_or_else(|| AppError::field("grant_id", "Org-funded allocations need a hub grant"))?;
            let hub = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM grants WHERE id = ? AND is_hub = TRUE AND deleted_at IS NULL)",
            )
            .bind(grant_id)
            .fetch_one(&mut *conn)
            .await?;
            if !hub {
                return Err(AppError::field("grant_id", "grant_id must reference a hub grant"));
            }
        }
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/api/v1/funding-allocations",
    request_body = CreateAllocation,
    responses(
        (status = 201, description = "Allocation created"),
        (status = 404, description = "Employment not found"),
        (status = 422, description = "Invalid FTE, dates, source or capacity exceeded")
    ),
    tag = "Funding Allocation",
    security(("bearer_auth" = []))
)]
pub async fn create_allocation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAllocation>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.create")?;
    validate_fte(payload.fte)?;
    validate_range(payload.start_date, payload.end_date)?;

    let mut tx = pool.begin().await?;
    let (employee_id, existing) = lock_employee_allocations(&mut tx, payload.employment_id).await?;
    check_source(&mut tx, payload.allocation_type, payload.grant_item_id, payload.grant_id).await?;

    let candidate = AllocationSpan {
        id: None,
        fte: payload.fte,
        status: AllocationStatus::Active,
        start_date: payload.start_date,
        end_date: payload.end_date,
    };
    check_capacity(&existing, &candidate)?;

    // Org-funded rows keep only the hub grant; grant rows only the item.
    let (grant_item_id, grant_id) = match payload.allocation_type {
        AllocationType::Grant => (payload.grant_item_id, None),
        AllocationType::OrgFunded => (None, payload.grant_id),
    };

    let id = sqlx::query(
        r#"
        INSERT INTO employee_funding_allocations
        (employee_id, employment_id, allocation_type, grant_item_id, grant_id, fte, status,
         start_date, end_date, created_by, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.employment_id)
    .bind(payload.allocation_type.as_ref())
    .bind(grant_item_id)
    .bind(grant_id)
    .bind(payload.fte)
    .bind(AllocationStatus::Active.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(&auth.username)
    .bind(&auth.username)
    .execute(&mut *tx)
    .await?
    .last_insert_id();

    tx.commit().await?;

    info!(allocation_id = id, employment_id = payload.employment_id, fte = payload.fte, "Funding allocation created");
    Ok(HttpResponse::Created().json(json!({ "message": "Funding allocation created", "id": id })))
}

#[utoipa::path(
    get,
    path = "/api/v1/funding-allocations",
    params(AllocationQuery),
    responses((status = 200, description = "Paginated allocation list", body = Object)),
    tag = "Funding Allocation",
    security(("bearer_auth" = []))
)]
pub async fn list_allocations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AllocationQuery>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.read")?;

    let mut filters = Filters::new();
    filters
        .eq("employment_id", query.employment_id)
        .eq("employee_id", query.employee_id)
        .eq("allocation_type", query.allocation_type.clone())
        .eq("status", query.status.clone());

    let page = fetch_page::<FundingAllocation>(
        pool.get_ref(),
        ALLOCATION_COLUMNS,
        "employee_funding_allocations",
        &filters,
        "start_date DESC, id DESC",
        &PageQuery::new(query.page, query.per_page),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/funding-allocations/{id}",
    params(("id", Path, description = "Allocation ID")),
    responses(
        (status = 200, description = "Allocation found", body = FundingAllocation),
        (status = 404, description = "Allocation not found")
    ),
    tag = "Funding Allocation",
    security(("bearer_auth" = []))
)]
pub async fn get_allocation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.read")?;
    let allocation = find_by_id::<FundingAllocation>(
        pool.get_ref(),
        ALLOCATION_COLUMNS,
        "employee_funding_allocations",
        path.into_inner(),
        false,
    )
    .await?
    .ok_or_else(|| AppError::not_found("Funding allocation"))?;
    Ok(HttpResponse::Ok().json(allocation))
}

async fn load_for_change(
    conn: &mut MySqlConnection,
    allocation_id: u64,
) -> AppResult<(FundingAllocation, Vec<AllocationSpan>)> {
    let current = sqlx::query_as::<_, FundingAllocation>(&format!(
        "SELECT {ALLOCATION_COLUMNS} FROM employee_funding_allocations WHERE id = ?"
    ))
    .bind(allocation_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Funding allocation"))?;
    let (_, existing) = lock_employee_allocations(conn, current.employment_id).await?;
    Ok((current, existing))
}

/// Changes FTE or dates, re-checking concurrent capacity.
#[utoipa::path(
    put,
    path = "/api/v1/funding-allocations/{id}",
    params(("id", Path, description = "Allocation ID")),
    request_body = UpdateAllocation,
    responses(
        (status = 200, description = "Allocation updated"),
        (status = 404, description = "Allocation not found"),
        (status = 409, description = "Closed allocations cannot change"),
        (status = 422, description = "Invalid values or capacity exceeded")
    ),
    tag = "Funding Allocation",
    security(("bearer_auth" = []))
)]
pub async fn update_allocation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAllocation>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.update")?;
    let allocation_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let (current, existing) = load_for_change(&mut tx, allocation_id).await?;

    let mut candidate = AllocationSpan::from_row(&current)?;
    if candidate.status == AllocationStatus::Closed {
        return Err(AppError::Conflict("Closed allocations cannot be changed".into()));
    }
    if let Some(fte) = payload.fte {
        validate_fte(fte)?;
        candidate.fte = fte;
    }
    if let Some(start) = payload.start_date {
        candidate.start_date = start;
    }
    if let Some(end) = payload.end_date {
        candidate.end_date = end;
    }
    validate_range(candidate.start_date, candidate.end_date)?;
    check_capacity(&existing, &candidate)?;

    sqlx::query(
        r#"
        UPDATE employee_funding_allocations
        SET fte = ?, start_date = ?, end_date = ?, updated_by = ?
        WHERE id = ?
        "#,
    )
    .bind(candidate.fte)
    .bind(candidate.start_date)
    .bind(candidate.end_date)
    .bind(&auth.username)
    .bind(allocation_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Funding allocation updated successfully" })))
}

#[utoipa::path(
    put,
    path = "/api/v1/funding-allocations/{id}/status",
    params(("id", Path, description = "Allocation ID")),
    request_body = UpdateAllocationStatus,
    responses(
        (status = 200, description = "Status changed"),
        (status = 409, description = "Transition not allowed"),
        (status = 422, description = "Reactivation would exceed capacity")
    ),
    tag = "Funding Allocation",
    security(("bearer_auth" = []))
)]
pub async fn update_allocation_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateAllocationStatus>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.update")?;
    let allocation_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let (current, existing) = load_for_change(&mut tx, allocation_id).await?;
    let mut candidate = AllocationSpan::from_row(&current)?;

    if !candidate.status.can_transition_to(payload.status) {
        return Err(AppError::Conflict(format!(
            "Cannot change allocation status from {} to {}",
            candidate.status, payload.status
        )));
    }
    candidate.status = payload.status;
    check_capacity(&existing, &candidate)?;

    sqlx::query("UPDATE employee_funding_allocations SET status = ?, updated_by = ? WHERE id = ?")
        .bind(payload.status.as_ref())
        .bind(&auth.username)
        .bind(allocation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(allocation_id, status = %payload.status, "Funding allocation status changed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Funding allocation status updated" })))
}

/// Payrolls already charged to the allocation keep their snapshot.
#[utoipa::path(
    delete,
    path = "/api/v1/funding-allocations/{id}",
    params(("id", Path, description = "Allocation ID")),
    responses((status = 200, description = "Successfully deleted"), (status = 404, description = "Allocation not found")),
    tag = "Funding Allocation",
    security(("bearer_auth" = []))
)]
pub async fn delete_allocation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require("funding_allocation.delete")?;
    hard_delete(
        pool.get_ref(),
        "employee_funding_allocations",
        path.into_inner(),
        "Funding allocation",
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn end_date_distinguishes_null_from_absent() {
        let absent: UpdateAllocation = serde_json::from_value(json!({ "fte": 0.5 })).unwrap();
        assert_eq!(absent.end_date, None);

        let cleared: UpdateAllocation = serde_json::from_value(json!({ "end_date": null })).unwrap();
        assert_eq!(cleared.end_date, Some(None));

        let set: UpdateAllocation =
            serde_json::from_value(json!({ "end_date": "2025-12-31" })).unwrap();
        assert_eq!(set.end_date, Some(NaiveDate::from_ymd_opt(2025, 12, 31)));
    }

    #[test]
    fn allocation_type_uses_snake_case() {
        let payload: CreateAllocation = serde_json::from_value(json!({
            "employment_id": 1,
            "allocation_type": "org_funded",
            "grant_id": 2,
            "fte": 0.4,
            "start_date": "2025-01-01"
        }))
        .unwrap();
        assert_eq!(payload.allocation_type, AllocationType::OrgFunded);
        assert_eq!(payload.end_date, None);
    }

    #[test]
    fn capacity_is_loaded_per_employee() {
        assert!(EMPLOYEE_ALLOCATIONS_SQL.contains("employee_id = ?"));
        assert!(!EMPLOYEE_ALLOCATIONS_SQL.contains("employment_id"));
    }

    #[test]
    fn open_allocation_of_an_inactive_employment_blocks_a_new_one() {
        use crate::services::funding::check_capacity;

        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        // Employment A was set inactive but its allocation stayed active.
        let from_old_employment = AllocationSpan {
            id: Some(1),
            fte: 1.0,
            status: AllocationStatus::Active,
            start_date: d(2024, 1, 1),
            end_date: None,
        };
        let on_new_employment = AllocationSpan {
            id: None,
            fte: 1.0,
            status: AllocationStatus::Active,
            start_date: d(2025, 1, 1),
            end_date: None,
        };
        assert!(check_capacity(&[], &on_new_employment).is_ok());
        assert!(matches!(
            check_capacity(&[from_old_employment], &on_new_employment),
            Err(AppError::Validation(_))
        ));
    }
}
