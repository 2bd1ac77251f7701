use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const GRANT_COLUMNS: &str = "id, code, name, organization, description, end_date, is_hub, \
    created_by, updated_by, created_at, updated_at";

pub const GRANT_ITEM_COLUMNS: &str = "id, grant_id, grant_position, grant_salary, grant_benefit, \
    grant_level_of_effort, grant_position_number, budgetline_code, created_by, updated_by, \
    created_at, updated_at";

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Grant {
    pub id: u64,
    #[schema(example = "S0031")]
    pub code: String,
    pub name: String,
    pub organization: Option<String>,
    pub description: Option<String>,
    pub end_date: Option<NaiveDate>,
    /// Hub / general-fund grant used for org-funded allocations.
    pub is_hub: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A budgeted position line within a grant.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct GrantItem {
    pub id: u64,
    pub grant_id: u64,
    pub grant_position: Option<String>,
    pub grant_salary: Option<f64>,
    pub grant_benefit: Option<f64>,
    pub grant_level_of_effort: Option<f64>,
    pub grant_position_number: Option<u32>,
    /// NULL for hub/general-fund lines.
    pub budgetline_code: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
