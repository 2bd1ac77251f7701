use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

pub const EMPLOYMENT_COLUMNS: &str = "id, employee_id, employment_type, start_date, end_date, \
    probation_pass_date, department_id, position_id, section_department_id, site_id, \
    pass_probation_salary, probation_salary, health_welfare, pvd, saving_fund, status, \
    created_by, updated_by, created_at, updated_at";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmploymentStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Employment {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "full_time")]
    pub employment_type: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// First day the pass-probation salary applies.
    pub probation_pass_date: Option<NaiveDate>,
    pub department_id: u64,
    pub position_id: u64,
    pub section_department_id: Option<u64>,
    pub site_id: Option<u64>,
    pub pass_probation_salary: f64,
    pub probation_salary: Option<f64>,
    pub health_welfare: bool,
    pub pvd: bool,
    pub saving_fund: bool,
    #[schema(example = "active")]
    pub status: String,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
