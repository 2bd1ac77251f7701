//! Auxiliary workflow records: travel, personnel actions, resignations,
//! probation events and holiday compensation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

pub const TRAVEL_REQUEST_COLUMNS: &str = "id, employee_id, department_id, position_id, destination, \
    start_date, end_date, purpose, grant_code, transportation, accommodation, supervisor_approved, \
    supervisor_approved_date, hr_acknowledged, hr_acknowledged_date, remarks, created_by, \
    updated_by, created_at";

pub const PERSONNEL_ACTION_COLUMNS: &str = "id, employment_id, action_type, effective_date, \
    new_department_id, new_position_id, new_site_id, new_salary, reason, dept_head_approval, \
    coo_approval, hr_approval, accountant_approval, implemented_at, created_by, updated_by, \
    created_at";

pub const RESIGNATION_COLUMNS: &str = "id, employee_id, department_id, position_id, \
    resignation_date, last_working_date, reason, reason_details, acknowledgement_status, \
    acknowledged_by, acknowledged_at, created_by, updated_by, created_at";

pub const PROBATION_COLUMNS: &str = "id, employment_id, employee_id, event_type, event_date, \
    decision_date, probation_start_date, probation_end_date, extension_number, decision_reason, \
    evaluation_notes, is_active, created_by, updated_by, created_at";

pub const HOLIDAY_COMPENSATION_COLUMNS: &str = "id, employee_id, holiday_date, worked_date, \
    compensation_days, reason, supervisor_approved, supervisor_approved_date, hr_approved, \
    hr_approved_date, created_by, updated_by, created_at";

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TravelRequest {
    pub id: u64,
    pub employee_id: u64,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub purpose: Option<String>,
    pub grant_code: Option<String>,
    pub transportation: Option<String>,
    pub accommodation: Option<String>,
    pub supervisor_approved: bool,
    pub supervisor_approved_date: Option<NaiveDate>,
    pub hr_acknowledged: bool,
    pub hr_acknowledged_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PersonnelActionType {
    Appointment,
    FiscalIncrement,
    TitleChange,
    VoluntarySeparation,
    PositionChange,
    Transfer,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PersonnelAction {
    pub id: u64,
    pub employment_id: u64,
    pub action_type: String,
    pub effective_date: NaiveDate,
    pub new_department_id: Option<u64>,
    pub new_position_id: Option<u64>,
    pub new_site_id: Option<u64>,
    pub new_salary: Option<f64>,
    pub reason: Option<String>,
    pub dept_head_approval: bool,
    pub coo_approval: bool,
    pub hr_approval: bool,
    pub accountant_approval: bool,
    pub implemented_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl PersonnelAction {
    pub fn fully_approved(&self) -> bool {
        self.dept_head_approval && self.coo_approval && self.hr_approval && self.accountant_approval
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AcknowledgementStatus {
    Pending,
    Acknowledged,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Resignation {
    pub id: u64,
    pub employee_id: u64,
    pub department_id: Option<u64>,
    pub position_id: Option<u64>,
    pub resignation_date: NaiveDate,
    pub last_working_date: NaiveDate,
    pub reason: String,
    pub reason_details: Option<String>,
    pub acknowledgement_status: String,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbationEvent {
    Initial,
    Extension,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ProbationRecord {
    pub id: u64,
    pub employment_id: u64,
    pub employee_id: u64,
    pub event_type: String,
    pub event_date: NaiveDate,
    pub decision_date: Option<NaiveDate>,
    pub probation_start_date: NaiveDate,
    pub probation_end_date: NaiveDate,
    pub extension_number: u32,
    pub decision_reason: Option<String>,
    pub evaluation_notes: Option<String>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct HolidayCompensationRecord {
    pub id: u64,
    pub employee_id: u64,
    pub holiday_date: NaiveDate,
    pub worked_date: NaiveDate,
    pub compensation_days: f64,
    pub reason: Option<String>,
    pub supervisor_approved: bool,
    pub supervisor_approved_date: Option<NaiveDate>,
    pub hr_approved: bool,
    pub hr_approved_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
