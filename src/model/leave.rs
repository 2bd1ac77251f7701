use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

pub const LEAVE_REQUEST_COLUMNS: &str = "id, employee_id, leave_type_id, start_date, end_date, \
    total_days, reason, status, supervisor_approved, supervisor_approved_date, \
    hr_site_admin_approved, hr_site_admin_approved_date, attachment_notes, created_by, \
    updated_by, created_at, updated_at";

pub const LEAVE_TYPE_COLUMNS: &str =
    "id, name, default_duration, description, requires_attachment, created_by, updated_by";

pub const LEAVE_BALANCE_COLUMNS: &str = "id, employee_id, leave_type_id, year, total_days, \
    used_days, remaining_days, created_by, updated_by";

pub const HOLIDAY_COLUMNS: &str = "id, holiday_date, name, created_by, updated_by";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Declined,
    Cancelled,
}

impl LeaveStatus {
    /// Approved only once both gates have signed off.
    pub fn from_gates(supervisor_approved: bool, hr_site_admin_approved: bool) -> Self {
        if supervisor_approved && hr_site_admin_approved {
            LeaveStatus::Approved
        } else {
            LeaveStatus::Pending
        }
    }

    pub fn is_final(self) -> bool {
        !matches!(self, LeaveStatus::Pending)
    }
}

/// The two approval gates of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaveGate {
    Supervisor,
    HrSiteAdmin,
}

impl LeaveGate {
    pub fn columns(self) -> (&'static str, &'static str) {
        match self {
            LeaveGate::Supervisor => ("supervisor_approved", "supervisor_approved_date"),
            LeaveGate::HrSiteAdmin => ("hr_site_admin_approved", "hr_site_admin_approved_date"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveType {
    pub id: u64,
    pub name: String,
    pub default_duration: f64,
    pub description: Option<String>,
    pub requires_attachment: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_days: f64,
    pub reason: Option<String>,
    #[schema(example = "pending")]
    pub status: String,
    pub supervisor_approved: bool,
    pub supervisor_approved_date: Option<NaiveDate>,
    pub hr_site_admin_approved: bool,
    pub hr_site_admin_approved_date: Option<NaiveDate>,
    pub attachment_notes: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveBalance {
    pub id: u64,
    pub employee_id: u64,
    pub leave_type_id: u64,
    pub year: u32,
    pub total_days: f64,
    pub used_days: f64,
    pub remaining_days: f64,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Holiday {
    pub id: u64,
    pub holiday_date: NaiveDate,
    pub name: String,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_gates_are_needed_for_approval() {
        assert_eq!(LeaveStatus::from_gates(true, false), LeaveStatus::Pending);
        assert_eq!(LeaveStatus::from_gates(false, true), LeaveStatus::Pending);
        assert_eq!(LeaveStatus::from_gates(true, true), LeaveStatus::Approved);
    }

    #[test]
    fn only_pending_is_open() {
        assert!(!LeaveStatus::Pending.is_final());
        assert!(LeaveStatus::Declined.is_final());
        assert!(LeaveStatus::Cancelled.is_final());
    }
}
