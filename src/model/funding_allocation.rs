use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

pub const ALLOCATION_COLUMNS: &str = "id, employee_id, employment_id, allocation_type, \
    grant_item_id, grant_id, fte, status, start_date, end_date, created_by, updated_by, \
    created_at, updated_at";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AllocationType {
    /// Funded by a grant item (budgeted position line).
    Grant,
    /// Funded by a hub / general-fund grant.
    OrgFunded,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AllocationStatus {
    Active,
    Inactive,
    Closed,
}

impl AllocationStatus {
    /// Closed allocations are history and never reopen.
    pub fn can_transition_to(self, next: AllocationStatus) -> bool {
        use AllocationStatus::*;
        matches!(
            (self, next),
            (Active, Inactive) | (Inactive, Active) | (Active, Closed) | (Inactive, Closed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct FundingAllocation {
    pub id: u64,
    pub employee_id: u64,
    pub employment_id: u64,
    #[schema(example = "grant")]
    pub allocation_type: String,
    pub grant_item_id: Option<u64>,
    pub grant_id: Option<u64>,
    #[schema(example = 0.6)]
    pub fte: f64,
    #[schema(example = "active")]
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_is_terminal() {
        use AllocationStatus::*;
        assert!(Active.can_transition_to(Closed));
        assert!(Inactive.can_transition_to(Active));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Closed.can_transition_to(Inactive));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn parses_db_strings() {
        assert_eq!(
            "org_funded".parse::<AllocationType>().unwrap(),
            AllocationType::OrgFunded
        );
        assert_eq!(AllocationStatus::Closed.as_ref(), "closed");
        assert!("archived".parse::<AllocationStatus>().is_err());
    }
}
