use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Column list shared by employee queries; never includes `deleted_at`.
pub const EMPLOYEE_COLUMNS: &str = "id, staff_id, site_id, first_name, last_name, gender, \
    date_of_birth, nationality, status, email, phone, bank_name, bank_branch, \
    bank_account_name, bank_account_number, emergency_contact_name, \
    emergency_contact_relationship, emergency_contact_phone, created_by, updated_by, \
    created_at, updated_at";

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "staff_id": "0001",
        "site_id": 1,
        "first_name": "John",
        "last_name": "Doe",
        "gender": "male",
        "date_of_birth": "1990-01-15",
        "nationality": "Thai",
        "status": "active",
        "email": "john.doe@company.com",
        "phone": "+66812345678",
        "bank_name": "Bangkok Bank",
        "bank_branch": "Mae Sot",
        "bank_account_name": "John Doe",
        "bank_account_number": "123-4-56789-0",
        "emergency_contact_name": "Jane Doe",
        "emergency_contact_relationship": "spouse",
        "emergency_contact_phone": "+66887654321"
    })
)]
pub struct Employee {
    pub id: u64,
    pub staff_id: String,
    pub site_id: Option<u64>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub status: String,
    pub email: Option<String>,
    pub phone: Option<String>,

    pub bank_name: Option<String>,
    pub bank_branch: Option<String>,
    pub bank_account_name: Option<String>,
    pub bank_account_number: Option<String>,

    pub emergency_contact_name: Option<String>,
    pub emergency_contact_relationship: Option<String>,
    pub emergency_contact_phone: Option<String>,

    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
