use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::utils::cipher::{CipherError, SalaryCipher};

pub const PAYROLL_COLUMNS: &str = "id, employment_id, employee_id, employee_funding_allocation_id, \
    pay_period_date, salary_basis, base_salary, gross_salary_by_fte, bonus, deductions, \
    pvd_employee, net_salary, notes, created_by, updated_by, created_at, updated_at";

pub const SNAPSHOT_COLUMNS: &str = "id, payroll_id, employee_funding_allocation_id, grant_item_id, \
    grant_id, allocation_type, grant_code, grant_name, budgetline_code, grant_position, fte, \
    allocated_amount, captured_at";

pub const BATCH_COLUMNS: &str = "id, pay_period_date, status, total_employments, \
    processed_employments, successful_payrolls, failed_employments, errors, created_by, \
    created_at, updated_at";

/// Which of the two salary tiers a payroll was computed from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SalaryBasis {
    Probation,
    PassProbation,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A payroll row as stored: salary columns are ciphertext.
#[derive(Debug, sqlx::FromRow)]
pub struct EncryptedPayroll {
    pub id: u64,
    pub employment_id: u64,
    pub employee_id: u64,
    pub employee_funding_allocation_id: Option<u64>,
    pub pay_period_date: NaiveDate,
    pub salary_basis: String,
    pub base_salary: String,
    pub gross_salary_by_fte: String,
    pub bonus: String,
    pub deductions: String,
    pub pvd_employee: String,
    pub net_salary: String,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A payroll row with its salary columns decrypted.
#[derive(Debug, Serialize, ToSchema)]
pub struct Payroll {
    pub id: u64,
    pub employment_id: u64,
    pub employee_id: u64,
    pub employee_funding_allocation_id: Option<u64>,
    #[schema(value_type = String, format = "date", example = "2025-03-01")]
    pub pay_period_date: NaiveDate,
    #[schema(example = "pass_probation")]
    pub salary_basis: String,
    pub base_salary: f64,
    pub gross_salary_by_fte: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub pvd_employee: f64,
    pub net_salary: f64,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EncryptedPayroll {
    pub fn decrypt(self, cipher: &SalaryCipher) -> Result<Payroll, CipherError> {
        Ok(Payroll {
            base_salary: cipher.decrypt_amount(&self.base_salary)?,
            gross_salary_by_fte: cipher.decrypt_amount(&self.gross_salary_by_fte)?,
            bonus: cipher.decrypt_amount(&self.bonus)?,
            deductions: cipher.decrypt_amount(&self.deductions)?,
            pvd_employee: cipher.decrypt_amount(&self.pvd_employee)?,
            net_salary: cipher.decrypt_amount(&self.net_salary)?,
            id: self.id,
            employment_id: self.employment_id,
            employee_id: self.employee_id,
            employee_funding_allocation_id: self.employee_funding_allocation_id,
            pay_period_date: self.pay_period_date,
            salary_basis: self.salary_basis,
            notes: self.notes,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Denormalized copy of the funding source taken when the payroll was created.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollGrantAllocation {
    pub id: u64,
    pub payroll_id: u64,
    pub employee_funding_allocation_id: Option<u64>,
    pub grant_item_id: Option<u64>,
    pub grant_id: Option<u64>,
    pub allocation_type: String,
    pub grant_code: String,
    pub grant_name: String,
    pub budgetline_code: Option<String>,
    pub grant_position: Option<String>,
    pub fte: f64,
    pub allocated_amount: f64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct PayrollBatch {
    pub id: u64,
    pub pay_period_date: NaiveDate,
    pub status: String,
    pub total_employments: u32,
    pub processed_employments: u32,
    pub successful_payrolls: u32,
    pub failed_employments: u32,
    #[schema(value_type = Option<Vec<String>>)]
    pub errors: Option<Json<Vec<String>>>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};

    fn stored(cipher: &SalaryCipher, amount: f64) -> String {
        cipher.encrypt_amount(amount).unwrap()
    }

    #[test]
    fn decrypts_every_salary_column() {
        let cipher = SalaryCipher::from_secret(&STANDARD_NO_PAD.encode([7u8; 32])).unwrap();
        let row = EncryptedPayroll {
            id: 1,
            employment_id: 2,
            employee_id: 3,
            employee_funding_allocation_id: Some(4),
            pay_period_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            salary_basis: "pass_probation".into(),
            base_salary: stored(&cipher, 30000.0),
            gross_salary_by_fte: stored(&cipher, 18000.0),
            bonus: stored(&cipher, 0.0),
            deductions: stored(&cipher, 250.5),
            pvd_employee: stored(&cipher, 1350.0),
            net_salary: stored(&cipher, 16399.5),
            notes: None,
            created_by: None,
            updated_by: None,
            created_at: None,
            updated_at: None,
        };

        let payroll = row.decrypt(&cipher).unwrap();
        assert_eq!(payroll.base_salary, 30000.0);
        assert_eq!(payroll.deductions, 250.5);
        assert_eq!(payroll.net_salary, 16399.5);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let writer = SalaryCipher::from_secret(&STANDARD_NO_PAD.encode([1u8; 32])).unwrap();
        let reader = SalaryCipher::from_secret(&STANDARD_NO_PAD.encode([2u8; 32])).unwrap();
        assert!(reader.decrypt_amount(&writer.encrypt_amount(10.0).unwrap()).is_err());
    }
}
