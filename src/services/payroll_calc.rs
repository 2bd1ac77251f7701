//! Pure payroll computation: splits an employment's salary across its
//! funding allocations for one monthly pay period.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use utoipa::ToSchema;

use super::funding::{AllocationSpan, FTE_TOLERANCE};
use crate::model::funding_allocation::AllocationType;
use crate::model::payroll::SalaryBasis;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PayrollError {
    #[error("employment has no funding allocation active during {0}")]
    NoActiveAllocations(NaiveDate),
    #[error("funding allocation {0} has no grant to charge")]
    MissingFundingSource(u64),
    #[error("{0} must not be negative")]
    NegativeAmount(&'static str),
    #[error("pay period {0} is out of range")]
    InvalidPeriod(NaiveDate),
}

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PayPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PayPeriod {
    /// The month containing `date`.
    pub fn containing(date: NaiveDate) -> Result<Self, PayrollError> {
        let start = date
            .with_day(1)
            .ok_or(PayrollError::InvalidPeriod(date))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.checked_sub_days(Days::new(1)))
            .ok_or(PayrollError::InvalidPeriod(date))?;
        Ok(Self { start, end })
    }
}

/// Salary terms of an employment relevant to payroll.
#[derive(Debug, Clone)]
pub struct SalaryTerms {
    pub pass_probation_salary: f64,
    pub probation_salary: Option<f64>,
    pub probation_pass_date: Option<NaiveDate>,
    pub pvd: bool,
}

impl SalaryTerms {
    /// Probation salary applies to periods that end before the pass date.
    pub fn base_for(&self, period: &PayPeriod) -> (SalaryBasis, f64) {
        match (self.probation_pass_date, self.probation_salary) {
            (Some(pass_date), Some(probation)) if period.end < pass_date => {
                (SalaryBasis::Probation, probation)
            }
            _ => (SalaryBasis::PassProbation, self.pass_probation_salary),
        }
    }
}

/// Funding source values copied into the payroll snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FundingSource {
    pub allocation_type: AllocationType,
    pub grant_item_id: Option<u64>,
    pub grant_id: Option<u64>,
    pub grant_code: String,
    pub grant_name: String,
    pub budgetline_code: Option<String>,
    pub grant_position: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AllocationInput {
    pub span: AllocationSpan,
    /// `None` when the grant or grant item behind the allocation is gone.
    pub source: Option<FundingSource>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Adjustments {
    pub bonus: f64,
    pub deductions: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayrollLine {
    pub allocation_id: u64,
    pub fte: f64,
    pub gross_salary_by_fte: f64,
    pub bonus: f64,
    pub deductions: f64,
    pub pvd_employee: f64,
    pub net_salary: f64,
    pub source: FundingSource,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayrollComputation {
    pub period: PayPeriod,
    pub salary_basis: SalaryBasis,
    pub base_salary: f64,
    pub total_fte: f64,
    pub total_gross: f64,
    pub total_net: f64,
    pub lines: Vec<PayrollLine>,
    pub warnings: Vec<String>,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn compute_payroll(
    terms: &SalaryTerms,
    allocations: &[AllocationInput],
    period: PayPeriod,
    adjustments: Adjustments,
    pvd_rate: f64,
) -> Result<PayrollComputation, PayrollError> {
    if adjustments.bonus < 0.0 {
        return Err(PayrollError::NegativeAmount("bonus"));
    }
    if adjustments.deductions < 0.0 {
        return Err(PayrollError::NegativeAmount("deductions"));
    }

    let (salary_basis, base_salary) = terms.base_for(&period);

    let active: Vec<&AllocationInput> = allocations
        .iter()
        .filter(|a| a.span.is_active_during(period.start, period.end))
        .collect();
    if active.is_empty() {
        return Err(PayrollError::NoActiveAllocations(period.start));
    }

    let mut lines = Vec::with_capacity(active.len());
    for allocation in active {
        let allocation_id = allocation.span.id.unwrap_or_default();
        let source = allocation
            .source
            .clone()
            .ok_or(PayrollError::MissingFundingSource(allocation_id))?;
        let fte = allocation.span.fte;

        let gross = round2(base_salary * fte);
        let bonus = round2(adjustments.bonus * fte);
        let deductions = round2(adjustments.deductions * fte);
        let pvd_employee = if terms.pvd { round2(gross * pvd_rate) } else { 0.0 };
        let net = round2(gross + bonus - deductions - pvd_employee);

        lines.push(PayrollLine {
            allocation_id,
            fte,
            gross_salary_by_fte: gross,
            bonus,
            deductions,
            pvd_employee,
            net_salary: net,
            source,
        });
    }

    let total_fte = lines.iter().map(|l| l.fte).sum::<f64>();
    let mut warnings = Vec::new();
    if (total_fte - 1.0).abs() > FTE_TOLERANCE {
        warnings.push(format!(
            "Active allocations total {total_fte:.4} FTE instead of 1.0000"
        ));
    }

    Ok(PayrollComputation {
        period,
        salary_basis,
        base_salary,
        total_fte,
        total_gross: round2(lines.iter().map(|l| l.gross_salary_by_fte).sum()),
        total_net: round2(lines.iter().map(|l| l.net_salary).sum()),
        lines,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::funding_allocation::AllocationStatus;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn terms() -> SalaryTerms {
        SalaryTerms {
            pass_probation_salary: 30_000.0,
            probation_salary: Some(27_000.0),
            probation_pass_date: Some(d(2025, 4, 1)),
            pvd: false,
        }
    }

    fn source(code: &str, budgetline: Option<&str>) -> FundingSource {
        FundingSource {
            allocation_type: if budgetline.is_some() {
                AllocationType::Grant
            } else {
                AllocationType::OrgFunded
            },
            grant_item_id: budgetline.map(|_| 11),
            grant_id: Some(3),
            grant_code: code.to_string(),
            grant_name: format!("{code} grant"),
            budgetline_code: budgetline.map(str::to_string),
            grant_position: Some("Medic".to_string()),
        }
    }

    fn allocation(id: u64, fte: f64, start: NaiveDate, end: Option<NaiveDate>) -> AllocationInput {
        AllocationInput {
            span: AllocationSpan {
                id: Some(id),
                fte,
                status: AllocationStatus::Active,
                start_date: start,
                end_date: end,
            },
            source: Some(source("S0031", Some("BL-1"))),
        }
    }

    #[test]
    fn pay_period_spans_the_whole_month() {
        let p = PayPeriod::containing(d(2024, 2, 17)).unwrap();
        assert_eq!(p.start, d(2024, 2, 1));
        assert_eq!(p.end, d(2024, 2, 29));

        let p = PayPeriod::containing(d(2025, 12, 31)).unwrap();
        assert_eq!(p.end, d(2025, 12, 31));
    }

    #[test]
    fn probation_salary_before_pass_date() {
        let march = PayPeriod::containing(d(2025, 3, 1)).unwrap();
        assert_eq!(terms().base_for(&march), (SalaryBasis::Probation, 27_000.0));
    }

    #[test]
    fn pass_probation_salary_from_month_of_pass_date() {
        let april = PayPeriod::containing(d(2025, 4, 10)).unwrap();
        assert_eq!(terms().base_for(&april), (SalaryBasis::PassProbation, 30_000.0));

        // Pass date inside the month: the period does not end before it.
        let mut t = terms();
        t.probation_pass_date = Some(d(2025, 4, 15));
        assert_eq!(t.base_for(&april).0, SalaryBasis::PassProbation);
    }

    #[test]
    fn missing_probation_salary_falls_back_to_regular() {
        let mut t = terms();
        t.probation_salary = None;
        let march = PayPeriod::containing(d(2025, 3, 1)).unwrap();
        assert_eq!(t.base_for(&march), (SalaryBasis::PassProbation, 30_000.0));
    }

    #[test]
    fn splits_salary_by_fte() {
        let allocations = vec![
            allocation(1, 0.6, d(2025, 1, 1), None),
            AllocationInput {
                source: Some(source("HUB", None)),
                ..allocation(2, 0.4, d(2025, 1, 1), None)
            },
        ];
        let result = compute_payroll(
            &terms(),
            &allocations,
            PayPeriod::containing(d(2025, 5, 1)).unwrap(),
            Adjustments { bonus: 1_000.0, deductions: 500.0 },
            0.075,
        )
        .unwrap();

        assert_eq!(result.salary_basis, SalaryBasis::PassProbation);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.lines[0].gross_salary_by_fte, 18_000.0);
        assert_eq!(result.lines[0].bonus, 600.0);
        assert_eq!(result.lines[0].deductions, 300.0);
        assert_eq!(result.lines[0].net_salary, 18_300.0);
        assert_eq!(result.lines[1].gross_salary_by_fte, 12_000.0);
        assert_eq!(result.lines[1].source.budgetline_code, None);
        assert_eq!(result.total_gross, 30_000.0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn pvd_is_deducted_when_enrolled() {
        let mut t = terms();
        t.pvd = true;
        let result = compute_payroll(
            &t,
            &[allocation(1, 1.0, d(2025, 1, 1), None)],
            PayPeriod::containing(d(2025, 6, 1)).unwrap(),
            Adjustments::default(),
            0.075,
        )
        .unwrap();
        assert_eq!(result.lines[0].pvd_employee, 2_250.0);
        assert_eq!(result.lines[0].net_salary, 27_750.0);
    }

    #[test]
    fn only_allocations_active_in_period_are_paid() {
        let allocations = vec![
            allocation(1, 1.0, d(2024, 1, 1), Some(d(2025, 2, 28))),
            allocation(2, 1.0, d(2025, 3, 1), None),
        ];
        let result = compute_payroll(
            &terms(),
            &allocations,
            PayPeriod::containing(d(2025, 5, 1)).unwrap(),
            Adjustments::default(),
            0.075,
        )
        .unwrap();
        assert_eq!(result.lines.len(), 1);
        assert_eq!(result.lines[0].allocation_id, 2);
    }

    #[test]
    fn partial_fte_total_is_a_warning() {
        let result = compute_payroll(
            &terms(),
            &[allocation(1, 0.5, d(2025, 1, 1), None)],
            PayPeriod::containing(d(2025, 5, 1)).unwrap(),
            Adjustments::default(),
            0.075,
        )
        .unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.total_gross, 15_000.0);
    }

    #[test]
    fn no_active_allocations_is_an_error() {
        let err = compute_payroll(
            &terms(),
            &[allocation(1, 1.0, d(2026, 1, 1), None)],
            PayPeriod::containing(d(2025, 5, 1)).unwrap(),
            Adjustments::default(),
            0.075,
        )
        .unwrap_err();
        assert_eq!(err, PayrollError::NoActiveAllocations(d(2025, 5, 1)));
    }

    #[test]
    fn allocation_without_source_is_an_error() {
        let orphan = AllocationInput {
            source: None,
            ..allocation(9, 1.0, d(2025, 1, 1), None)
        };
        let err = compute_payroll(
            &terms(),
            &[orphan],
            PayPeriod::containing(d(2025, 5, 1)).unwrap(),
            Adjustments::default(),
            0.075,
        )
        .unwrap_err();
        assert_eq!(err, PayrollError::MissingFundingSource(9));
    }

    #[test]
    fn negative_adjustments_are_rejected() {
        let err = compute_payroll(
            &terms(),
            &[allocation(1, 1.0, d(2025, 1, 1), None)],
            PayPeriod::containing(d(2025, 5, 1)).unwrap(),
            Adjustments { bonus: -1.0, deductions: 0.0 },
            0.075,
        )
        .unwrap_err();
        assert_eq!(err, PayrollError::NegativeAmount("bonus"));
    }
}
