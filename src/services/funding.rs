//! Level-of-effort rules for employee funding allocations.
//!
//! The FTE of all *concurrently active* allocations of an employment may not
//! exceed 1.00. Allocations are concurrent when their date ranges overlap; an
//! open `end_date` runs indefinitely.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::funding_allocation::{AllocationStatus, FundingAllocation};

/// Slack for floating point sums such as 0.1 + 0.2 + 0.7.
pub const FTE_TOLERANCE: f64 = 0.0001;

/// The date-range and effort portion of an allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationSpan {
    pub id: Option<u64>,
    pub fte: f64,
    pub status: AllocationStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl AllocationSpan {
    pub fn from_row(row: &FundingAllocation) -> Result<Self, AppError> {
        let status = row.status.parse::<AllocationStatus>().map_err(|_| {
            AppError::Internal(format!(
                "allocation {} has unknown status `{}`",
                row.id, row.status
            ))
        })?;
        Ok(Self {
            id: Some(row.id),
            fte: row.fte,
            status,
            start_date: row.start_date,
            end_date: row.end_date,
        })
    }

    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.status == AllocationStatus::Active
            && self.start_date <= date
            && self.end_date.is_none_or(|end| end >= date)
    }

    /// Active at any point between `from` and `to` inclusive.
    pub fn is_active_during(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.status == AllocationStatus::Active
            && overlaps(self.start_date, self.end_date, from, Some(to))
    }
}

pub fn validate_fte(fte: f64) -> Result<(), AppError> {
    if !fte.is_finite() || fte <= 0.0 || fte > 1.0 + FTE_TOLERANCE {
        return Err(AppError::field("fte", "FTE must be greater than 0 and at most 1"));
    }
    Ok(())
}

pub fn validate_range(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), AppError> {
    if end.is_some_and(|end| end < start) {
        return Err(AppError::field(
            "end_date",
            "end_date must not be before start_date",
        ));
    }
    Ok(())
}

/// Inclusive overlap of two date ranges; `None` ends are unbounded.
pub fn overlaps(
    a_start: NaiveDate,
    a_end: Option<NaiveDate>,
    b_start: NaiveDate,
    b_end: Option<NaiveDate>,
) -> bool {
    let a_before_b_ends = b_end.is_none_or(|end| a_start <= end);
    let b_before_a_ends = a_end.is_none_or(|end| b_start <= end);
    a_before_b_ends && b_before_a_ends
}

/// Highest total FTE reached at any date within the candidate's range when
/// the candidate is added to `existing`.
///
/// The concurrent sum only increases at a start date, so checking the
/// candidate's start and every overlapping start inside its range is enough.
pub fn peak_fte(existing: &[AllocationSpan], candidate: &AllocationSpan) -> f64 {
    let others: Vec<&AllocationSpan> = existing
        .iter()
        .filter(|a| a.id.is_none() || a.id != candidate.id)
        .filter(|a| a.status == AllocationStatus::Active)
        .filter(|a| overlaps(a.start_date, a.end_date, candidate.start_date, candidate.end_date))
        .collect();

    let mut checkpoints: Vec<NaiveDate> = others
        .iter()
        .map(|a| a.start_date.max(candidate.start_date))
        .collect();
    checkpoints.push(candidate.start_date);

    checkpoints
        .into_iter()
        .map(|day| {
            candidate.fte
                + others
                    .iter()
                    .filter(|a| a.is_active_on(day))
                    .map(|a| a.fte)
                    .sum::<f64>()
        })
        .fold(0.0, f64::max)
}

/// Rejects a candidate that would push concurrent FTE above 1.00.
pub fn check_capacity(existing: &[AllocationSpan], candidate: &AllocationSpan) -> Result<(), AppError> {
    if candidate.status != AllocationStatus::Active {
        return Ok(());
    }
    let peak = peak_fte(existing, candidate);
    if peak > 1.0 + FTE_TOLERANCE {
        let available = (1.0 - (peak - candidate.fte)).max(0.0);
        return Err(AppError::field(
            "fte",
            format!(
                "Concurrent active allocations would total {:.4} FTE; at most {:.4} is available",
                peak, available
            ),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct FundingSummary {
    pub as_of: NaiveDate,
    pub active_allocations: usize,
    pub total_fte: f64,
    pub remaining_fte: f64,
    /// True when active allocations add up to exactly 1.00.
    pub fully_allocated: bool,
}

pub fn summarize(allocations: &[AllocationSpan], as_of: NaiveDate) -> FundingSummary {
    let active: Vec<&AllocationSpan> = allocations.iter().filter(|a| a.is_active_on(as_of)).collect();
    let total: f64 = active.iter().map(|a| a.fte).sum();
    let total = (total * 10_000.0).round() / 10_000.0;
    FundingSummary {
        as_of,
        active_allocations: active.len(),
        total_fte: total,
        remaining_fte: (1.0 - total).max(0.0),
        fully_allocated: (total - 1.0).abs() <= FTE_TOLERANCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn span(id: u64, fte: f64, start: NaiveDate, end: Option<NaiveDate>) -> AllocationSpan {
        AllocationSpan {
            id: Some(id),
            fte,
            status: AllocationStatus::Active,
            start_date: start,
            end_date: end,
        }
    }

    fn candidate(fte: f64, start: NaiveDate, end: Option<NaiveDate>) -> AllocationSpan {
        AllocationSpan {
            id: None,
            fte,
            status: AllocationStatus::Active,
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn fte_bounds() {
        assert!(validate_fte(0.25).is_ok());
        assert!(validate_fte(1.0).is_ok());
        assert!(validate_fte(0.0).is_err());
        assert!(validate_fte(-0.5).is_err());
        assert!(validate_fte(1.2).is_err());
        assert!(validate_fte(f64::NAN).is_err());
    }

    #[test]
    fn open_ranges_overlap_everything_after_start() {
        assert!(overlaps(d(2024, 1, 1), None, d(2030, 1, 1), Some(d(2030, 2, 1))));
        assert!(!overlaps(
            d(2024, 1, 1),
            Some(d(2024, 6, 30)),
            d(2024, 7, 1),
            None
        ));
        assert!(overlaps(
            d(2024, 1, 1),
            Some(d(2024, 7, 1)),
            d(2024, 7, 1),
            None
        ));
    }

    #[test]
    fn allows_filling_up_to_one() {
        let existing = vec![
            span(1, 0.6, d(2024, 1, 1), None),
            span(2, 0.3, d(2024, 1, 1), None),
        ];
        assert!(check_capacity(&existing, &candidate(0.1, d(2024, 3, 1), None)).is_ok());
        assert!(check_capacity(&existing, &candidate(0.2, d(2024, 3, 1), None)).is_err());
    }

    #[test]
    fn sequential_allocations_do_not_stack() {
        // Two back-to-back 1.0 allocations never run at the same time.
        let existing = vec![
            span(1, 1.0, d(2024, 1, 1), Some(d(2024, 6, 30))),
            span(2, 1.0, d(2024, 8, 1), None),
        ];
        assert!(
            check_capacity(&existing, &candidate(0.5, d(2024, 7, 1), Some(d(2024, 7, 31)))).is_ok()
        );
        // But a range covering both periods collides.
        assert!(check_capacity(&existing, &candidate(0.5, d(2024, 6, 1), None)).is_err());
    }

    #[test]
    fn non_overlapping_siblings_are_not_summed() {
        // 0.5 in H1 and 0.5 in H2 never coexist, so a full-year 0.5 fits.
        let existing = vec![
            span(1, 0.5, d(2024, 1, 1), Some(d(2024, 6, 30))),
            span(2, 0.5, d(2024, 7, 1), Some(d(2024, 12, 31))),
        ];
        let full_year = candidate(0.5, d(2024, 1, 1), Some(d(2024, 12, 31)));
        assert!((peak_fte(&existing, &full_year) - 1.0).abs() < FTE_TOLERANCE);
        assert!(check_capacity(&existing, &full_year).is_ok());
    }

    #[test]
    fn updating_an_allocation_ignores_its_old_row() {
        let existing = vec![
            span(1, 0.5, d(2024, 1, 1), None),
            span(2, 0.5, d(2024, 1, 1), None),
        ];
        let mut edited = span(2, 0.5, d(2024, 1, 1), None);
        assert!(check_capacity(&existing, &edited).is_ok());
        edited.fte = 0.6;
        assert!(check_capacity(&existing, &edited).is_err());
    }

    #[test]
    fn inactive_and_closed_rows_do_not_count() {
        let mut closed = span(1, 1.0, d(2024, 1, 1), None);
        closed.status = AllocationStatus::Closed;
        let mut inactive = span(2, 1.0, d(2024, 1, 1), None);
        inactive.status = AllocationStatus::Inactive;
        assert!(check_capacity(&[closed, inactive], &candidate(1.0, d(2024, 2, 1), None)).is_ok());
    }

    #[test]
    fn inactive_candidates_skip_the_check() {
        let existing = vec![span(1, 1.0, d(2024, 1, 1), None)];
        let mut c = candidate(0.5, d(2024, 1, 1), None);
        c.status = AllocationStatus::Inactive;
        assert!(check_capacity(&existing, &c).is_ok());
    }

    #[test]
    fn summary_reports_full_allocation() {
        let allocations = vec![
            span(1, 0.7, d(2024, 1, 1), None),
            span(2, 0.2, d(2024, 1, 1), None),
            span(3, 0.1, d(2024, 1, 1), None),
            span(4, 0.4, d(2023, 1, 1), Some(d(2023, 12, 31))),
        ];
        let summary = summarize(&allocations, d(2024, 5, 1));
        assert_eq!(summary.active_allocations, 3);
        assert!(summary.fully_allocated);
        assert_eq!(summary.remaining_fte, 0.0);

        let partial = summarize(&allocations[..1], d(2024, 5, 1));
        assert!(!partial.fully_allocated);
        assert!((partial.remaining_fte - 0.3).abs() < FTE_TOLERANCE);
    }
}
