use chrono::NaiveDate;

use crate::error::AppError;

/// Inclusive day count of a leave request, excluding holidays in the range.
pub fn count_leave_days(
    start: NaiveDate,
    end: NaiveDate,
    holidays: &[NaiveDate],
) -> Result<f64, AppError> {
    if start > end {
        return Err(AppError::field(
            "end_date",
            "end_date must not be before start_date",
        ));
    }

    let span = (end - start).num_days() + 1;
    let mut excluded: Vec<&NaiveDate> = holidays
        .iter()
        .filter(|h| **h >= start && **h <= end)
        .collect();
    excluded.sort();
    excluded.dedup();

    Ok((span - excluded.len() as i64) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    #[test]
    fn single_day_counts_as_one() {
        assert_eq!(count_leave_days(d(3, 4), d(3, 4), &[]).unwrap(), 1.0);
    }

    #[test]
    fn range_is_inclusive() {
        assert_eq!(count_leave_days(d(1, 30), d(2, 2), &[]).unwrap(), 4.0);
    }

    #[test]
    fn holidays_inside_range_are_excluded() {
        let holidays = [d(4, 13), d(4, 14), d(4, 14), d(5, 1)];
        assert_eq!(count_leave_days(d(4, 10), d(4, 16), &holidays).unwrap(), 5.0);
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert!(count_leave_days(d(4, 16), d(4, 10), &[]).is_err());
    }
}
