//! Bulk payroll for every active employment in a period, run as a spawned
//! task that reports progress through its `payroll_batches` row.

use chrono::NaiveDate;
use sqlx::MySqlPool;
use sqlx::types::Json;
use tracing::{error, info, warn};

use super::payroll_calc::{Adjustments, PayPeriod};
use super::payroll_run::{PayrollRequest, create_payroll_for_employment};
use crate::error::AppResult;
use crate::model::payroll::BatchStatus;
use crate::utils::cipher::SalaryCipher;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchProgress {
    pub processed: u32,
    pub successful_payrolls: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    aborted: bool,
}

impl BatchProgress {
    pub fn record_success(&mut self, payrolls: usize) {
        self.processed += 1;
        self.successful_payrolls += payrolls as u32;
    }

    pub fn record_failure(&mut self, employment_id: u64, reason: impl std::fmt::Display) {
        self.processed += 1;
        self.failed += 1;
        self.errors.push(format!("employment {employment_id}: {reason}"));
    }

    /// The batch could not run at all. Errors recorded so far are kept.
    pub fn abort(&mut self, reason: impl std::fmt::Display) {
        self.aborted = true;
        self.errors.push(format!("batch: {reason}"));
    }

    /// Per-employment failures still complete the batch.
    pub fn final_status(&self) -> BatchStatus {
        if self.aborted {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        }
    }
}

/// Inserts the batch row and spawns the worker. Returns the batch id.
pub async fn start_batch(
    pool: MySqlPool,
    cipher: SalaryCipher,
    pvd_rate: f64,
    pay_period_date: NaiveDate,
    actor: String,
) -> AppResult<u64> {
    let period = PayPeriod::containing(pay_period_date)?;

    let batch_id = sqlx::query(
        "INSERT INTO payroll_batches (pay_period_date, status, created_by) VALUES (?, ?, ?)",
    )
    .bind(period.start)
    .bind(BatchStatus::Pending.as_ref())
    .bind(&actor)
    .execute(&pool)
    .await?
    .last_insert_id();

    actix_web::rt::spawn(async move {
        let progress = run_batch(&pool, &cipher, pvd_rate, batch_id, period, &actor).await;
        if let Err(e) = write_progress(&pool, batch_id, &progress, Some(progress.final_status())).await {
            error!(batch_id, error = %e, "Unable to record payroll batch result");
        }
    });

    Ok(batch_id)
}

async fn load_work_list(pool: &MySqlPool, period: PayPeriod) -> Result<Vec<u64>, sqlx::Error> {
    sqlx::query_scalar::<_, u64>(
        r#"
        SELECT e.id
        FROM employments e
        JOIN employees emp ON emp.id = e.employee_id AND emp.deleted_at IS NULL
        WHERE e.status = 'active'
          AND e.start_date <= ?
          AND (e.end_date IS NULL OR e.end_date >= ?)
        ORDER BY e.id
        "#,
    )
    .bind(period.end)
    .bind(period.start)
    .fetch_all(pool)
    .await
}

/// Writes counters and errors, and the status when one is given.
async fn write_progress(
    pool: &MySqlPool,
    batch_id: u64,
    progress: &BatchProgress,
    status: Option<BatchStatus>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payroll_batches
        SET processed_employments = ?, successful_payrolls = ?,
            failed_employments = ?, errors = ?, status = COALESCE(?, status)
        WHERE id = ?
        "#,
    )
    .bind(progress.processed)
    .bind(progress.successful_payrolls)
    .bind(progress.failed)
    .bind(Json(&progress.errors))
    .bind(status.map(|s| s.to_string()))
    .bind(batch_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Runs every employment of the work list. Only a work list that cannot be
/// loaded fails the batch; a lost progress write is logged and the run
/// goes on, since the final write carries the full progress again.
async fn run_batch(
    pool: &MySqlPool,
    cipher: &SalaryCipher,
    pvd_rate: f64,
    batch_id: u64,
    period: PayPeriod,
    actor: &str,
) -> BatchProgress {
    let mut progress = BatchProgress::default();

    let employment_ids = match load_work_list(pool, period).await {
        Ok(ids) => ids,
        Err(e) => {
            error!(batch_id, error = %e, "Payroll batch could not load its employments");
            progress.abort(e);
            return progress;
        }
    };

    let started = sqlx::query("UPDATE payroll_batches SET status = ?, total_employments = ? WHERE id = ?")
        .bind(BatchStatus::Processing.as_ref())
        .bind(employment_ids.len() as u32)
        .bind(batch_id)
        .execute(pool)
        .await;
    if let Err(e) = started {
        warn!(batch_id, error = %e, "Unable to mark payroll batch processing");
    }

    info!(batch_id, total = employment_ids.len(), "Payroll batch started");

    for employment_id in employment_ids {
        let request = PayrollRequest {
            employment_id,
            pay_period_date: period.start,
            adjustments: Adjustments::default(),
            notes: None,
        };
        match create_payroll_for_employment(pool, cipher, &request, pvd_rate, actor).await {
            Ok(created) => progress.record_success(created.payroll_ids.len()),
            Err(e) => {
                warn!(batch_id, employment_id, error = %e, "Employment skipped in payroll batch");
                progress.record_failure(employment_id, e);
            }
        }

        if let Err(e) = write_progress(pool, batch_id, &progress, None).await {
            warn!(batch_id, error = %e, "Unable to record payroll batch progress");
        }
    }

    info!(
        batch_id,
        processed = progress.processed,
        failed = progress.failed,
        "Payroll batch completed"
    );
    progress
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_counts_payrolls_and_failures() {
        let mut progress = BatchProgress::default();
        progress.record_success(2);
        progress.record_failure(7, "no funding allocation active");
        progress.record_success(1);

        assert_eq!(progress.processed, 3);
        assert_eq!(progress.successful_payrolls, 3);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.errors, vec!["employment 7: no funding allocation active"]);
        assert_eq!(progress.final_status(), BatchStatus::Completed);
    }

    #[test]
    fn abort_keeps_recorded_failures() {
        let mut progress = BatchProgress::default();
        progress.record_failure(3, "employment not found");
        progress.abort("connection reset");

        assert_eq!(progress.final_status(), BatchStatus::Failed);
        assert_eq!(
            progress.errors,
            vec!["employment 3: employment not found", "batch: connection reset"]
        );
        assert_eq!(progress.failed, 1);
    }
}
