use chrono::{NaiveDate, Utc};
use sqlx::MySqlPool;

use crate::error::{AppError, AppResult};

/// A boolean approval column, optionally paired with the date it was given.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalGate {
    pub table: &'static str,
    pub entity: &'static str,
    pub flag: &'static str,
    pub date_column: Option<&'static str>,
    /// Rows failing this condition are locked against approval changes.
    pub open_condition: Option<&'static str>,
}

pub fn approval_sql(gate: &ApprovalGate) -> String {
    let mut assignments = vec![format!("{} = ?", gate.flag)];
    if let Some(date_column) = gate.date_column {
        assignments.push(format!("{date_column} = ?"));
    }
    assignments.push("updated_by = ?".to_string());
    format!(
        "UPDATE {} SET {} WHERE id = ?",
        gate.table,
        assignments.join(", ")
    )
}

/// Sets or clears one approval. The date is today when approving and cleared
/// when revoking.
pub async fn set_approval(
    pool: &MySqlPool,
    gate: &ApprovalGate,
    id: u64,
    approved: bool,
    actor: &str,
) -> AppResult<()> {
    if let Some(condition) = gate.open_condition {
        let open = sqlx::query_scalar::<_, Option<bool>>(&format!(
            "SELECT ({condition}) FROM {} WHERE id = ?",
            gate.table
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound { entity: gate.entity })?;
        if open != Some(true) {
            return Err(AppError::Conflict(format!(
                "{} {} can no longer be approved",
                gate.entity, id
            )));
        }
    }

    let date: Option<NaiveDate> = approved.then(|| Utc::now().date_naive());
    let sql = approval_sql(gate);
    let mut query = sqlx::query(&sql).bind(approved);
    if gate.date_column.is_some() {
        query = query.bind(date);
    }
    let result = query.bind(actor).bind(id).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound { entity: gate.entity });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dated_gate_sets_flag_and_date() {
        let gate = ApprovalGate {
            table: "travel_requests",
            entity: "Travel request",
            flag: "supervisor_approved",
            date_column: Some("supervisor_approved_date"),
            open_condition: None,
        };
        assert_eq!(
            approval_sql(&gate),
            "UPDATE travel_requests SET supervisor_approved = ?, supervisor_approved_date = ?, \
             updated_by = ? WHERE id = ?"
        );
    }

    #[test]
    fn undated_gate_sets_flag_only() {
        let gate = ApprovalGate {
            table: "personnel_actions",
            entity: "Personnel action",
            flag: "coo_approval",
            date_column: None,
            open_condition: Some("implemented_at IS NULL"),
        };
        assert_eq!(
            approval_sql(&gate),
            "UPDATE personnel_actions SET coo_approval = ?, updated_by = ? WHERE id = ?"
        );
    }
}
