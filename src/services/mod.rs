pub mod approval;
pub mod funding;
pub mod leave_days;
pub mod payroll_batch;
pub mod payroll_calc;
pub mod payroll_run;
pub mod recycle_bin;
