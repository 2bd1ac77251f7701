pub mod employee;
pub mod employment;
pub mod funding_allocation;
pub mod grant;
pub mod leave;
pub mod organization;
pub mod payroll;
pub mod permission;
pub mod role;
pub mod workflow;
