use crate::api::{
    employee::CreateEmployee,
    employment::CreateEmployment,
    funding_allocation::{CreateAllocation, UpdateAllocation, UpdateAllocationStatus},
    grant::{CreateGrant, CreateGrantItem},
    holiday_compensation::{ApproveCompensation, CompensationGate, CreateCompensation},
    leave::{AdjustLeaveBalance, CreateHoliday, CreateLeaveBalance, CreateLeaveType},
    leave_request::{ApproveLeave, CreateLeaveRequest, UpdateLeaveRequest},
    organization::{CreateDepartment, CreatePosition, CreateSectionDepartment, CreateSite},
    payroll::{CreatePayroll, PayrollDetail},
    payroll_batch::StartBatch,
    personnel_action::{ApprovePersonnelAction, CreatePersonnelAction, PersonnelGate},
    probation::{DecideProbation, ExtendProbation, StartProbation},
    resignation::CreateResignation,
    travel_request::{ApproveTravel, CreateTravelRequest, TravelGate},
    user::{RolePermissions, UpdateUser, UserSummary},
};
use crate::auth::handlers::{LoginResponse, MeResponse};
use crate::model::{
    employee::Employee,
    employment::Employment,
    funding_allocation::FundingAllocation,
    grant::{Grant, GrantItem},
    leave::{Holiday, LeaveBalance, LeaveGate, LeaveRequest, LeaveType},
    organization::{Department, Position, SectionDepartment, Site},
    payroll::{Payroll, PayrollBatch, PayrollGrantAllocation},
    workflow::{
        HolidayCompensationRecord, PersonnelAction, ProbationRecord, Resignation, TravelRequest,
    },
};
use crate::models::{LoginReqDto, UserReq};
use crate::services::{
    funding::FundingSummary,
    payroll_calc::{FundingSource, PayPeriod, PayrollComputation, PayrollLine},
    payroll_run::CreatedPayroll,
    recycle_bin::{PurgeReport, TrashedItem},
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR & Payroll API",
        version = "1.0.0",
        description = r#"
## HR & Payroll backend

Manages staff, their employments and how each employment is funded, and runs payroll against that funding.

### Key features
- **Organization**: sites, departments, sections and positions
- **Staff**: employee records and employments with salary terms
- **Funding**: grants, grant items (positions) and FTE allocations per employment
- **Payroll**: monthly payroll with encrypted salary fields, funding snapshots and batch runs
- **Recycle bin**: soft-deleted records kept for 90 days before purge
- **Leave**: leave types, balances, holidays and two-gate leave approval
- **Workflows**: travel, personnel actions, resignations, probation and holiday compensation

### Security
Endpoints outside `/auth` require a **JWT Bearer** access token.
Each operation checks a named permission such as `payroll.read`; employees only see their own records.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::organization::list_sites,
        crate::api::organization::get_site,
        crate::api::organization::create_site,
        crate::api::organization::update_site,
        crate::api::organization::delete_site,
        crate::api::organization::list_departments,
        crate::api::organization::get_department,
        crate::api::organization::create_department,
        crate::api::organization::update_department,
        crate::api::organization::delete_department,
        crate::api::organization::list_section_departments,
        crate::api::organization::get_section_department,
        crate::api::organization::create_section_department,
        crate::api::organization::update_section_department,
        crate::api::organization::delete_section_department,
        crate::api::organization::list_positions,
        crate::api::organization::get_position,
        crate::api::organization::create_position,
        crate::api::organization::update_position,
        crate::api::organization::delete_position,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::employment::create_employment,
        crate::api::employment::list_employments,
        crate::api::employment::get_employment,
        crate::api::employment::update_employment,
        crate::api::employment::delete_employment,
        crate::api::employment::list_employment_allocations,
        crate::api::employment::funding_summary,

        crate::api::grant::create_grant,
        crate::api::grant::list_grants,
        crate::api::grant::get_grant,
        crate::api::grant::update_grant,
        crate::api::grant::delete_grant,
        crate::api::grant::list_grant_items,
        crate::api::grant::create_grant_item,
        crate::api::grant::get_grant_item,
        crate::api::grant::update_grant_item,
        crate::api::grant::delete_grant_item,

        crate::api::funding_allocation::create_allocation,
        crate::api::funding_allocation::list_allocations,
        crate::api::funding_allocation::get_allocation,
        crate::api::funding_allocation::update_allocation,
        crate::api::funding_allocation::update_allocation_status,
        crate::api::funding_allocation::delete_allocation,

        crate::api::payroll::create_payroll,
        crate::api::payroll::preview,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::get_payroll,
        crate::api::payroll::delete_payroll,
        crate::api::payroll_batch::create_batch,
        crate::api::payroll_batch::get_batch,

        crate::api::recycle_bin::list_items,
        crate::api::recycle_bin::restore_item,
        crate::api::recycle_bin::purge_item,
        crate::api::recycle_bin::purge_expired_items,

        crate::api::leave::list_leave_types,
        crate::api::leave::get_leave_type,
        crate::api::leave::create_leave_type,
        crate::api::leave::update_leave_type,
        crate::api::leave::delete_leave_type,
        crate::api::leave::list_leave_balances,
        crate::api::leave::get_leave_balance,
        crate::api::leave::create_leave_balance,
        crate::api::leave::adjust_leave_balance,
        crate::api::leave::list_holidays,
        crate::api::leave::get_holiday,
        crate::api::leave::create_holiday,
        crate::api::leave::update_holiday,
        crate::api::leave::delete_holiday,

        crate::api::leave_request::create_leave_request,
        crate::api::leave_request::list_leave_requests,
        crate::api::leave_request::get_leave_request,
        crate::api::leave_request::update_leave_request,
        crate::api::leave_request::approve_leave_request,
        crate::api::leave_request::decline_leave_request,
        crate::api::leave_request::cancel_leave_request,
        crate::api::leave_request::delete_leave_request,

        crate::api::travel_request::create_travel_request,
        crate::api::travel_request::list_travel_requests,
        crate::api::travel_request::get_travel_request,
        crate::api::travel_request::update_travel_request,
        crate::api::travel_request::approve_travel_request,
        crate::api::travel_request::delete_travel_request,

        crate::api::holiday_compensation::create_compensation,
        crate::api::holiday_compensation::list_compensations,
        crate::api::holiday_compensation::get_compensation,
        crate::api::holiday_compensation::update_compensation,
        crate::api::holiday_compensation::approve_compensation,
        crate::api::holiday_compensation::delete_compensation,

        crate::api::personnel_action::create_personnel_action,
        crate::api::personnel_action::list_personnel_actions,
        crate::api::personnel_action::get_personnel_action,
        crate::api::personnel_action::update_personnel_action,
        crate::api::personnel_action::approve_personnel_action,
        crate::api::personnel_action::implement_personnel_action,
        crate::api::personnel_action::delete_personnel_action,

        crate::api::resignation::create_resignation,
        crate::api::resignation::list_resignations,
        crate::api::resignation::get_resignation,
        crate::api::resignation::update_resignation,
        crate::api::resignation::acknowledge_resignation,
        crate::api::resignation::reject_resignation,
        crate::api::resignation::delete_resignation,

        crate::api::probation::start_probation,
        crate::api::probation::extend_probation,
        crate::api::probation::pass_probation,
        crate::api::probation::fail_probation,
        crate::api::probation::list_probation_records,
        crate::api::probation::get_probation_record,
        crate::api::probation::update_probation_record,
        crate::api::probation::delete_probation_record,

        crate::api::user::list_users,
        crate::api::user::update_user,
        crate::api::user::get_role_permissions,
        crate::api::user::set_role_permissions
    ),
    components(
        schemas(
            UserReq,
            LoginReqDto,
            LoginResponse,
            MeResponse,
            Site,
            Department,
            SectionDepartment,
            Position,
            CreateSite,
            CreateDepartment,
            CreateSectionDepartment,
            CreatePosition,
            Employee,
            CreateEmployee,
            Employment,
            CreateEmployment,
            Grant,
            GrantItem,
            CreateGrant,
            CreateGrantItem,
            FundingAllocation,
            CreateAllocation,
            UpdateAllocation,
            UpdateAllocationStatus,
            FundingSummary,
            Payroll,
            PayrollDetail,
            PayrollGrantAllocation,
            PayrollBatch,
            CreatePayroll,
            CreatedPayroll,
            StartBatch,
            PayPeriod,
            FundingSource,
            PayrollLine,
            PayrollComputation,
            TrashedItem,
            PurgeReport,
            LeaveType,
            LeaveBalance,
            Holiday,
            LeaveRequest,
            LeaveGate,
            CreateLeaveType,
            CreateLeaveBalance,
            AdjustLeaveBalance,
            CreateHoliday,
            CreateLeaveRequest,
            UpdateLeaveRequest,
            ApproveLeave,
            TravelRequest,
            TravelGate,
            CreateTravelRequest,
            ApproveTravel,
            HolidayCompensationRecord,
            CompensationGate,
            CreateCompensation,
            ApproveCompensation,
            PersonnelAction,
            PersonnelGate,
            CreatePersonnelAction,
            ApprovePersonnelAction,
            Resignation,
            CreateResignation,
            ProbationRecord,
            StartProbation,
            ExtendProbation,
            DecideProbation,
            UserSummary,
            UpdateUser,
            RolePermissions
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, registration and token refresh"),
        (name = "Organization", description = "Sites, departments, sections and positions"),
        (name = "Employee", description = "Employee records"),
        (name = "Employment", description = "Employment terms and funding views"),
        (name = "Grant", description = "Grants and grant items"),
        (name = "Funding Allocation", description = "FTE funding allocations"),
        (name = "Payroll", description = "Payroll records and batch runs"),
        (name = "Recycle Bin", description = "Soft-deleted records"),
        (name = "Leave", description = "Leave types, balances, holidays and requests"),
        (name = "Travel Request", description = "Travel requests"),
        (name = "Holiday Compensation", description = "Work on public holidays"),
        (name = "Personnel Action", description = "Transfers, promotions and salary changes"),
        (name = "Resignation", description = "Resignations"),
        (name = "Probation", description = "Probation history"),
        (name = "User", description = "User accounts and role permissions"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_bearer_scheme_and_payroll_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/api/v1/payrolls/{id}"));
        assert!(doc.paths.paths.contains_key("/api/v1/recycle-bin/{entity}/{id}/restore"));
    }
}
