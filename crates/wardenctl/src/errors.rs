//! Exit status for wardenctl

use warden_common::{ActionRefusal, CatalogError, Disposition, SupervisorError};

/// Exit code for success (including no-op actions)
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code when a policy guard refused the request
pub const EXIT_POLICY_REJECTED: i32 = 3;

/// Exit code when launchd refused or failed the action
pub const EXIT_ACTION_FAILED: i32 = 4;

/// Exit code when the bundled catalog is corrupt (EX_DATAERR)
pub const EXIT_CATALOG_CORRUPT: i32 = 65;

/// Exit code when launchctl is unreachable or timed out (EX_UNAVAILABLE)
pub const EXIT_SUPERVISOR_UNAVAILABLE: i32 = 69;

/// Exit code when root is needed (EX_NOPERM)
pub const EXIT_PRIVILEGE_REQUIRED: i32 = 77;

pub fn for_supervisor_error(error: &SupervisorError) -> i32 {
    match error {
        SupervisorError::Unavailable(_) => EXIT_SUPERVISOR_UNAVAILABLE,
        SupervisorError::PrivilegeRequired { .. } => EXIT_PRIVILEGE_REQUIRED,
        SupervisorError::ActionRejected { .. } => EXIT_ACTION_FAILED,
    }
}

pub fn for_disposition(disposition: &Disposition) -> i32 {
    match disposition {
        Disposition::Succeeded { .. } => EXIT_SUCCESS,
        Disposition::Rejected { .. } => EXIT_POLICY_REJECTED,
        Disposition::Failed { error, .. } => for_supervisor_error(error),
    }
}

pub fn for_refusal(refusal: &ActionRefusal) -> i32 {
    match refusal {
        ActionRefusal::Policy(_) => EXIT_POLICY_REJECTED,
        ActionRefusal::Supervisor(error) => for_supervisor_error(error),
    }
}

/// Exit code for an error that escaped a command
pub fn for_error(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<CatalogError>().is_some() {
        return EXIT_CATALOG_CORRUPT;
    }
    if let Some(e) = error.downcast_ref::<SupervisorError>() {
        return for_supervisor_error(e);
    }
    EXIT_GENERAL_ERROR
}
