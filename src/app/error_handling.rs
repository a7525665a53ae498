//! Fatal-error reporting and exit-code mapping: `0` success, `1` invalid
//! usage, `2` non-recoverable workflow failure, `3` cancellation.
//!
//! Matches each error directly on [`WorkflowError`]'s variants rather than
//! downcasting a type-erased error at the reporting boundary.

use crate::error::{codes::ErrorCode, WorkflowError};
use tracing::error;

pub fn handle_fatal_error(err: WorkflowError, verbose: u8) -> ! {
    error!("fatal error: {err}");

    eprintln!("Error: {err}");
    if verbose >= 1 {
        eprintln!("\nContext chain:\n{}", err.developer_message());
    }

    std::process::exit(exit_code_for(&err))
}

fn exit_code_for(err: &WorkflowError) -> i32 {
    match err {
        WorkflowError::Validation { .. } | WorkflowError::Config { .. } => 1,
        WorkflowError::Workflow { code, .. } if *code == ErrorCode::WORKFLOW_CANCELLED => 3,
        _ => 2,
    }
}
