//! Stable numeric error codes, grouped by category.
//!
//! - 1000-1999: configuration
//! - 2000-2999: state / storage
//! - 3000-3999: git / github
//! - 4000-4999: execution (Agent subprocess)
//! - 5000-5999: CI
//! - 6000-6999: workflow / orchestration
//! - 7000-7999: validation
//! - 9000-9999: other
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_TOML: u16 = 1002;
    pub const CONFIG_INVALID_VALUE: u16 = 1003;

    pub const STATE_GENERIC: u16 = 2000;
    pub const STATE_NOT_FOUND: u16 = 2001;
    pub const STATE_ALREADY_EXISTS: u16 = 2002;
    pub const STATE_CORRUPTED: u16 = 2003;
    pub const STATE_INVALID_NAME: u16 = 2004;
    pub const STATE_IO_ERROR: u16 = 2005;

    pub const GIT_GENERIC: u16 = 3000;
    pub const GIT_COMMAND_FAILED: u16 = 3001;
    pub const GH_COMMAND_FAILED: u16 = 3002;
    pub const GH_NOT_FOUND: u16 = 3003;
    pub const WORKTREE_CREATE_FAILED: u16 = 3004;

    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_NONZERO_EXIT: u16 = 4003;
    pub const EXEC_NO_RESULT_JSON: u16 = 4004;
    pub const EXEC_SCHEMA_INVALID: u16 = 4005;

    pub const CI_GENERIC: u16 = 5000;
    pub const CI_TIMEOUT: u16 = 5001;
    pub const CI_POLL_FAILED: u16 = 5002;

    pub const WORKFLOW_GENERIC: u16 = 6000;
    pub const WORKFLOW_ATTEMPTS_EXHAUSTED: u16 = 6001;
    pub const WORKFLOW_CONFIRMATION_DENIED: u16 = 6002;
    pub const WORKFLOW_CANCELLED: u16 = 6003;
    pub const WORKFLOW_INVALID_TRANSITION: u16 = 6004;

    pub const VALIDATION_GENERIC: u16 = 7000;

    pub const OTHER_GENERIC: u16 = 9000;
}
