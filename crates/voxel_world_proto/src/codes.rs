//! Closed set of error codes surfaced on ACTION_RESULT / TASK_FAIL events.

pub const E_INVALID_TARGET: &str = "E_INVALID_TARGET";
pub const E_NO_PERMISSION: &str = "E_NO_PERMISSION";
pub const E_RATE_LIMIT: &str = "E_RATE_LIMIT";
pub const E_NO_RESOURCE: &str = "E_NO_RESOURCE";
pub const E_OUT_OF_RANGE: &str = "E_OUT_OF_RANGE";
pub const E_BAD_REQUEST: &str = "E_BAD_REQUEST";
pub const E_NOT_FOUND: &str = "E_NOT_FOUND";
pub const E_CONFLICT: &str = "E_CONFLICT";
