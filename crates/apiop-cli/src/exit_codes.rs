//! Exit codes for CLI operations
//!
//! These follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
#[allow(dead_code)]
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - registry flags or credentials rejected
pub const VALIDATION_ERROR: i32 = 2;

/// Version error - operator version or manifest bundle unavailable
pub const VERSION_ERROR: i32 = 4;

/// IO error - configuration file unreadable or not writable
pub const IO_ERROR: i32 = 5;

/// Cluster error - apply or secret write failed, installation incomplete
pub const CLUSTER_ERROR: i32 = 6;
