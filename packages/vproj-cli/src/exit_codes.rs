//! Process exit codes shared by filterds and projds.

pub const SUCCESS: i32 = 0;
/// Bad or missing command-line arguments
pub const USAGE_ERROR: i32 = 1;
/// Inputs are readable but inconsistent with each other
pub const VALIDATION_ERROR: i32 = 1;
pub const EXECUTION_ERROR: i32 = 2;
