pub const SUCCESS: i32 = 0;
pub const EXECUTION_ERROR: i32 = 1;
pub const INPUT_ERROR: i32 = 2;
/// Batch finished with at least one success and one failure
pub const PARTIAL_FAILURE: i32 = 3;
