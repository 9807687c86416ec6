//! Application-wide constants

/// Separator between labels of a materialized group path.
pub const PATH_SEPARATOR: char = '.';

pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_HYDRATION_CONCURRENCY: usize = 8;

/// Member bounds for folding a single IC child into its manager when simplifying.
pub const SIMPLIFY_MIN_MEMBERS: usize = 1;
pub const SIMPLIFY_MAX_MEMBERS: usize = 25;

pub const DEFAULT_CRM_PAGE_SIZE: u32 = 200;
pub const PERMISSION_CACHE_KEY_PREFIX: &str = "perm";
