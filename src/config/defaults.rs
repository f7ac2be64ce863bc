//! Default configuration values

/// Recipe file name at the project root
pub const RECIPE_FILE: &str = "kiln.toml";

/// Lock file name at the project root
pub const LOCK_FILE: &str = "kiln.lock";

/// Build output root under the project
pub const BUILD_DIR: &str = "build";

/// Generated files directory inside a build layout
pub const GENERATORS_DIR: &str = "generators";

/// Maximum number of attempts for a transient repository failure
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Initial backoff delay between fetch attempts (in milliseconds)
pub const FETCH_BACKOFF_BASE_MS: u64 = 500;

/// Upper bound for a single backoff delay (in milliseconds)
pub const FETCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Bytes of stdout/stderr retained per stream for error reports
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;

/// Default configure stage timeout (in seconds), `None` means unbounded
pub const CONFIGURE_TIMEOUT_SECS: Option<u64> = None;

/// Default build stage timeout (in seconds), `None` means unbounded
pub const BUILD_TIMEOUT_SECS: Option<u64> = None;

/// Minimum proptest iterations
pub const MIN_PROPTEST_ITERATIONS: u32 = 100;
