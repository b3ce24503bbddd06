//! Runtime settings for the CLI that are not coordinator tunables.
//!
//! Each value has a compile-time default and can be overridden through a
//! dedicated environment variable. Command-line flags win over both.

use std::path::PathBuf;

/// Default wall-clock budget for an unbounded `analyze` search (in seconds).
const DEFAULT_ANALYSIS_SECS: u64 = 5;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix of the daily rolling log file.
pub const LOG_FILE_PREFIX: &str = "chesslens";

/// Get the directory for log files, if file logging is wanted.
///
/// Priority:
/// 1. The `--log-dir` flag
/// 2. `CHESSLENS_LOG_DIR` env variable if set
/// 3. `None`: log to stderr
pub fn get_log_dir(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| std::env::var_os("CHESSLENS_LOG_DIR").map(PathBuf::from))
}

/// Get the wall-clock budget for an unbounded search, in seconds.
///
/// Priority:
/// 1. The `--seconds` flag
/// 2. `CHESSLENS_ANALYSIS_SECS` env variable if set (falls back to default
///    if the value cannot be parsed as a `u64`)
/// 3. `5` seconds as fallback
pub fn get_analysis_secs(flag: Option<u64>) -> u64 {
    if let Some(secs) = flag {
        return secs;
    }
    if let Ok(secs) = std::env::var("CHESSLENS_ANALYSIS_SECS") {
        return secs.parse().unwrap_or(DEFAULT_ANALYSIS_SECS);
    }

    DEFAULT_ANALYSIS_SECS
}
