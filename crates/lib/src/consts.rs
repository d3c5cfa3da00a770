//! Crate-wide constants.

pub const APP_NAME: &str = "rulegraph";

/// Bumped whenever the rule key derivation changes so stale cache entries miss.
pub const RULE_KEY_VERSION: u32 = 1;

/// Format version written into directory cache records.
pub const CACHE_RECORD_VERSION: u32 = 1;

/// Default output directory, relative to the project root.
pub const DEFAULT_OUTPUT_DIR: &str = "rulegraph-out/gen";

/// Output directory name used for targets in the root cell.
pub const ROOT_CELL_DIR: &str = "__root__";

pub const ENV_OUTPUT_ROOT: &str = "RULEGRAPH_OUT";
pub const ENV_CACHE_DIR: &str = "RULEGRAPH_CACHE_DIR";
pub const ENV_PARALLELISM: &str = "RULEGRAPH_PARALLELISM";
pub const ENV_SHELL: &str = "RULEGRAPH_SHELL";

/// Flavor appended to an `android_prebuilt_aar` target for its unpack rule.
pub const AAR_UNZIP_FLAVOR: &str = "aar_unzip";

/// Flavor appended to an `android_prebuilt_aar` target for its embedded jar rule.
pub const AAR_PREBUILT_JAR_FLAVOR: &str = "aar_prebuilt_jar";
