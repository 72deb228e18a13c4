//! Constants used throughout the cadforge codebase

use std::time::Duration;

// Directory layout under the automation root
pub const CACHE_DIR_NAME: &str = ".cache";
pub const OUTPUT_DIR_NAME: &str = "output";
pub const CONFIGS_DIR_NAME: &str = "configs";
pub const PROFILES_DIR_NAME: &str = "profiles";
pub const EXAMPLES_DIR_NAME: &str = "examples";
pub const SCRIPTS_DIR_NAME: &str = "scripts";

// Environment variable names
pub const CADFORGE_LOG_VAR: &str = "CADFORGE_LOG";
pub const CADFORGE_ROOT_VAR: &str = "CADFORGE_ROOT";

// Cache budget: total bytes of stored stage results before eviction kicks in
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 500 * 1024 * 1024;

// Per-stage executor timeouts
pub const CREATE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DRAWING_TIMEOUT: Duration = Duration::from_secs(120);
pub const DFM_TIMEOUT: Duration = Duration::from_secs(60);
pub const TOLERANCE_TIMEOUT: Duration = Duration::from_secs(60);
pub const COST_TIMEOUT: Duration = Duration::from_secs(60);
pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const ENRICH_TIMEOUT: Duration = Duration::from_secs(60);

// Defaulting applied when building stage executor inputs
pub const DEFAULT_DRAWING_STANDARD: &str = "KS";
pub const DEFAULT_PROCESS: &str = "machining";
pub const DEFAULT_MATERIAL: &str = "SS304";
pub const DEFAULT_BATCH_SIZE: u64 = 1;
pub const DEFAULT_STROKE_PROFILE: &str = "ks";

// The profile name that means "no shop profile"
pub const DEFAULT_PROFILE_NAME: &str = "_default";

// Server defaults
pub const DEFAULT_PORT: u16 = 18080;
