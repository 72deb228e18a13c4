//! Shop profile loading.

use cadforge_core::{CONFIGS_DIR_NAME, DEFAULT_PROFILE_NAME, PROFILES_DIR_NAME};
use serde_json::Value;
use std::path::Path;

/// Load a shop profile JSON by name.
///
/// `None`, the empty string, and the `_default` placeholder all mean "no
/// profile". Load failures silently yield no profile so a missing or broken
/// profile never blocks an analysis run.
pub async fn load_shop_profile(root: &Path, name: Option<&str>) -> Option<Value> {
    let name = name?;
    if name.is_empty() || name == DEFAULT_PROFILE_NAME {
        return None;
    }

    let path = root
        .join(CONFIGS_DIR_NAME)
        .join(PROFILES_DIR_NAME)
        .join(format!("{name}.json"));
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(profile = name, "shop profile unavailable: {e}");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(profile) => Some(profile),
        Err(e) => {
            tracing::debug!(profile = name, "shop profile unparseable: {e}");
            None
        }
    }
}
