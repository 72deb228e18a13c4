//! Narrow config-file loader: TOML file → JSON value.
//!
//! The configuration language itself is an external concern; the pipeline
//! only ever sees the loaded JSON-shaped value.

use cadforge_core::{Error, Result};
use serde_json::Value;
use std::path::Path;

/// Load an analysis config file into a JSON value.
pub async fn load_config(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::file_system(path, "read config", e))?;

    let table: toml::Value = toml::from_str(&text).map_err(|e| {
        Error::configuration(format!("failed to parse '{}': {e}", path.display()))
    })?;

    Ok(serde_json::to_value(table)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn loads_toml_into_json_shape() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("part.toml");
        std::fs::write(
            &path,
            r#"
name = "bracket"

[[shapes]]
type = "box"
size = [10, 20, 5]

[drawing]
views = ["front", "top"]
"#,
        )
        .unwrap();

        let config = load_config(&path).await.unwrap();
        assert_eq!(config["name"], "bracket");
        assert_eq!(config["shapes"][0]["type"], "box");
        assert_eq!(config["drawing"]["views"], json!(["front", "top"]));
    }

    #[tokio::test]
    async fn missing_and_malformed_files_are_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(load_config(&dir.path().join("absent.toml")).await.is_err());

        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "shapes = [").unwrap();
        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
