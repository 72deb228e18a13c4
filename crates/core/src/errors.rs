use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for cadforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cadforge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Analysis script execution errors
    #[error("{}", format_script_error(.script, .message, .exit_code))]
    ScriptExecution {
        script: String,
        message: String,
        exit_code: Option<i32>,
    },

    /// Operation timeout errors
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Shop profile loading errors
    #[error("shop profile '{name}' error: {message}")]
    Profile { name: String, message: String },
}

fn format_script_error(script: &str, message: &str, exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("script '{script}' exited {code}: {message}"),
        None => format!("script '{script}' failed: {message}"),
    }
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a script execution error without an exit code
    #[must_use]
    pub fn script(script: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ScriptExecution {
            script: script.into(),
            message: message.into(),
            exit_code: None,
        }
    }

    /// Create a script execution error carrying the process exit code
    #[must_use]
    pub fn script_exited(
        script: impl Into<String>,
        message: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        Error::ScriptExecution {
            script: script.into(),
            message: message.into(),
            exit_code: Some(exit_code),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a file system error with path and operation context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a shop profile error
    #[must_use]
    pub fn profile(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Profile {
            name: name.into(),
            message: message.into(),
        }
    }
}
