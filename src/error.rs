//! Error taxonomy for dagbench.
//!
//! Generation and configuration errors are fatal for a run. Storage errors
//! are recoverable per scenario/backend. Inconsistencies flag a backend that
//! answered differently from the reference traversal.

use serde::Serialize;

/// Unified error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum DagBenchError {
    /// Invalid topology or scale; raised before any backend interaction.
    #[error("generation error: {0}")]
    Generation(String),

    /// A backend failed to insert or answer a query.
    #[error("storage error [{backend}]: {message}")]
    Storage { backend: String, message: String },

    /// A backend result disagrees with the reference oracle.
    #[error("inconsistency [{backend}] in {scenario} for {target}: {detail}")]
    Inconsistency {
        backend: String,
        scenario: String,
        target: String,
        detail: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification used by the reporter and the CLI exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorClass {
    Generation,
    Storage,
    Inconsistency,
    Config,
    Other,
}

impl DagBenchError {
    /// Build a storage error for `backend`.
    pub fn storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Generation(_) => ErrorClass::Generation,
            Self::Storage { .. } => ErrorClass::Storage,
            Self::Inconsistency { .. } => ErrorClass::Inconsistency,
            Self::Config(_) | Self::Yaml(_) => ErrorClass::Config,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorClass::Other,
        }
    }

    /// Whether the run may continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Storage | ErrorClass::Inconsistency
        )
    }
}

impl From<rusqlite::Error> for DagBenchError {
    fn from(e: rusqlite::Error) -> Self {
        Self::storage("sqlite", e.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, DagBenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rusqlite_errors_classify_as_storage() {
        let err: DagBenchError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.class(), ErrorClass::Storage);
        assert!(err.is_recoverable());
        assert!(err.to_string().starts_with("storage error [sqlite]"));
    }

    #[test]
    fn generation_errors_are_fatal() {
        let err = DagBenchError::Generation("scale must be at least 1".into());
        assert_eq!(err.class(), ErrorClass::Generation);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn inconsistency_message_names_context() {
        let err = DagBenchError::Inconsistency {
            backend: "native".into(),
            scenario: "ancestors-of-last".into(),
            target: "node=5".into(),
            detail: "missing [3]".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("native"));
        assert!(msg.contains("ancestors-of-last"));
        assert!(msg.contains("node=5"));
        assert_eq!(err.class(), ErrorClass::Inconsistency);
    }

    #[test]
    fn yaml_errors_classify_as_config() {
        let yaml_err = serde_yaml::from_str::<u32>("{{nope").unwrap_err();
        let err: DagBenchError = yaml_err.into();
        assert_eq!(err.class(), ErrorClass::Config);
    }
}
