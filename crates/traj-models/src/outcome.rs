//! Per-key conversion outcomes.

use serde::{Deserialize, Serialize};

/// What happened to a single metadata key during a pipeline run.
///
/// Outcomes are never persisted directly; the ledger folds each one into a
/// bucket transition stamped with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyOutcome {
    /// All artifacts were produced and uploaded
    Exported {
        /// Destination keys of the uploaded artifacts
        artifacts: Vec<String>,
    },
    /// Source trajectory is flagged unsuccessful and was skipped
    NonUsable,
    /// Conversion or upload failed
    Errored {
        message: String,
    },
}

impl KeyOutcome {
    /// Create an errored outcome, prefixing the message the way the ledger stores it.
    pub fn errored(message: impl std::fmt::Display) -> Self {
        Self::Errored {
            message: format!("Error: {}", message),
        }
    }

    /// Get string representation of the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOutcome::Exported { .. } => "exported",
            KeyOutcome::NonUsable => "non_usable",
            KeyOutcome::Errored { .. } => "errored",
        }
    }

    /// Check whether the key counts as handled for progress reporting.
    pub fn is_handled(&self) -> bool {
        !matches!(self, KeyOutcome::Errored { .. })
    }

    /// Error message, if the outcome is an error.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            KeyOutcome::Errored { message } => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errored_prefix() {
        let outcome = KeyOutcome::errored("NoSuchKey");
        assert_eq!(outcome.error_message(), Some("Error: NoSuchKey"));
        assert!(!outcome.is_handled());
    }

    #[test]
    fn test_non_usable_counts_as_handled() {
        assert!(KeyOutcome::NonUsable.is_handled());
        assert_eq!(KeyOutcome::NonUsable.to_string(), "non_usable");
    }
}
