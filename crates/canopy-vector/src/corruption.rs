//! Corruption signature detection.
//!
//! Some backend failures mean the collection is in a state that only a reset
//! fixes: a server returning 500s for every call, a client tripping over a
//! missing field, an array that no longer decodes. Those are recognized by
//! matching the error message against a list of signatures.

use canopy_core::Error;
use serde::{Deserialize, Serialize};

/// Signatures matched when none are configured.
pub const DEFAULT_SIGNATURES: &[&str] = &[
    "object has no attribute",
    "Cannot read properties of undefined",
    "Internal Server Error",
    "status code 500",
    "500 Internal",
    "malformed array",
    "expected a list of numbers",
    "Invalid array",
];

/// Corruption detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionConfig {
    /// Case-insensitive substrings that mark an error as corruption.
    #[serde(default = "default_signatures")]
    pub signatures: Vec<String>,
}

fn default_signatures() -> Vec<String> {
    DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect()
}

impl Default for CorruptionConfig {
    fn default() -> Self {
        Self {
            signatures: default_signatures(),
        }
    }
}

/// Classifies errors as corruption or not.
#[derive(Debug, Clone)]
pub struct CorruptionDetector {
    signatures: Vec<String>,
}

impl Default for CorruptionDetector {
    fn default() -> Self {
        Self::from_config(&CorruptionConfig::default())
    }
}

impl CorruptionDetector {
    /// Create a detector with an explicit signature list.
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            signatures: signatures
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Create a detector from configuration.
    pub fn from_config(config: &CorruptionConfig) -> Self {
        Self::new(&config.signatures)
    }

    /// The active signatures, lowercased.
    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    /// True when `message` contains a known signature.
    ///
    /// Missing and empty messages never match.
    pub fn is_corruption_signature(&self, message: Option<&str>) -> bool {
        let Some(message) = message.filter(|m| !m.trim().is_empty()) else {
            return false;
        };
        let message = message.to_lowercase();
        self.signatures.iter().any(|s| message.contains(s.as_str()))
    }

    /// True when `error` should trigger recovery.
    ///
    /// `Corruption` errors always match. Validation failures and provider
    /// initialization failures never do: the first is the caller's data, the
    /// second is handled by the fallback chain.
    pub fn is_corruption(&self, error: &Error) -> bool {
        match error {
            Error::Corruption(_) => true,
            Error::Validation(_) | Error::ProviderInit { .. } | Error::Closed(_) => false,
            other => self.is_corruption_signature(Some(&other.to_string())),
        }
    }
}
