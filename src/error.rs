//! Error types for certificate generation
//!
//! Every error aborts the run. Variants carry the id of the record being
//! processed so the caller can tell which artifact failed; already written
//! store entries are left in place and a re-run resumes from the failing
//! record.

use thiserror::Error;

use crate::pki::PkiError;

/// Default context value when no specific record is involved
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for certificate generation
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent configuration input
    ///
    /// Covers mismatched override pairs, missing or non-numeric sizing
    /// parameters, bad subject name templates and a missing default authority.
    #[error("configuration error for {id}: {message}")]
    Configuration {
        /// Registry id of the record being processed
        id: String,
        /// Description of what's invalid
        message: String,
    },

    /// The certificate authority capability failed to mint or sign
    #[error("capability error for {id}: {source}")]
    Capability {
        /// Registry id of the record being processed
        id: String,
        /// The underlying PKI failure
        #[source]
        source: PkiError,
    },

    /// A builder produced an artifact that violates a record invariant
    ///
    /// This signals a construction defect rather than bad input.
    #[error("invariant violation for {id}: {message}")]
    Invariant {
        /// Registry id of the record being processed
        id: String,
        /// Which invariant was violated
        message: String,
    },
}

impl Error {
    /// Create a configuration error without record context
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            id: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a configuration error for a specific record
    pub fn configuration_for(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Wrap a PKI failure for a specific record
    pub fn capability_for(id: impl Into<String>, source: PkiError) -> Self {
        Self::Capability {
            id: id.into(),
            source,
        }
    }

    /// Create an invariant violation for a specific record
    pub fn invariant_for(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Invariant {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Stable label for the error category, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Capability { .. } => "capability",
            Self::Invariant { .. } => "invariant",
        }
    }

    /// Registry id of the record the error refers to
    pub fn id(&self) -> &str {
        match self {
            Self::Configuration { id, .. }
            | Self::Capability { id, .. }
            | Self::Invariant { id, .. } => id,
        }
    }
}
