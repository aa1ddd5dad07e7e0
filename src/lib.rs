//! Certgen - X.509 certificate orchestration for multi-role deployments
//!
//! Certgen decides which certificates a deployment needs, in what order they
//! are produced, and what identities they carry. Key generation and signing
//! are delegated to a [`pki::CertificateIssuer`].
//!
//! # Flow
//!
//! A run works on three inputs:
//! - A [`registry::Registry`] of certificate records built from the role manifest
//! - The current [`store::SecretData`] of the deployment's secret
//! - An optional [`store::UpdateOverlay`] with operator-supplied material
//!
//! Authorities are resolved first, then every leaf is signed by the default
//! authority. Records already present in the store are never regenerated, so
//! a run can be repeated safely.
//!
//! # Modules
//!
//! - [`registry`] - Certificate records keyed by id
//! - [`san`] - Host list derivation and subject name templates
//! - [`overrides`] - Operator-supplied key/certificate pairs
//! - [`generate`] - Authority and leaf builders plus the two-phase orchestrator
//! - [`pki`] - The CA capability and its rcgen implementation
//! - [`store`] - Secret store data and value decoding
//! - [`config`] - Cluster topology and sizing parameters
//! - [`error`] - Error types for generation runs

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod generate;
pub mod overrides;
pub mod pki;
pub mod registry;
pub mod san;
pub mod store;

pub use config::{EnvSizing, GenerationSettings, SizingSource};
pub use error::Error;
pub use generate::{CertificateGenerator, Outcome};
pub use pki::{CertificateIssuer, KeyAlgorithm, RcgenIssuer};
pub use registry::{CertificateRecord, ConfigEntry, Registry, ValueKind};
pub use store::{SecretData, UpdateOverlay};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Id of the authority that signs every leaf certificate
pub const DEFAULT_AUTHORITY_ID: &str = "cacert";
