//! Two-phase certificate generation
//!
//! Authorities sign leaves, so every authority is materialized before any
//! leaf is built. Each phase walks a sorted snapshot of ids, which keeps the
//! order reproducible regardless of how the registry was filled.
//!
//! Generation is idempotent: records whose key is already in the secret store
//! are left untouched, so a run that failed midway can simply be repeated.

pub mod authority;
pub mod certificate;

use tracing::{info, instrument};

pub use authority::create_authority;
pub use certificate::{create_certificate, LeafContext};

use crate::config::{GenerationSettings, SizingSource};
use crate::pki::CertificateIssuer;
use crate::registry::{CertificateRecord, Registry};
use crate::store::{SecretData, UpdateOverlay};
use crate::{Error, Result, DEFAULT_AUTHORITY_ID};

/// What a builder did with one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Material was already in the secret store
    Existing,
    /// Operator-supplied material was adopted
    Overridden,
    /// New material was generated
    Generated,
}

impl Outcome {
    /// Whether the secret store changed and must be persisted
    pub fn is_dirty(self) -> bool {
        !matches!(self, Self::Existing)
    }
}

/// Check record invariants, then write its material to the store
///
/// Nothing is written when any name or artifact is empty.
pub(crate) fn persist(record: &CertificateRecord, store: &mut SecretData) -> Result<()> {
    let checks = [
        (record.private_key_name.is_empty(), "empty private key name"),
        (record.private_key.is_empty(), "empty private key"),
        (record.certificate_name.is_empty(), "empty certificate name"),
        (record.certificate.is_empty(), "empty certificate"),
    ];
    if let Some((_, message)) = checks.iter().find(|(violated, _)| *violated) {
        return Err(Error::invariant_for(&record.id, *message));
    }

    store.insert(record.private_key_name.clone(), record.private_key.clone());
    store.insert(record.certificate_name.clone(), record.certificate.clone());
    Ok(())
}

/// Drives authority and leaf generation over a registry
pub struct CertificateGenerator<'a, I: ?Sized, S: ?Sized> {
    issuer: &'a I,
    sizing: &'a S,
    settings: &'a GenerationSettings,
}

impl<'a, I, S> CertificateGenerator<'a, I, S>
where
    I: CertificateIssuer + ?Sized,
    S: SizingSource + ?Sized,
{
    /// Create a generator using the given capability, sizing source and topology
    pub fn new(issuer: &'a I, sizing: &'a S, settings: &'a GenerationSettings) -> Self {
        Self {
            issuer,
            sizing,
            settings,
        }
    }

    /// Generate every missing authority and certificate in `registry`
    ///
    /// Returns whether the store changed. Stops at the first error; entries
    /// written before the error stay in the store.
    #[instrument(skip_all, fields(records = registry.len()))]
    pub fn generate(
        &self,
        registry: &mut Registry,
        store: &mut SecretData,
        overlay: &UpdateOverlay,
    ) -> Result<bool> {
        let authority_ids = registry.authority_ids();
        if let Some(other) = authority_ids.iter().find(|id| *id != DEFAULT_AUTHORITY_ID) {
            return Err(Error::configuration_for(
                other,
                format!(
                    "only the '{}' authority is supported",
                    DEFAULT_AUTHORITY_ID
                ),
            ));
        }
        for record in authority_ids.iter().filter_map(|id| registry.get(id)) {
            if !record.role_name.is_empty() || !record.subject_names.is_empty() {
                return Err(Error::configuration_for(
                    &record.id,
                    "authority cannot carry a role or subject names",
                ));
            }
        }

        let mut dirty = false;

        for id in &authority_ids {
            let Some(record) = registry.get_mut(id) else {
                continue;
            };
            info!(id = %id, "Processing certificate authority");
            dirty |= create_authority(record, store, overlay, self.issuer)?.is_dirty();
        }

        let authority = registry.get(DEFAULT_AUTHORITY_ID).cloned();
        let ctx = LeafContext {
            issuer: self.issuer,
            sizing: self.sizing,
            settings: self.settings,
        };

        for id in registry.leaf_ids() {
            let Some(record) = registry.get_mut(&id) else {
                continue;
            };
            info!(
                id = %id,
                cert = %record.certificate_name,
                key = %record.private_key_name,
                "Processing certificate"
            );
            dirty |= create_certificate(record, store, overlay, authority.as_ref(), &ctx)?
                .is_dirty();
        }

        info!(dirty, "Certificate generation finished");
        Ok(dirty)
    }
}
