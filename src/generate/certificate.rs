//! Leaf certificate builder

use tracing::{debug, info, warn};

use super::{persist, Outcome};
use crate::config::{GenerationSettings, SizingSource};
use crate::overrides::check_override;
use crate::pki::{default_validity, CertificateIssuer, KeyUsage, SigningRequest};
use crate::registry::CertificateRecord;
use crate::san::derive_hosts;
use crate::store::{SecretData, UpdateOverlay};
use crate::{Error, Result, DEFAULT_AUTHORITY_ID};

/// Inputs shared by every leaf build in a run
pub struct LeafContext<'a, I: ?Sized, S: ?Sized> {
    /// CA capability
    pub issuer: &'a I,
    /// Replica counts per role
    pub sizing: &'a S,
    /// Cluster topology
    pub settings: &'a GenerationSettings,
}

/// Obtain or create the leaf certificate for `record`
///
/// Material already in the store is left alone and an operator override is
/// adopted as-is. Otherwise a key pair is generated and signed by
/// `authority` for the hosts derived from the record.
pub fn create_certificate<I, S>(
    record: &mut CertificateRecord,
    store: &mut SecretData,
    overlay: &UpdateOverlay,
    authority: Option<&CertificateRecord>,
    ctx: &LeafContext<'_, I, S>,
) -> Result<Outcome>
where
    I: CertificateIssuer + ?Sized,
    S: SizingSource + ?Sized,
{
    if store.has(&record.private_key_name) {
        debug!(id = %record.id, "Certificate already present in secret store");
        return Ok(Outcome::Existing);
    }

    if check_override(record, overlay, store)? {
        return Ok(Outcome::Overridden);
    }

    // Only the default authority is supported
    let authority = authority.filter(|ca| ca.has_material()).ok_or_else(|| {
        Error::configuration_for(
            &record.id,
            format!("authority '{}' not found", DEFAULT_AUTHORITY_ID),
        )
    })?;

    if record.is_identityless() {
        warn!(
            id = %record.id,
            cert = %record.certificate_name,
            "Certificate has no names, falling back to its storage name"
        );
    }

    let hosts = derive_hosts(record, ctx.settings, ctx.sizing)?;
    let request = SigningRequest {
        common_name: hosts.first().cloned().unwrap_or_default(),
        hosts,
        usages: vec![KeyUsage::ServerAuth, KeyUsage::ClientAuth],
        validity: default_validity(),
    };

    let issued = ctx
        .issuer
        .sign(&authority.private_key, &authority.certificate, &request)
        .map_err(|e| Error::capability_for(&record.id, e))?;
    record.private_key = issued.private_key;
    record.certificate = issued.certificate;

    persist(record, store)?;
    info!(
        id = %record.id,
        common_name = %request.common_name,
        san_count = request.hosts.len(),
        "Generated certificate"
    );
    Ok(Outcome::Generated)
}
