//! Root authority builder

use tracing::{debug, info};

use super::{persist, Outcome};
use crate::overrides::check_override;
use crate::pki::{default_validity, CertificateIssuer, AUTHORITY_COMMON_NAME};
use crate::registry::CertificateRecord;
use crate::store::{unescape_newlines, SecretData, UpdateOverlay};
use crate::{Error, Result};

/// Obtain or create the self-signed root for `record`
///
/// Existing store material wins, then an operator override, and only then
/// is a new root minted. Whatever is chosen ends up in the record so leaf
/// certificates can be signed with it.
pub fn create_authority<I: CertificateIssuer + ?Sized>(
    record: &mut CertificateRecord,
    store: &mut SecretData,
    overlay: &UpdateOverlay,
    issuer: &I,
) -> Result<Outcome> {
    if store.has(&record.private_key_name) {
        record.private_key = store
            .get(&record.private_key_name)
            .map(unescape_newlines)
            .unwrap_or_default();
        record.certificate = store
            .get(&record.certificate_name)
            .map(unescape_newlines)
            .unwrap_or_default();
        debug!(id = %record.id, "Authority already present in secret store");
        return Ok(Outcome::Existing);
    }

    if check_override(record, overlay, store)? {
        return Ok(Outcome::Overridden);
    }

    let minted = issuer
        .mint_root(AUTHORITY_COMMON_NAME, default_validity())
        .map_err(|e| Error::capability_for(&record.id, e))?;
    record.private_key = minted.private_key;
    record.certificate = minted.certificate;

    persist(record, store)?;
    info!(
        id = %record.id,
        cert = %record.certificate_name,
        "Generated certificate authority"
    );
    Ok(Outcome::Generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::{IssuedMaterial, MockCertificateIssuer, PkiError};
    use mockall::predicate::*;

    fn authority() -> CertificateRecord {
        CertificateRecord {
            id: "cacert".to_string(),
            private_key_name: "internal-ca-key".to_string(),
            certificate_name: "internal-ca-cert".to_string(),
            is_authority: true,
            ..Default::default()
        }
    }

    fn minted() -> IssuedMaterial {
        IssuedMaterial {
            certificate: b"CA CERT".to_vec(),
            private_key: b"CA KEY".to_vec(),
        }
    }

    #[test]
    fn new_root_is_minted_and_persisted() {
        let mut issuer = MockCertificateIssuer::new();
        issuer
            .expect_mint_root()
            .with(eq(AUTHORITY_COMMON_NAME), eq(default_validity()))
            .times(1)
            .returning(|_, _| Ok(minted()));

        let mut record = authority();
        let mut store = SecretData::new();
        let outcome =
            create_authority(&mut record, &mut store, &SecretData::new(), &issuer).unwrap();

        assert_eq!(outcome, Outcome::Generated);
        assert_eq!(store.get("internal-ca-key"), Some(&b"CA KEY"[..]));
        assert_eq!(store.get("internal-ca-cert"), Some(&b"CA CERT"[..]));
        assert_eq!(record.private_key, b"CA KEY".to_vec());
    }

    #[test]
    fn stored_root_is_loaded_not_regenerated() {
        let mut issuer = MockCertificateIssuer::new();
        issuer.expect_mint_root().never();

        let mut store = SecretData::from_iter([
            ("internal-ca-key", b"KEY\\nLINE".to_vec()),
            ("internal-ca-cert", b"CERT".to_vec()),
        ]);
        let before = store.clone();
        let mut record = authority();

        let outcome =
            create_authority(&mut record, &mut store, &SecretData::new(), &issuer).unwrap();

        assert_eq!(outcome, Outcome::Existing);
        assert!(!outcome.is_dirty());
        assert_eq!(store, before);
        assert_eq!(record.private_key, b"KEY\nLINE".to_vec());
        assert_eq!(record.certificate, b"CERT".to_vec());
    }

    #[test]
    fn override_pre_empts_minting() {
        let mut issuer = MockCertificateIssuer::new();
        issuer.expect_mint_root().never();

        let overlay = SecretData::from_iter([
            ("internal-ca-key", b"OPERATOR KEY".to_vec()),
            ("internal-ca-cert", b"OPERATOR CERT".to_vec()),
        ]);
        let mut record = authority();
        let mut store = SecretData::new();

        let outcome = create_authority(&mut record, &mut store, &overlay, &issuer).unwrap();

        assert_eq!(outcome, Outcome::Overridden);
        assert!(outcome.is_dirty());
        assert_eq!(store, overlay);
    }

    #[test]
    fn minting_failure_is_a_capability_error() {
        let mut issuer = MockCertificateIssuer::new();
        issuer
            .expect_mint_root()
            .returning(|_, _| Err(PkiError::KeyGenerationFailed("no entropy".to_string())));

        let mut store = SecretData::new();
        let err = create_authority(&mut authority(), &mut store, &SecretData::new(), &issuer)
            .unwrap_err();

        assert!(matches!(err, Error::Capability { .. }));
        assert!(err.to_string().contains("no entropy"));
        assert!(store.is_empty());
    }
}
