//! Operator-supplied overrides
//!
//! An operator can pre-empt generation by placing a key and certificate in
//! the update overlay. Overrides must come in pairs: half a pair is a fatal
//! configuration error, never a partial adoption.

use tracing::info;

use crate::registry::CertificateRecord;
use crate::store::{unescape_newlines, SecretData, UpdateOverlay};
use crate::{Error, Result};

/// Adopt the overlay's material for `record` if it supplies any
///
/// When both entries are present they are copied verbatim into `store`, the
/// record's in-memory material is filled from the decoded values, and `true`
/// is returned. When neither is present nothing changes and `false` is
/// returned.
pub fn check_override(
    record: &mut CertificateRecord,
    overlay: &UpdateOverlay,
    store: &mut SecretData,
) -> Result<bool> {
    let has_key = overlay.has(&record.private_key_name);
    let has_cert = overlay.has(&record.certificate_name);

    match (overlay.get(&record.private_key_name), overlay.get(&record.certificate_name)) {
        (Some(key), Some(cert)) if has_key && has_cert => {
            store.insert(record.private_key_name.clone(), key.to_vec());
            store.insert(record.certificate_name.clone(), cert.to_vec());
            record.private_key = unescape_newlines(key);
            record.certificate = unescape_newlines(cert);

            info!(
                id = %record.id,
                key = %record.private_key_name,
                cert = %record.certificate_name,
                "Adopted operator override"
            );
            Ok(true)
        }
        _ if has_key => Err(Error::configuration_for(
            &record.id,
            format!(
                "override supplies key '{}' without certificate '{}'",
                record.private_key_name, record.certificate_name
            ),
        )),
        _ if has_cert => Err(Error::configuration_for(
            &record.id,
            format!(
                "override supplies certificate '{}' without key '{}'",
                record.certificate_name, record.private_key_name
            ),
        )),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CertificateRecord {
        CertificateRecord {
            id: "api".to_string(),
            private_key_name: "api-key".to_string(),
            certificate_name: "api-cert".to_string(),
            role_name: "api".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn complete_pair_is_adopted_verbatim() {
        let overlay: UpdateOverlay = SecretData::from_iter([
            ("api-key", b"KEY\\nDATA".to_vec()),
            ("api-cert", b"CERT".to_vec()),
        ]);
        let mut store = SecretData::new();
        let mut rec = record();

        assert!(check_override(&mut rec, &overlay, &mut store).unwrap());

        // Store keeps the overlay bytes exactly
        assert_eq!(store.get("api-key"), Some(&b"KEY\\nDATA"[..]));
        assert_eq!(store.get("api-cert"), Some(&b"CERT"[..]));
        // The record holds decoded material ready for signing
        assert_eq!(rec.private_key, b"KEY\nDATA".to_vec());
        assert_eq!(rec.certificate, b"CERT".to_vec());
    }

    #[test]
    fn absent_pair_changes_nothing() {
        let overlay = SecretData::from_iter([("other-key", b"x".to_vec())]);
        let mut store = SecretData::new();
        let mut rec = record();

        assert!(!check_override(&mut rec, &overlay, &mut store).unwrap());
        assert!(store.is_empty());
        assert_eq!(rec, record());
    }

    #[test]
    fn key_without_certificate_is_fatal() {
        let overlay = SecretData::from_iter([("api-key", b"KEY".to_vec())]);
        let mut store = SecretData::new();

        let err = check_override(&mut record(), &overlay, &mut store).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("key 'api-key' without certificate"));
        assert!(store.is_empty());
    }

    #[test]
    fn certificate_without_key_is_fatal() {
        let overlay = SecretData::from_iter([("api-cert", b"CERT".to_vec())]);
        let mut store = SecretData::new();

        let err = check_override(&mut record(), &overlay, &mut store).unwrap_err();
        assert!(err.to_string().contains("certificate 'api-cert' without key"));
    }

    #[test]
    fn blank_partner_counts_as_missing() {
        let overlay =
            SecretData::from_iter([("api-key", b"KEY".to_vec()), ("api-cert", Vec::new())]);
        let mut store = SecretData::new();

        assert!(check_override(&mut record(), &overlay, &mut store).is_err());
    }
}
