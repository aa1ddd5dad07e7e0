//! Host list derivation
//!
//! Maps a leaf record and the cluster topology to the ordered list of hosts
//! the certificate is issued for. The first host becomes the Common Name and
//! the rest become Subject Alternative Names. The list fixes the
//! certificate's identity, so it must be identical for identical inputs.
//!
//! For a role `api` in namespace `ns1` with two replicas the list starts:
//!
//! ```text
//! api, *.api,
//! api.ns1.svc, *.api.ns1.svc,
//! api.ns1.svc.cluster.local, *.api.ns1.svc.cluster.local,
//! api-0.api-set, api-0.api-set.ns1.svc, api-0.api-set.ns1.svc.cluster.local,
//! api-1.api-set, api-1.api-set.ns1.svc, api-1.api-set.ns1.svc.cluster.local,
//! api.<suffix>, *.api.<suffix>
//! ```
//!
//! followed by the rendered subject name templates.

pub mod template;

use crate::config::{GenerationSettings, SizingSource};
use crate::registry::CertificateRecord;
use crate::{Error, Result};

/// Cluster-local DNS domain appended to namespace-qualified names
pub const CLUSTER_DOMAIN: &str = "cluster.local";

/// Largest replica count a role may declare
///
/// Each replica adds three hosts to the certificate.
pub const MAX_REPLICA_COUNT: u32 = 1000;

/// Sizing key holding the replica count of `role_name`
///
/// `api-server` maps to `KUBE_SIZING_API_SERVER_COUNT`.
pub fn sizing_key(role_name: &str) -> String {
    format!(
        "KUBE_SIZING_{}_COUNT",
        role_name.to_uppercase().replace('-', "_")
    )
}

/// Replica count of `role_name`
///
/// A missing, non-numeric or oversized value is a configuration error.
pub fn replica_count<S: SizingSource + ?Sized>(
    sizing: &S,
    id: &str,
    role_name: &str,
) -> Result<u32> {
    let key = sizing_key(role_name);
    let raw = sizing.lookup(&key).ok_or_else(|| {
        Error::configuration_for(id, format!("sizing parameter {} is not set", key))
    })?;
    let count = raw.trim().parse::<u32>().map_err(|e| {
        Error::configuration_for(
            id,
            format!("sizing parameter {}='{}' is not a count: {}", key, raw, e),
        )
    })?;
    if count > MAX_REPLICA_COUNT {
        return Err(Error::configuration_for(
            id,
            format!(
                "sizing parameter {}={} exceeds the maximum of {} replicas",
                key, count, MAX_REPLICA_COUNT
            ),
        ));
    }
    Ok(count)
}

/// Ordered host list that is accumulated with optional wildcard twins
#[derive(Debug, Default)]
struct HostList {
    hosts: Vec<String>,
}

impl HostList {
    fn add(&mut self, name: String, wildcard: bool) {
        if wildcard {
            let wild = format!("*.{}", name);
            self.hosts.push(name);
            self.hosts.push(wild);
        } else {
            self.hosts.push(name);
        }
    }

    /// Add `name`, then its namespace- and cluster-qualified forms
    fn add_qualified(&mut self, name: &str, namespace: &str, wildcard: bool) {
        self.add(name.to_string(), wildcard);
        self.add(format!("{}.{}.svc", name, namespace), wildcard);
        self.add(
            format!("{}.{}.svc.{}", name, namespace, CLUSTER_DOMAIN),
            wildcard,
        );
    }
}

/// Derive the host list for `record`
///
/// Element 0 is the Common Name. Records with neither role nor subject names
/// fall back to a single host equal to their certificate name.
pub fn derive_hosts<S: SizingSource + ?Sized>(
    record: &CertificateRecord,
    settings: &GenerationSettings,
    sizing: &S,
) -> Result<Vec<String>> {
    let mut list = HostList::default();
    let namespace = settings.namespace.as_str();

    if !record.role_name.is_empty() {
        let role = record.role_name.as_str();
        list.add_qualified(role, namespace, true);

        let count = replica_count(sizing, &record.id, role)?;
        for index in 0..count {
            let replica = format!("{}-{}.{}-set", role, index, role);
            list.add_qualified(&replica, namespace, false);
        }

        list.add(
            format!("{}.{}", role, settings.service_domain_suffix),
            true,
        );
    }

    for subject in &record.subject_names {
        let host = template::render(subject, settings).map_err(|e| {
            Error::configuration_for(
                &record.id,
                format!("cannot render subject name '{}': {}", subject, e),
            )
        })?;
        list.add(host, false);
    }

    if list.hosts.is_empty() {
        list.add(record.certificate_name.clone(), false);
    }

    Ok(list.hosts)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings() -> GenerationSettings {
        GenerationSettings::new("ns1", "example.com", "svc.example.com")
    }

    fn sizing(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn leaf(role: &str, subjects: &[&str]) -> CertificateRecord {
        CertificateRecord {
            id: "leaf".to_string(),
            private_key_name: "leaf-key".to_string(),
            certificate_name: "leaf-cert".to_string(),
            role_name: role.to_string(),
            subject_names: subjects.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn sizing_keys_are_normalized() {
        assert_eq!(sizing_key("api"), "KUBE_SIZING_API_COUNT");
        assert_eq!(sizing_key("api-server"), "KUBE_SIZING_API_SERVER_COUNT");
    }

    #[test]
    fn role_hosts_match_worked_example() {
        let hosts = derive_hosts(
            &leaf("api", &[]),
            &settings(),
            &sizing(&[("KUBE_SIZING_API_COUNT", "2")]),
        )
        .unwrap();

        assert_eq!(
            hosts,
            vec![
                "api",
                "*.api",
                "api.ns1.svc",
                "*.api.ns1.svc",
                "api.ns1.svc.cluster.local",
                "*.api.ns1.svc.cluster.local",
                "api-0.api-set",
                "api-0.api-set.ns1.svc",
                "api-0.api-set.ns1.svc.cluster.local",
                "api-1.api-set",
                "api-1.api-set.ns1.svc",
                "api-1.api-set.ns1.svc.cluster.local",
                "api.svc.example.com",
                "*.api.svc.example.com",
            ]
        );
    }

    #[test]
    fn subject_names_follow_role_hosts_without_wildcards() {
        let hosts = derive_hosts(
            &leaf("api", &["api.{{.DOMAIN}}", "10.0.0.1"]),
            &settings(),
            &sizing(&[("KUBE_SIZING_API_COUNT", "0")]),
        )
        .unwrap();

        assert_eq!(hosts.len(), 10);
        assert_eq!(hosts[0], "api");
        assert_eq!(&hosts[8..], &["api.example.com", "10.0.0.1"]);
    }

    #[test]
    fn first_subject_name_is_common_name_without_role() {
        let hosts = derive_hosts(
            &leaf("", &["{{.KUBERNETES_NAMESPACE}}.{{.DOMAIN}}", "other"]),
            &settings(),
            &sizing(&[]),
        )
        .unwrap();
        assert_eq!(hosts, vec!["ns1.example.com", "other"]);
    }

    #[test]
    fn identityless_leaf_falls_back_to_certificate_name() {
        let hosts = derive_hosts(&leaf("", &[]), &settings(), &sizing(&[])).unwrap();
        assert_eq!(hosts, vec!["leaf-cert"]);
    }

    #[test]
    fn derivation_is_deterministic() {
        let record = leaf("db-node", &["db.{{.DOMAIN}}"]);
        let sizing = sizing(&[("KUBE_SIZING_DB_NODE_COUNT", "3")]);

        let first = derive_hosts(&record, &settings(), &sizing).unwrap();
        let second = derive_hosts(&record, &settings(), &sizing).unwrap();
        assert_eq!(first, second);
        assert!(first.contains(&"db-node-2.db-node-set.ns1.svc".to_string()));
    }

    // ==========================================================================
    // Story: Sizing parameters are mandatory for role certificates
    // ==========================================================================

    #[test]
    fn story_missing_replica_count_aborts() {
        let err = derive_hosts(&leaf("api", &[]), &settings(), &sizing(&[])).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("KUBE_SIZING_API_COUNT"));
        assert_eq!(err.id(), "leaf");
    }

    #[test]
    fn story_non_numeric_replica_count_aborts() {
        for bad in ["two", "-1", ""] {
            let err = derive_hosts(
                &leaf("api", &[]),
                &settings(),
                &sizing(&[("KUBE_SIZING_API_COUNT", bad)]),
            )
            .unwrap_err();
            assert!(err.to_string().contains("is not a count"), "value {:?}", bad);
        }
    }

    #[test]
    fn story_oversized_replica_count_aborts() {
        let at_limit = MAX_REPLICA_COUNT.to_string();
        let hosts = derive_hosts(
            &leaf("api", &[]),
            &settings(),
            &sizing(&[("KUBE_SIZING_API_COUNT", at_limit.as_str())]),
        )
        .unwrap();
        assert_eq!(hosts.len(), 8 + 3 * MAX_REPLICA_COUNT as usize);

        for bad in ["1001", "4000000000"] {
            let err = derive_hosts(
                &leaf("api", &[]),
                &settings(),
                &sizing(&[("KUBE_SIZING_API_COUNT", bad)]),
            )
            .unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
            assert!(err.to_string().contains("exceeds the maximum"), "value {:?}", bad);
        }
    }

    #[test]
    fn sizing_is_not_consulted_without_role() {
        // No sizing entries at all, yet a subject-only leaf derives fine
        let hosts = derive_hosts(&leaf("", &["a"]), &settings(), &sizing(&[])).unwrap();
        assert_eq!(hosts, vec!["a"]);
    }

    #[test]
    fn bad_subject_template_names_the_record() {
        let err = derive_hosts(
            &leaf("", &["{{.UNKNOWN}}"]),
            &settings(),
            &sizing(&[]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("unknown placeholder 'UNKNOWN'"));
    }
}
