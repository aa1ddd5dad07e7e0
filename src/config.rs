//! Run configuration and sizing parameters
//!
//! Cluster topology comes from the environment of the surrounding process:
//! the namespace the roles are deployed into, the external domain, the
//! service domain suffix, and one replica count per role.

use std::collections::{BTreeMap, HashMap};

use crate::{Error, Result};

/// Environment variable holding the Kubernetes namespace
pub const NAMESPACE_ENV: &str = "KUBERNETES_NAMESPACE";

/// Environment variable holding the external domain
pub const DOMAIN_ENV: &str = "DOMAIN";

/// Environment variable holding the service domain suffix
pub const SERVICE_DOMAIN_SUFFIX_ENV: &str = "KUBE_SERVICE_DOMAIN_SUFFIX";

/// Cluster topology used to derive certificate hosts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Namespace the roles run in
    pub namespace: String,
    /// External domain, substituted into subject name templates
    pub domain: String,
    /// Suffix for service hostnames (e.g. "svc.example.com")
    pub service_domain_suffix: String,
}

impl GenerationSettings {
    /// Create settings from explicit values
    pub fn new(
        namespace: impl Into<String>,
        domain: impl Into<String>,
        service_domain_suffix: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            domain: domain.into(),
            service_domain_suffix: service_domain_suffix.into(),
        }
    }

    /// Load settings from the process environment
    ///
    /// The namespace and service domain suffix are required; the domain
    /// defaults to empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::configuration(format!("{} is not set", key)))
        };

        Ok(Self {
            namespace: required(NAMESPACE_ENV)?,
            domain: lookup(DOMAIN_ENV).unwrap_or_default(),
            service_domain_suffix: required(SERVICE_DOMAIN_SUFFIX_ENV)?,
        })
    }
}

/// External key-value source for role replica counts
pub trait SizingSource {
    /// Raw value stored under `key`, if any
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Sizing parameters read from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSizing;

impl SizingSource for EnvSizing {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl SizingSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl SizingSource for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn settings_load_from_lookup() {
        let settings = GenerationSettings::from_lookup(lookup_from(&[
            (NAMESPACE_ENV, "ns1"),
            (DOMAIN_ENV, "example.com"),
            (SERVICE_DOMAIN_SUFFIX_ENV, "svc.example.com"),
        ]))
        .unwrap();

        assert_eq!(
            settings,
            GenerationSettings::new("ns1", "example.com", "svc.example.com")
        );
    }

    #[test]
    fn domain_is_optional() {
        let settings = GenerationSettings::from_lookup(lookup_from(&[
            (NAMESPACE_ENV, "ns1"),
            (SERVICE_DOMAIN_SUFFIX_ENV, "svc.example.com"),
        ]))
        .unwrap();
        assert_eq!(settings.domain, "");
    }

    #[test]
    fn missing_namespace_is_a_configuration_error() {
        let err = GenerationSettings::from_lookup(lookup_from(&[(
            SERVICE_DOMAIN_SUFFIX_ENV,
            "svc.example.com",
        )]))
        .unwrap_err();

        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains(NAMESPACE_ENV));
    }

    #[test]
    fn empty_suffix_is_a_configuration_error() {
        let err = GenerationSettings::from_lookup(lookup_from(&[
            (NAMESPACE_ENV, "ns1"),
            (SERVICE_DOMAIN_SUFFIX_ENV, ""),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(SERVICE_DOMAIN_SUFFIX_ENV));
    }

    #[test]
    fn maps_act_as_sizing_sources() {
        let mut sizing = BTreeMap::new();
        sizing.insert("KUBE_SIZING_API_COUNT".to_string(), "3".to_string());
        assert_eq!(sizing.lookup("KUBE_SIZING_API_COUNT").as_deref(), Some("3"));
        assert_eq!(sizing.lookup("KUBE_SIZING_DB_COUNT"), None);
    }
}
