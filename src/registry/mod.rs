//! Certificate registry
//!
//! Configuration describes certificates one value at a time: a private key
//! variable and a certificate variable share a generator id and arrive as
//! separate entries. The registry merges those entries into one
//! [`CertificateRecord`] per id.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which half of a certificate pair a configuration entry names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// The PEM certificate
    Certificate,
    /// The PEM private key
    PrivateKey,
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "certificate" => Ok(Self::Certificate),
            "private_key" => Ok(Self::PrivateKey),
            other => Err(format!("unknown certificate value type '{}'", other)),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate => write!(f, "certificate"),
            Self::PrivateKey => write!(f, "private_key"),
        }
    }
}

/// One certificate-related value from the configuration source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    /// Generator id shared by the key and certificate entries
    pub id: String,
    /// Value type as written in configuration ("certificate" or "private_key")
    pub value_type: String,
    /// Configuration variable name
    pub name: String,
    /// Whether this generator produces a root authority
    #[serde(default)]
    pub is_authority: bool,
    /// Subject name templates
    #[serde(default)]
    pub subject_names: Vec<String>,
    /// Role the certificate identifies
    #[serde(default)]
    pub role_name: String,
}

/// Everything known about one certificate/key pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateRecord {
    /// Registry key
    pub id: String,
    /// Storage name of the private key
    pub private_key_name: String,
    /// Storage name of the certificate
    pub certificate_name: String,
    /// Subject name templates, in order
    pub subject_names: Vec<String>,
    /// Role the certificate identifies, empty if none
    pub role_name: String,
    /// Root authority rather than leaf
    pub is_authority: bool,
    /// PEM certificate, once adopted or generated
    pub certificate: Vec<u8>,
    /// PEM private key, once adopted or generated
    pub private_key: Vec<u8>,
}

impl CertificateRecord {
    /// Whether the record has neither subject names nor a role
    pub fn is_identityless(&self) -> bool {
        self.subject_names.is_empty() && self.role_name.is_empty()
    }

    /// Whether both key and certificate material are loaded
    pub fn has_material(&self) -> bool {
        !self.private_key.is_empty() && !self.certificate.is_empty()
    }
}

/// Convert a configuration variable name into its storage name
///
/// `INTERNAL_CA_CERT` becomes `internal-ca-cert`.
pub fn storage_name(variable_name: &str) -> String {
    variable_name.to_lowercase().replace('_', "-")
}

/// Id-keyed collection of certificate records
///
/// Ids iterate in sorted order, so generation order is reproducible.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: BTreeMap<String, CertificateRecord>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a stream of configuration entries
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a ConfigEntry>) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            registry.record_entry(entry);
        }
        registry
    }

    /// Merge a configuration entry into the registry
    pub fn record_entry(&mut self, entry: &ConfigEntry) {
        match entry.value_type.parse::<ValueKind>() {
            Ok(kind) => self.record(
                &entry.id,
                kind,
                &entry.name,
                entry.is_authority,
                &entry.subject_names,
                &entry.role_name,
            ),
            Err(e) => warn!(
                id = %entry.id,
                name = %entry.name,
                "Ignoring certificate generator entry: {}",
                e
            ),
        }
    }

    /// Merge one value into the record for `id`, creating it if needed
    ///
    /// The authority flag and the storage name for `kind` are always set.
    /// Subject names and role only overwrite when the new value is non-empty,
    /// so key-only and cert-only entries can carry them independently.
    pub fn record(
        &mut self,
        id: &str,
        kind: ValueKind,
        name: &str,
        is_authority: bool,
        subject_names: &[String],
        role_name: &str,
    ) {
        let record = self
            .records
            .entry(id.to_string())
            .or_insert_with(|| CertificateRecord {
                id: id.to_string(),
                ..Default::default()
            });

        match kind {
            ValueKind::Certificate => record.certificate_name = storage_name(name),
            ValueKind::PrivateKey => record.private_key_name = storage_name(name),
        }
        record.is_authority = is_authority;

        if !subject_names.is_empty() {
            record.subject_names = subject_names.to_vec();
        }
        if !role_name.is_empty() {
            record.role_name = role_name.to_string();
        }
    }

    /// Record for `id`, if any
    pub fn get(&self, id: &str) -> Option<&CertificateRecord> {
        self.records.get(id)
    }

    /// Mutable record for `id`, if any
    pub fn get_mut(&mut self, id: &str) -> Option<&mut CertificateRecord> {
        self.records.get_mut(id)
    }

    /// Sorted ids of authority records
    pub fn authority_ids(&self) -> Vec<String> {
        self.ids_where(|record| record.is_authority)
    }

    /// Sorted ids of leaf records
    pub fn leaf_ids(&self) -> Vec<String> {
        self.ids_where(|record| !record.is_authority)
    }

    fn ids_where(&self, keep: impl Fn(&CertificateRecord) -> bool) -> Vec<String> {
        self.records
            .values()
            .filter(|record| keep(record))
            .map(|record| record.id.clone())
            .collect()
    }

    /// Iterate records in id order
    pub fn iter(&self) -> impl Iterator<Item = &CertificateRecord> {
        self.records.values()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
