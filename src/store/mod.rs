//! Secret store and update overlay
//!
//! Both are plain name-to-bytes maps. The store is read before generation to
//! detect existing material and written after; the overlay holds operator
//! overrides and is only ever read.
//!
//! Values are stored verbatim. Material that was pasted into a secret by hand
//! may carry PEM line breaks escaped as the two characters `\n`;
//! [`unescape_newlines`] restores them before the bytes are used for signing.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;

/// Name-to-bytes map backing a secret store or an update overlay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretData {
    entries: BTreeMap<String, Vec<u8>>,
}

/// Operator overrides, read-only during a run
pub type UpdateOverlay = SecretData;

impl SecretData {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the `data` map of a Kubernetes Secret
    pub fn from_secret(secret: &Secret) -> Self {
        let entries = secret
            .data
            .iter()
            .flatten()
            .map(|(name, value)| (name.clone(), value.0.clone()))
            .collect();
        Self { entries }
    }

    /// Write every entry into the `data` map of a Kubernetes Secret
    ///
    /// Entries already in the Secret under other names are preserved.
    pub fn apply_to(&self, secret: &mut Secret) {
        let data = secret.data.get_or_insert_with(BTreeMap::new);
        for (name, value) in &self.entries {
            data.insert(name.clone(), ByteString(value.clone()));
        }
    }

    /// Value stored under `name`, if any
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Whether `name` holds a non-empty value
    ///
    /// Empty values count as absent, so a blanked entry is regenerated.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| !value.is_empty())
    }

    /// Store `value` under `name`, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_slice()))
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for SecretData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Replace escaped `\n` sequences with real newlines
pub fn unescape_newlines(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    let mut bytes = value.iter().copied().peekable();
    while let Some(b) = bytes.next() {
        if b == b'\\' && bytes.peek() == Some(&b'n') {
            bytes.next();
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}
