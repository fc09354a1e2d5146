//! The read-only secret store and the two ways secrets are referenced in the rendered config.
//!
//! Secret bytes are never written into the configuration. Value references become
//! `SECRET[kubernetes_secret.<name>/<key>]` tokens that the collector resolves with its
//! file secret backend, path references become the file the collector reads at run time.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{SECRET_BASE_PATH, SECRET_TOKEN_PREFIX};

/// Reference to a single key of a secret.
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the secret.
    pub secret_name: String,

    /// Key within the secret.
    pub key: String,
}

impl SecretReference {
    pub fn new(secret_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            key: key.into(),
        }
    }

    /// The token the collector replaces with the secret value.
    pub fn value_token(&self) -> String {
        format!(
            "{SECRET_TOKEN_PREFIX}{name}/{key}]",
            name = self.secret_name,
            key = self.key
        )
    }

    /// The file the collector reads the secret value from.
    pub fn path(&self) -> String {
        format!(
            "{SECRET_BASE_PATH}/{name}/{key}",
            name = self.secret_name,
            key = self.key
        )
    }
}

impl std::fmt::Display for SecretReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.secret_name, self.key)
    }
}

/// In-memory mapping of secret name to key to value.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SecretStore(BTreeMap<String, BTreeMap<String, Vec<u8>>>);

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a single secret key.
    pub fn with(
        mut self,
        secret_name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(secret_name, key, value);
        self
    }

    pub fn insert(
        &mut self,
        secret_name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) {
        self.0
            .entry(secret_name.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn get(&self, reference: &SecretReference) -> Option<&[u8]> {
        self.0
            .get(&reference.secret_name)
            .and_then(|keys| keys.get(&reference.key))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, reference: &SecretReference) -> bool {
        self.get(reference).is_some()
    }

    /// Returns the value as UTF-8 text, if present and valid.
    pub fn get_str(&self, reference: &SecretReference) -> Option<&str> {
        self.get(reference)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Returns the references of `wanted` which are not present in the store.
    pub fn missing<'a>(
        &self,
        wanted: impl IntoIterator<Item = &'a SecretReference>,
    ) -> Vec<&'a SecretReference> {
        wanted
            .into_iter()
            .filter(|reference| !self.contains(reference))
            .collect()
    }
}

impl<N, K, V> FromIterator<(N, K, V)> for SecretStore
where
    N: Into<String>,
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    fn from_iter<T: IntoIterator<Item = (N, K, V)>>(iter: T) -> Self {
        let mut store = Self::new();
        for (name, key, value) in iter {
            store.insert(name, key, value);
        }
        store
    }
}
