use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::secret::SecretReference;

/// TLS settings of an output.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTlsSpec {
    /// CA bundle used to verify the server certificate.
    #[serde(default)]
    pub ca: Option<SecretReference>,

    /// Client certificate, requires `key`.
    #[serde(default)]
    pub certificate: Option<SecretReference>,

    /// Client private key, requires `certificate`.
    #[serde(default)]
    pub key: Option<SecretReference>,

    /// Passphrase of the client private key.
    #[serde(default)]
    pub key_passphrase: Option<SecretReference>,

    /// Disables verification of the server certificate and hostname.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Overrides the cluster-wide TLS profile for this output.
    #[serde(default)]
    pub security_profile: Option<TlsSecurityProfile>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSecurityProfile {
    /// One of `Old`, `Intermediate`, `Modern` or `Custom`.
    #[serde(rename = "type")]
    pub profile_type: String,

    #[serde(default)]
    pub custom: Option<CustomTlsProfile>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTlsProfile {
    #[serde(default)]
    pub ciphers: Vec<String>,

    #[serde(default)]
    pub min_tls_version: Option<String>,
}

#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, PartialEq)]
pub enum TlsProfileType {
    Old,
    Intermediate,
    Modern,
    Custom,
}
