//! Sink settings shared by several output types: URLs, TLS, authentication, delivery tuning and
//! encoding.

use std::str::FromStr;

use snafu::{OptionExt, ResultExt, ensure};
use url::Url;

use super::{
    IncompleteClientCertificateSnafu, IncompleteCredentialsSnafu, InvalidQuantitySnafu,
    InvalidTemplateSnafu, InvalidUrlSnafu, MissingAwsCredentialsSnafu, MissingHostSnafu, Result,
    UnknownAwsAuthTypeSnafu, UnknownDeliveryModeSnafu, UnknownTlsProfileSnafu,
    UnsupportedCompressionSnafu, UnsupportedSchemeSnafu,
};
use crate::{
    config::{Component, Table, Value},
    constants::{
        AWS_CREDENTIALS_CONFIG_MAP_SUFFIX, AWS_CREDENTIALS_KEY, CONFIG_BASE_PATH, INTERNAL_FIELD,
    },
    model::{
        AwsAuthentication, AwsAuthenticationType, ByteQuantity, DeliveryMode, HttpAuthentication,
        IntOrString, OutputTlsSpec, OutputTuningSpec, Seconds, TlsProfileType,
    },
    options::CompileOptions,
    secret::SecretReference,
    template::Template,
};

pub const HTTP_SCHEMES: [&str; 2] = ["http", "https"];

/// Upper bound of the disk buffer used for at-least-once delivery.
const DISK_BUFFER_MAX_SIZE: u64 = 268_435_488;

const MODERN_CIPHERS: [&str; 3] = [
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
];

const INTERMEDIATE_CIPHERS: [&str; 11] = [
    "TLS_AES_128_GCM_SHA256",
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ECDHE-RSA-AES256-GCM-SHA384",
    "ECDHE-ECDSA-CHACHA20-POLY1305",
    "ECDHE-RSA-CHACHA20-POLY1305",
    "DHE-RSA-AES128-GCM-SHA256",
    "DHE-RSA-AES256-GCM-SHA384",
];

/// Appended to the intermediate ciphers by the old profile.
const LEGACY_CIPHERS: [&str; 18] = [
    "DHE-RSA-CHACHA20-POLY1305",
    "ECDHE-ECDSA-AES128-SHA256",
    "ECDHE-RSA-AES128-SHA256",
    "ECDHE-ECDSA-AES128-SHA",
    "ECDHE-RSA-AES128-SHA",
    "ECDHE-ECDSA-AES256-SHA384",
    "ECDHE-RSA-AES256-SHA384",
    "ECDHE-ECDSA-AES256-SHA",
    "ECDHE-RSA-AES256-SHA",
    "DHE-RSA-AES128-SHA256",
    "DHE-RSA-AES256-SHA256",
    "AES128-GCM-SHA256",
    "AES256-GCM-SHA384",
    "AES128-SHA256",
    "AES256-SHA256",
    "AES128-SHA",
    "AES256-SHA",
    "DES-CBC3-SHA",
];

/// What a sink type supports of the common tuning options.
#[derive(Clone, Copy, Debug)]
pub struct Capabilities {
    /// Allowed values of `compression`. `none` is always allowed.
    pub compressions: &'static [&'static str],

    /// Whether `maxWrite` applies, as `batch.max_bytes`.
    pub batch: bool,

    /// Whether the retry durations apply, as `request.retry_*`.
    pub request: bool,
}

impl Capabilities {
    /// Sinks sending over HTTP.
    pub const fn http(compressions: &'static [&'static str]) -> Self {
        Self {
            compressions,
            batch: true,
            request: true,
        }
    }
}

/// Parses `url` and checks its scheme and host.
pub fn parse_url(url: &str, allowed: &[&'static str]) -> Result<Url> {
    let parsed = Url::parse(url).context(InvalidUrlSnafu { url })?;
    ensure!(
        allowed.contains(&parsed.scheme()),
        UnsupportedSchemeSnafu {
            url,
            scheme: parsed.scheme(),
            allowed: allowed.to_vec(),
        }
    );
    ensure!(
        parsed.host_str().is_some_and(|host| !host.is_empty()),
        MissingHostSnafu { url }
    );
    Ok(parsed)
}

/// Returns `true` for the schemes which imply TLS.
pub fn is_secure(url: &Url) -> bool {
    matches!(url.scheme(), "https" | "tls")
}

/// `host:port` of `url`, for sinks which take a socket address.
pub fn host_port(url: &Url, default_port: u16) -> Result<String> {
    let host = url.host_str().context(MissingHostSnafu {
        url: url.as_str(),
    })?;
    let port = url.port_or_known_default().unwrap_or(default_port);
    Ok(format!("{host}:{port}"))
}

pub fn template(field: &str, template: &str) -> Result<Template> {
    Template::parse(template).context(InvalidTemplateSnafu { field })
}

/// The `encoding` table leaving the scratch subtree and `extra` fields out of the payload.
pub fn encoding(codec: Option<&str>, extra: &[&str]) -> Table {
    let mut except = vec![INTERNAL_FIELD];
    except.extend_from_slice(extra);
    let mut table = Table::new().with("except_fields", Value::strings(except));
    if let Some(codec) = codec {
        table.insert("codec", codec);
    }
    table
}

fn seconds(field: &str, value: &IntOrString) -> Result<u64> {
    Seconds::try_from(value)
        .map(|Seconds(seconds)| seconds)
        .context(InvalidQuantitySnafu {
            field,
            value: value.to_string(),
        })
}

/// Applies delivery mode, compression, batch size and retry durations to `sink`.
pub fn apply_tuning(
    sink: &mut Component,
    tuning: Option<&OutputTuningSpec>,
    capabilities: &Capabilities,
) -> Result<()> {
    let Some(tuning) = tuning else {
        return Ok(());
    };

    if let Some(mode) = tuning.delivery_mode.as_deref().filter(|m| !m.is_empty()) {
        let mode = DeliveryMode::from_str(mode)
            .ok()
            .context(UnknownDeliveryModeSnafu { mode })?;
        let buffer = match mode {
            DeliveryMode::AtLeastOnce => {
                sink.table
                    .insert_table("acknowledgements", Table::new().with("enabled", true));
                Table::new()
                    .with("type", "disk")
                    .with("when_full", "block")
                    .with("max_size", DISK_BUFFER_MAX_SIZE)
            }
            DeliveryMode::AtMostOnce => Table::new()
                .with("type", "memory")
                .with("when_full", "drop_newest"),
        };
        sink.table.insert_table("buffer", buffer);
    }

    if let Some(compression) = tuning.compression.as_deref().filter(|c| !c.is_empty()) {
        ensure!(
            compression == "none" || capabilities.compressions.contains(&compression),
            UnsupportedCompressionSnafu {
                compression,
                allowed: std::iter::once("none")
                    .chain(capabilities.compressions.iter().copied())
                    .collect::<Vec<_>>(),
            }
        );
        if compression != "none" {
            sink.table.insert("compression", compression);
        }
    }

    if let Some(max_write) = tuning.max_write.as_ref().filter(|_| capabilities.batch) {
        let ByteQuantity(bytes) = ByteQuantity::try_from(max_write).context(InvalidQuantitySnafu {
            field: "maxWrite",
            value: max_write.to_string(),
        })?;
        sink.table
            .insert_table("batch", Table::new().with("max_bytes", bytes));
    }

    if capabilities.request {
        let request = sink.table.table_mut("request");
        if let Some(min) = &tuning.min_retry_duration {
            request.insert("retry_initial_backoff_secs", seconds("minRetryDuration", min)?);
        }
        if let Some(max) = &tuning.max_retry_duration {
            request.insert("retry_max_duration_secs", seconds("maxRetryDuration", max)?);
        }
    }
    Ok(())
}

fn owned(ciphers: &[&str]) -> Vec<String> {
    ciphers.iter().map(|c| (*c).to_owned()).collect()
}

fn profile_settings(
    spec: Option<&OutputTlsSpec>,
    options: &CompileOptions,
) -> Result<(Option<String>, Vec<String>)> {
    let Some(profile) = spec.and_then(|tls| tls.security_profile.as_ref()) else {
        return Ok((
            options.tls_profile_min_version.clone(),
            options.tls_profile_ciphers.clone(),
        ));
    };

    let profile_type = TlsProfileType::from_str(&profile.profile_type)
        .ok()
        .context(UnknownTlsProfileSnafu {
            profile: &profile.profile_type,
        })?;
    Ok(match profile_type {
        TlsProfileType::Old => {
            let mut ciphers = owned(&INTERMEDIATE_CIPHERS);
            ciphers.extend(owned(&LEGACY_CIPHERS));
            (Some("VersionTLS10".to_owned()), ciphers)
        }
        TlsProfileType::Intermediate => {
            (Some("VersionTLS12".to_owned()), owned(&INTERMEDIATE_CIPHERS))
        }
        TlsProfileType::Modern => (Some("VersionTLS13".to_owned()), owned(&MODERN_CIPHERS)),
        TlsProfileType::Custom => profile.custom.as_ref().map_or((None, Vec::new()), |custom| {
            (custom.min_tls_version.clone(), custom.ciphers.clone())
        }),
    })
}

/// The `tls` table of a sink.
///
/// Empty unless the sink connects securely or TLS settings are given. Key material is read by
/// the collector from the mounted secrets, only the key passphrase is passed by value.
pub fn tls(secure: bool, spec: Option<&OutputTlsSpec>, options: &CompileOptions) -> Result<Table> {
    let mut table = Table::new();
    if !secure && spec.is_none() {
        return Ok(table);
    }

    if let Some(spec) = spec {
        if let Some(ca) = &spec.ca {
            table.insert("ca_file", ca.path());
        }
        match (&spec.certificate, &spec.key) {
            (Some(certificate), Some(key)) => {
                table.insert("crt_file", certificate.path());
                table.insert("key_file", key.path());
            }
            (None, None) => {}
            _ => return IncompleteClientCertificateSnafu.fail(),
        }
        if let Some(passphrase) = &spec.key_passphrase {
            table.insert("key_pass", passphrase.value_token());
        }
        if spec.insecure_skip_verify {
            table.insert("verify_certificate", false);
            table.insert("verify_hostname", false);
        }
    }

    let (min_version, ciphers) = profile_settings(spec, options)?;
    if let Some(min_version) = min_version.filter(|v| !v.is_empty()) {
        table.insert("min_tls_version", min_version);
    }
    if !ciphers.is_empty() {
        table.insert("ciphersuites", ciphers.join(","));
    }
    Ok(table)
}

pub fn http_secret_refs(auth: Option<&HttpAuthentication>) -> Vec<&SecretReference> {
    auth.iter()
        .flat_map(|auth| auth.username.iter().chain(&auth.password).chain(&auth.token))
        .collect()
}

/// The `auth` table of HTTP based sinks, bearer token or basic authentication.
pub fn http_auth(auth: Option<&HttpAuthentication>) -> Result<Table> {
    let Some(auth) = auth else {
        return Ok(Table::new());
    };
    if let Some(token) = &auth.token {
        return Ok(Table::new()
            .with("strategy", "bearer")
            .with("token", token.value_token()));
    }
    match (&auth.username, &auth.password) {
        (Some(username), Some(password)) => Ok(Table::new()
            .with("strategy", "basic")
            .with("user", username.value_token())
            .with("password", password.value_token())),
        (None, None) => Ok(Table::new()),
        _ => IncompleteCredentialsSnafu {
            what: "authentication.username and authentication.password",
        }
        .fail(),
    }
}

pub fn aws_secret_refs(auth: &AwsAuthentication) -> Vec<&SecretReference> {
    let mut refs = Vec::new();
    if let Some(key) = &auth.aws_access_key {
        refs.extend([&key.key_id, &key.key_secret]);
    }
    if let Some(role) = &auth.iam_role {
        refs.push(&role.role_arn);
        refs.extend(&role.token);
    }
    refs
}

/// The file holding the AWS credentials profiles of `forwarder`.
pub fn aws_credentials_file(forwarder: &str) -> String {
    format!(
        "{CONFIG_BASE_PATH}/{forwarder}-{AWS_CREDENTIALS_CONFIG_MAP_SUFFIX}/{AWS_CREDENTIALS_KEY}"
    )
}

/// The `auth` table of AWS sinks.
///
/// Access keys are passed by value. An IAM role is assumed through the profile of the output
/// in the credentials file of the forwarder, which names the role and the web identity token.
pub fn aws_auth(auth: &AwsAuthentication, output: &str, forwarder: &str) -> Result<Table> {
    let auth_type = AwsAuthenticationType::from_str(&auth.auth_type)
        .ok()
        .context(UnknownAwsAuthTypeSnafu {
            auth_type: &auth.auth_type,
        })?;
    match auth_type {
        AwsAuthenticationType::AwsAccessKey => {
            let key = auth
                .aws_access_key
                .as_ref()
                .context(MissingAwsCredentialsSnafu {
                    auth_type: auth_type.as_ref(),
                })?;
            Ok(Table::new()
                .with("access_key_id", key.key_id.value_token())
                .with("secret_access_key", key.key_secret.value_token()))
        }
        AwsAuthenticationType::IamRole => {
            ensure!(
                auth.iam_role.is_some(),
                MissingAwsCredentialsSnafu {
                    auth_type: auth_type.as_ref(),
                }
            );
            Ok(Table::new()
                .with("credentials_file", aws_credentials_file(forwarder))
                .with("profile", format!("output_{output}")))
        }
    }
}

/// Adds the tuning and TLS settings every sink shares.
pub fn finish(
    mut sink: Component,
    tuning: Option<&OutputTuningSpec>,
    capabilities: &Capabilities,
    secure: bool,
    tls_spec: Option<&OutputTlsSpec>,
    options: &CompileOptions,
) -> Result<Component> {
    apply_tuning(&mut sink, tuning, capabilities)?;
    sink.table.insert_table("tls", tls(secure, tls_spec, options)?);
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::{config::Config, diagnostics::Kind};

    const COMPRESSIONS: [&str; 2] = ["gzip", "zstd"];

    fn tuning(yaml: &str) -> OutputTuningSpec {
        serde_yaml::from_str(yaml).expect("valid tuning")
    }

    fn tuned(yaml: &str) -> Result<String> {
        let mut sink = Component::sink("output_x", "http", vec!["i".to_owned()]);
        apply_tuning(&mut sink, Some(&tuning(yaml)), &Capabilities::http(&COMPRESSIONS))?;
        let mut config = Config::new();
        config.push(sink);
        Ok(config.render())
    }

    #[test]
    fn delivers_at_least_once() {
        let rendered = tuned(indoc! {"
            deliveryMode: atLeastOnce
            compression: zstd
            maxWrite: 10M
            minRetryDuration: 5s
            maxRetryDuration: 1m
        "})
        .expect("tuning applies");

        assert_eq!(
            rendered,
            indoc! {r#"
                [sinks.output_x]
                type = "http"
                inputs = ["i"]
                compression = "zstd"

                [sinks.output_x.acknowledgements]
                enabled = true

                [sinks.output_x.batch]
                max_bytes = 10000000

                [sinks.output_x.buffer]
                max_size = 268435488
                type = "disk"
                when_full = "block"

                [sinks.output_x.request]
                retry_initial_backoff_secs = 5
                retry_max_duration_secs = 60
            "#}
        );
    }

    #[test]
    fn delivers_at_most_once() {
        let rendered = tuned("deliveryMode: atMostOnce\ncompression: none").expect("tuning applies");
        assert!(rendered.contains("[sinks.output_x.buffer]\ntype = \"memory\"\nwhen_full = \"drop_newest\""));
        assert!(!rendered.contains("acknowledgements"));
        assert!(!rendered.contains("compression"));
    }

    #[rstest]
    #[case("compression: lz4", Kind::EnumInvalid)]
    #[case("deliveryMode: sometimes", Kind::EnumInvalid)]
    #[case("maxWrite: 10Q", Kind::SchemaInvalid)]
    #[case("maxRetryDuration: soon", Kind::SchemaInvalid)]
    fn rejects_invalid_tuning(#[case] yaml: &str, #[case] kind: Kind) {
        let error = tuned(yaml).expect_err("tuning is invalid");
        assert_eq!(error.kind(), kind);
    }

    #[rstest]
    #[case("https://es.example:9200", true)]
    #[case("tls://kafka:9093", true)]
    #[case("http://es.example", false)]
    fn detects_secure_schemes(#[case] url: &str, #[case] secure: bool) {
        let url = Url::parse(url).expect("valid URL");
        assert_eq!(is_secure(&url), secure);
    }

    #[test]
    fn checks_urls() {
        assert!(parse_url("https://es:9200", &HTTP_SCHEMES).is_ok());

        let error = parse_url("ftp://es", &HTTP_SCHEMES).expect_err("scheme is not allowed");
        assert_eq!(
            error.to_string(),
            r#"URL "ftp://es" uses the scheme "ftp", expected one of ["http", "https"]"#
        );
        assert!(parse_url("not a url", &HTTP_SCHEMES).is_err());
    }

    #[test]
    fn socket_addresses_fall_back_to_the_default_port() {
        let url = Url::parse("udp://syslog.example").expect("valid URL");
        assert_eq!(host_port(&url, 514).expect("has a host"), "syslog.example:514");
        let url = Url::parse("tcp://syslog.example:6514").expect("valid URL");
        assert_eq!(host_port(&url, 514).expect("has a host"), "syslog.example:6514");
    }

    fn tls_spec(yaml: &str) -> OutputTlsSpec {
        serde_yaml::from_str(yaml).expect("valid TLS spec")
    }

    #[test]
    fn references_tls_material() {
        let spec = tls_spec(indoc! {"
            ca: {secretName: es-tls, key: ca.crt}
            certificate: {secretName: es-tls, key: tls.crt}
            key: {secretName: es-tls, key: tls.key}
            keyPassphrase: {secretName: es-tls, key: passphrase}
            insecureSkipVerify: true
            securityProfile:
              type: Modern
        "});
        let table = tls(true, Some(&spec), &CompileOptions::default()).expect("TLS is valid");

        let get = |key: &str| table.get(key).cloned();
        assert_eq!(get("ca_file"), Some("/collector/secrets/es-tls/ca.crt".into()));
        assert_eq!(get("crt_file"), Some("/collector/secrets/es-tls/tls.crt".into()));
        assert_eq!(get("key_file"), Some("/collector/secrets/es-tls/tls.key".into()));
        assert_eq!(
            get("key_pass"),
            Some("SECRET[kubernetes_secret.es-tls/passphrase]".into())
        );
        assert_eq!(get("verify_certificate"), Some(false.into()));
        assert_eq!(get("verify_hostname"), Some(false.into()));
        assert_eq!(get("min_tls_version"), Some("VersionTLS13".into()));
        assert_eq!(
            get("ciphersuites"),
            Some("TLS_AES_128_GCM_SHA256,TLS_AES_256_GCM_SHA384,TLS_CHACHA20_POLY1305_SHA256".into())
        );
    }

    #[test]
    fn falls_back_to_the_cluster_profile() {
        let options = CompileOptions {
            tls_profile_min_version: Some("VersionTLS12".to_owned()),
            tls_profile_ciphers: vec!["TLS_AES_128_GCM_SHA256".to_owned()],
            ..CompileOptions::default()
        };
        let table = tls(true, None, &options).expect("TLS is valid");
        assert_eq!(table.get("min_tls_version"), Some(&"VersionTLS12".into()));
        assert_eq!(table.get("ciphersuites"), Some(&"TLS_AES_128_GCM_SHA256".into()));

        assert!(tls(false, None, &options).expect("TLS is valid").is_empty());
    }

    #[test]
    fn rejects_half_client_certificates() {
        let spec = tls_spec("certificate: {secretName: es-tls, key: tls.crt}");
        let error = tls(true, Some(&spec), &CompileOptions::default()).expect_err("key is missing");
        assert_eq!(error.kind(), Kind::SchemaInvalid);

        let spec = tls_spec("securityProfile: {type: modern}");
        let error = tls(true, Some(&spec), &CompileOptions::default()).expect_err("unknown profile");
        assert_eq!(error.kind(), Kind::EnumInvalid);
    }

    #[test]
    fn authenticates_over_http() {
        let bearer: HttpAuthentication =
            serde_yaml::from_str("token: {secretName: s, key: token}").expect("valid auth");
        let table = http_auth(Some(&bearer)).expect("auth is valid");
        assert_eq!(table.get("strategy"), Some(&"bearer".into()));
        assert_eq!(table.get("token"), Some(&"SECRET[kubernetes_secret.s/token]".into()));

        let basic: HttpAuthentication = serde_yaml::from_str(indoc! {"
            username: {secretName: s, key: user}
            password: {secretName: s, key: pass}
        "})
        .expect("valid auth");
        let table = http_auth(Some(&basic)).expect("auth is valid");
        assert_eq!(table.get("strategy"), Some(&"basic".into()));
        assert_eq!(table.get("user"), Some(&"SECRET[kubernetes_secret.s/user]".into()));

        let half: HttpAuthentication =
            serde_yaml::from_str("username: {secretName: s, key: user}").expect("valid auth");
        assert!(http_auth(Some(&half)).is_err());
    }

    #[test]
    fn authenticates_with_aws() {
        let keys: AwsAuthentication = serde_yaml::from_str(indoc! {"
            type: awsAccessKey
            awsAccessKey:
              keyId: {secretName: aws, key: id}
              keySecret: {secretName: aws, key: secret}
        "})
        .expect("valid auth");
        let table = aws_auth(&keys, "cw", "instance").expect("auth is valid");
        assert_eq!(table.get("access_key_id"), Some(&"SECRET[kubernetes_secret.aws/id]".into()));

        let role: AwsAuthentication = serde_yaml::from_str(indoc! {"
            type: iamRole
            iamRole:
              roleArn: {secretName: aws, key: role_arn}
        "})
        .expect("valid auth");
        let table = aws_auth(&role, "cw", "instance").expect("auth is valid");
        assert_eq!(
            table.get("credentials_file"),
            Some(&"/collector/config/instance-aws-credentials/credentials".into())
        );
        assert_eq!(table.get("profile"), Some(&"output_cw".into()));

        let missing: AwsAuthentication =
            serde_yaml::from_str("type: iamRole").expect("valid auth");
        assert!(aws_auth(&missing, "cw", "instance").is_err());
    }
}
