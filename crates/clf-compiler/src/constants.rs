use const_format::concatcp;

/// Name of the collector secret backend that resolves `SECRET[...]` tokens.
pub const SECRET_BACKEND_NAME: &str = "kubernetes_secret";

/// Directory the collector mounts referenced secrets into, one subdirectory per secret.
pub const SECRET_BASE_PATH: &str = "/collector/secrets";

/// Every secret value token starts with this prefix.
pub const SECRET_TOKEN_PREFIX: &str = concatcp!("SECRET[", SECRET_BACKEND_NAME, ".");

/// Directory the collector mounts generated configuration files into.
pub const CONFIG_BASE_PATH: &str = "/collector/config";

/// Suffix of the config map holding the AWS credentials profiles of a forwarder, one profile
/// per output using an IAM role.
pub const AWS_CREDENTIALS_CONFIG_MAP_SUFFIX: &str = "aws-credentials";
pub const AWS_CREDENTIALS_KEY: &str = "credentials";

/// Environment variable holding the name of the node the collector runs on.
pub const DEFAULT_NODE_NAME_ENV: &str = "VECTOR_SELF_NODE_NAME";

/// Environment variable holding the OpenShift cluster ID.
pub const CLUSTER_ID_ENV: &str = "OPENSHIFT_CLUSTER_ID";

/// The scratch subtree records are normalized under before they are projected to their
/// public shape.
pub const INTERNAL_FIELD: &str = "_internal";

pub const CONTAINER_LOGS_DIR: &str = "/var/log/pods";
pub const JOURNAL_DIR: &str = "/var/log/journal";
pub const HOST_AUDIT_LOG: &str = "/var/log/audit/audit.log";
pub const KUBE_API_AUDIT_LOG: &str = "/var/log/kube-apiserver/audit.log";
pub const OPENSHIFT_API_AUDIT_LOGS: [&str; 3] = [
    "/var/log/oauth-apiserver/audit.log",
    "/var/log/openshift-apiserver/audit.log",
    "/var/log/oauth-server/audit.log",
];
pub const OVN_AUDIT_LOG: &str = "/var/log/ovn/acl-audit-log.log";

/// Directory receiver TLS material is mounted into, one subdirectory per receiver.
pub const RECEIVER_CERTS_DIR: &str = "/etc/collector";

/// The namespace collector-internal workloads live in.
pub const OPENSHIFT_LOGGING_NAMESPACE: &str = "openshift-logging";
