//! Configuration for the Podsnap client and its sessions
//!
//! [`ClientConfig`] holds cluster-wide settings (namespace, how to reach the
//! API, controller location, wait budgets) and can be loaded from a JSON file
//! and overridden from `PODSNAP_*` environment variables. [`SessionConfig`]
//! describes a single sandbox session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::{Result, SnapshotError};

/// Namespace the self-installed snapshot system runs in
pub const SNAPSHOT_NAMESPACE: &str = "gps-system";

/// Name fragment identifying the snapshot controller's pods
pub const SNAPSHOT_CONTROLLER_NAME: &str = "gke-pod-snapshot-controller";

/// How to invoke `kubectl`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
    /// Path or name of the `kubectl` binary
    pub binary: PathBuf,
    /// Explicit kubeconfig file (defaults to kubectl's own lookup)
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use
    pub context: Option<String>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("kubectl"),
            kubeconfig: None,
            context: None,
        }
    }
}

/// Where the snapshot controller is installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub namespace: String,
    pub name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: SNAPSHOT_NAMESPACE.to_string(),
            name: SNAPSHOT_CONTROLLER_NAME.to_string(),
        }
    }
}

/// Cluster-wide client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Namespace sandboxes, triggers and snapshots live in
    pub namespace: String,
    pub kubectl: KubectlConfig,
    pub controller: ControllerConfig,
    /// Fixed wait between status checks
    pub poll_interval_ms: u64,
    /// Default deadline for a checkpoint to reach a terminal state
    pub checkpoint_timeout_secs: u64,
    /// Deadline for a new sandbox to report its pod
    pub sandbox_ready_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            kubectl: KubectlConfig::default(),
            controller: ControllerConfig::default(),
            poll_interval_ms: 1_000,
            checkpoint_timeout_secs: 300,
            sandbox_ready_timeout_secs: 180,
        }
    }
}

impl ClientConfig {
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn checkpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.checkpoint_timeout_secs)
    }

    pub fn sandbox_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_ready_timeout_secs)
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SnapshotError::validation(format!(
                "Failed to read config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let config: ClientConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PODSNAP_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup
    ///
    /// Recognised keys: `PODSNAP_NAMESPACE`, `PODSNAP_KUBECTL`,
    /// `PODSNAP_KUBECONFIG`, `PODSNAP_CONTEXT`, `PODSNAP_CONTROLLER_NAMESPACE`,
    /// `PODSNAP_POLL_INTERVAL_MS`, `PODSNAP_CHECKPOINT_TIMEOUT_SECS`,
    /// `PODSNAP_SANDBOX_READY_TIMEOUT_SECS`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ns) = lookup("PODSNAP_NAMESPACE") {
            self.namespace = ns;
        }
        if let Some(binary) = lookup("PODSNAP_KUBECTL") {
            self.kubectl.binary = PathBuf::from(binary);
        }
        if let Some(kubeconfig) = lookup("PODSNAP_KUBECONFIG") {
            self.kubectl.kubeconfig = Some(PathBuf::from(kubeconfig));
        }
        if let Some(context) = lookup("PODSNAP_CONTEXT") {
            self.kubectl.context = Some(context);
        }
        if let Some(ns) = lookup("PODSNAP_CONTROLLER_NAMESPACE") {
            self.controller.namespace = ns;
        }
        if let Some(value) = lookup("PODSNAP_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("PODSNAP_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("PODSNAP_CHECKPOINT_TIMEOUT_SECS") {
            self.checkpoint_timeout_secs = parse_number("PODSNAP_CHECKPOINT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("PODSNAP_SANDBOX_READY_TIMEOUT_SECS") {
            self.sandbox_ready_timeout_secs =
                parse_number("PODSNAP_SANDBOX_READY_TIMEOUT_SECS", &value)?;
        }
        self.validate()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(SnapshotError::validation("namespace cannot be empty"));
        }
        if self.controller.namespace.trim().is_empty() || self.controller.name.trim().is_empty() {
            return Err(SnapshotError::validation(
                "controller namespace and name cannot be empty",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(SnapshotError::validation(
                "poll_interval_ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| SnapshotError::validation(format!("{key}={value:?} is not a number: {e}")))
}

/// How callers reach the sandbox's server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Direct router URL; takes precedence over the gateway
    pub api_url: Option<String>,
    pub gateway_name: Option<String>,
    /// Defaults to the session namespace
    pub gateway_namespace: Option<String>,
    /// Port the sandbox container listens on
    pub server_port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            gateway_name: None,
            gateway_namespace: None,
            server_port: 8888,
        }
    }
}

/// Settings for one sandbox session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Template the sandbox claim refers to
    pub template_name: String,
    /// Extra labels put on the claim
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Restore from this exact snapshot instead of the controller's default
    #[serde(default)]
    pub snapshot_id: Option<String>,
    /// Claim name; generated from the template name when absent
    #[serde(default)]
    pub claim_name: Option<String>,
    /// Refuse to checkpoint unless the controller reports healthy
    #[serde(default = "default_true")]
    pub require_controller: bool,
    /// Leave the sandbox claim in place when the session closes
    #[serde(default)]
    pub keep_sandbox: bool,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

fn default_true() -> bool {
    true
}

impl SessionConfig {
    pub fn new<S: Into<String>>(template_name: S) -> Self {
        Self {
            template_name: template_name.into(),
            labels: BTreeMap::new(),
            snapshot_id: None,
            claim_name: None,
            require_controller: true,
            keep_sandbox: false,
            connection: ConnectionConfig::default(),
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_snapshot_id<S: Into<String>>(mut self, snapshot_id: S) -> Self {
        self.snapshot_id = Some(snapshot_id.into());
        self
    }

    pub fn with_claim_name<S: Into<String>>(mut self, claim_name: S) -> Self {
        self.claim_name = Some(claim_name.into());
        self
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn require_controller(mut self, require: bool) -> Self {
        self.require_controller = require;
        self
    }

    pub fn keep_sandbox(mut self, keep: bool) -> Self {
        self.keep_sandbox = keep;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.template_name.trim().is_empty() {
            return Err(SnapshotError::validation("template_name cannot be empty"));
        }
        if matches!(&self.snapshot_id, Some(id) if id.trim().is_empty()) {
            return Err(SnapshotError::validation(
                "snapshot_id cannot be empty when provided",
            ));
        }
        if matches!(&self.claim_name, Some(name) if name.trim().is_empty()) {
            return Err(SnapshotError::validation(
                "claim_name cannot be empty when provided",
            ));
        }
        Ok(())
    }
}

/// Parse `key=value` label arguments
///
/// Entries without `=` or with an empty key are skipped with a warning.
pub fn parse_labels<I, S>(args: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut labels = BTreeMap::new();
    for arg in args {
        let arg = arg.as_ref();
        match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                labels.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => warn!(label = arg, "Ignoring invalid label, expected key=value"),
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.namespace, "default");
        assert_eq!(config.controller.namespace, "gps-system");
        assert_eq!(config.controller.name, "gke-pod-snapshot-controller");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PODSNAP_NAMESPACE", "sandbox-test"),
            ("PODSNAP_CONTEXT", "gke-dev"),
            ("PODSNAP_POLL_INTERVAL_MS", "250"),
            ("PODSNAP_CHECKPOINT_TIMEOUT_SECS", "90"),
        ]
        .into_iter()
        .collect();

        let mut config = ClientConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.namespace, "sandbox-test");
        assert_eq!(config.kubectl.context.as_deref(), Some("gke-dev"));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.checkpoint_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_apply_env_rejects_bad_numbers() {
        let mut config = ClientConfig::default();
        let result = config.apply_env(|key| {
            (key == "PODSNAP_POLL_INTERVAL_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(SnapshotError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_empty_namespace() {
        let mut config = ClientConfig::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let config = ClientConfig::default().with_namespace("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"namespace": "team-a", "controller": {{"namespace": "snapshots"}}}}"#
        )
        .unwrap();

        let config = ClientConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.namespace, "team-a");
        assert_eq!(config.controller.namespace, "snapshots");
        assert_eq!(config.controller.name, SNAPSHOT_CONTROLLER_NAME);
        assert_eq!(config.checkpoint_timeout_secs, 300);
    }

    #[test]
    fn test_from_json_file_missing() {
        let result = ClientConfig::from_json_file("/nonexistent/podsnap.json");
        assert!(matches!(result, Err(SnapshotError::Validation(_))));
    }

    #[test]
    fn test_session_config_validation() {
        assert!(SessionConfig::new("python-counter-template").validate().is_ok());
        assert!(SessionConfig::new("").validate().is_err());
        assert!(SessionConfig::new("t")
            .with_snapshot_id(" ")
            .validate()
            .is_err());
    }

    #[test]
    fn test_session_config_deserialize_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"template_name": "python-counter-template"}"#).unwrap();
        assert!(config.require_controller);
        assert!(!config.keep_sandbox);
        assert_eq!(config.connection.server_port, 8888);
    }

    #[test]
    fn test_parse_labels() {
        let labels = parse_labels(["app=agent-sandbox-workload", "env=dev", "broken", "=x"]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["app"], "agent-sandbox-workload");
        assert_eq!(labels["env"], "dev");
    }

    #[test]
    fn test_parse_labels_keeps_equals_in_value() {
        let labels = parse_labels(["selector=a=b"]);
        assert_eq!(labels["selector"], "a=b");
    }
}
