/*!
`kubectl`-backed resource client.

Every call shells out to `kubectl` and exchanges JSON on stdin/stdout, so the
client inherits whatever authentication the local kubeconfig provides
(in-cluster service accounts included).
*/

use super::ResourceClient;
use crate::config::KubectlConfig;
use crate::resources::ResourceKind;
use crate::{Result, SnapshotError};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tracing::{debug, error};

/// Resource client that drives the `kubectl` binary
#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: PathBuf,
    kubeconfig: Option<PathBuf>,
    context: Option<String>,
}

impl KubectlClient {
    /// Use `kubectl` from `PATH` with the default kubeconfig and context
    pub fn new() -> Self {
        Self::from_config(&KubectlConfig::default())
    }

    pub fn from_config(config: &KubectlConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            kubeconfig: config.kubeconfig.clone(),
            context: config.context.clone(),
        }
    }

    /// Global flags prepended to every invocation
    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        if let Some(context) = &self.context {
            args.push(format!("--context={context}"));
        }
        args
    }

    fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<Output> {
        let mut full_args = self.global_args();
        full_args.extend(args.iter().cloned());
        debug!(
            binary = %self.binary.display(),
            args = %full_args.join(" "),
            "Executing kubectl"
        );

        let mut command = Command::new(&self.binary);
        command
            .args(&full_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|e| {
            SnapshotError::api(format!(
                "Failed to execute {}: {e}",
                self.binary.display()
            ))
        })?;

        // The child may exit before reading stdin; reap it either way and let
        // its stderr explain the failure.
        let written = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => pipe.write_all(input),
            _ => Ok(()),
        };
        let output = child.wait_with_output()?;
        match written {
            Err(e) if output.status.success() => Err(e.into()),
            Err(e) => {
                debug!(error = %e, status = %output.status, "kubectl exited before reading stdin");
                Ok(output)
            }
            Ok(()) => Ok(output),
        }
    }
}

impl Default for KubectlClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a failed invocation to an error kind
pub(crate) fn classify_failure(
    stderr: &str,
    kind: &ResourceKind,
    namespace: &str,
    name: Option<&str>,
) -> SnapshotError {
    let name = name.unwrap_or_default();
    if stderr.contains("(NotFound)") {
        SnapshotError::not_found(kind.kind, name, namespace)
    } else if stderr.contains("(AlreadyExists)") {
        SnapshotError::Conflict {
            kind: kind.kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    } else {
        SnapshotError::api(format!("kubectl failed for {kind} '{name}': {}", stderr.trim()))
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub(crate) fn get_args(kind: &ResourceKind, namespace: &str, name: &str) -> Vec<String> {
    vec![
        "get".into(),
        kind.qualified_plural(),
        name.into(),
        format!("--namespace={namespace}"),
        "--output=json".into(),
    ]
}

pub(crate) fn list_args(kind: &ResourceKind, namespace: &str) -> Vec<String> {
    vec![
        "get".into(),
        kind.qualified_plural(),
        format!("--namespace={namespace}"),
        "--output=json".into(),
    ]
}

pub(crate) fn create_args(namespace: &str) -> Vec<String> {
    vec![
        "create".into(),
        "--filename=-".into(),
        format!("--namespace={namespace}"),
        "--output=json".into(),
    ]
}

pub(crate) fn delete_args(kind: &ResourceKind, namespace: &str, name: &str) -> Vec<String> {
    vec![
        "delete".into(),
        kind.qualified_plural(),
        name.into(),
        format!("--namespace={namespace}"),
        "--ignore-not-found=true".into(),
        "--wait=false".into(),
        "--output=name".into(),
    ]
}

impl ResourceClient for KubectlClient {
    fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Option<Value>> {
        let output = self.run(&get_args(kind, namespace, name), None)?;
        if !output.status.success() {
            return match classify_failure(&stderr_of(&output), kind, namespace, Some(name)) {
                e if e.is_not_found() => Ok(None),
                e => Err(e),
            };
        }
        Ok(Some(serde_json::from_slice(&output.stdout)?))
    }

    fn list(&self, kind: &ResourceKind, namespace: &str) -> Result<Vec<Value>> {
        let output = self.run(&list_args(kind, namespace), None)?;
        if !output.status.success() {
            return Err(classify_failure(&stderr_of(&output), kind, namespace, None));
        }
        let mut list: Value = serde_json::from_slice(&output.stdout)?;
        match list.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(SnapshotError::api(format!(
                "Unexpected {kind} list payload: {other}"
            ))),
        }
    }

    fn create(&self, kind: &ResourceKind, namespace: &str, body: &Value) -> Result<Value> {
        let name = body.pointer("/metadata/name").and_then(Value::as_str);
        let payload = serde_json::to_vec(body)?;
        let output = self.run(&create_args(namespace), Some(&payload))?;
        if !output.status.success() {
            let err = classify_failure(&stderr_of(&output), kind, namespace, name);
            error!(kind = %kind, namespace, name = ?name, error = %err, "kubectl create failed");
            return Err(err);
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<bool> {
        let output = self.run(&delete_args(kind, namespace, name), None)?;
        if !output.status.success() {
            return Err(classify_failure(&stderr_of(&output), kind, namespace, Some(name)));
        }
        // --ignore-not-found prints nothing when the object was absent
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn pod_logs(&self, namespace: &str, pod: &str) -> Result<String> {
        let args = vec![
            "logs".to_string(),
            pod.to_string(),
            format!("--namespace={namespace}"),
        ];
        let output = self.run(&args, None)?;
        if !output.status.success() {
            return Err(classify_failure(
                &stderr_of(&output),
                &crate::resources::POD,
                namespace,
                Some(pod),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{POD_SNAPSHOT, POD_SNAPSHOT_MANUAL_TRIGGER};

    #[cfg(unix)]
    #[test]
    fn test_create_reports_stderr_when_kubectl_skips_stdin() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("kubectl");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'Error from server (AlreadyExists): \"t1\" already exists' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = KubectlClient::from_config(&KubectlConfig {
            binary: script,
            kubeconfig: None,
            context: None,
        });
        // larger than a pipe buffer, so the write fails once the script exits
        let body = serde_json::json!({
            "metadata": {"name": "t1"},
            "spec": {"padding": "x".repeat(1 << 20)}
        });

        let err = client
            .create(&POD_SNAPSHOT_MANUAL_TRIGGER, "ns", &body)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Conflict { ref name, .. } if name == "t1"));
    }

    #[test]
    fn test_classify_not_found() {
        let stderr = r#"Error from server (NotFound): podsnapshots.podsnapshot.gke.io "s1" not found"#;
        let err = classify_failure(stderr, &POD_SNAPSHOT, "ns", Some("s1"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_classify_already_exists() {
        let stderr = r#"Error from server (AlreadyExists): error when creating "STDIN": podsnapshotmanualtriggers.podsnapshot.gke.io "t1" already exists"#;
        let err = classify_failure(stderr, &POD_SNAPSHOT_MANUAL_TRIGGER, "ns", Some("t1"));
        assert!(matches!(err, SnapshotError::Conflict { ref name, .. } if name == "t1"));
    }

    #[test]
    fn test_classify_other_failures_as_api_errors() {
        let stderr = "Error from server (Forbidden): forbidden\n";
        let err = classify_failure(stderr, &POD_SNAPSHOT, "ns", Some("s1"));
        assert!(matches!(err, SnapshotError::Api(ref msg) if msg.ends_with("forbidden")));
    }

    #[test]
    fn test_delete_args_are_idempotent() {
        let args = delete_args(&POD_SNAPSHOT, "team-a", "s1");
        assert_eq!(args[1], "podsnapshots.podsnapshot.gke.io");
        assert!(args.contains(&"--ignore-not-found=true".to_string()));
        assert!(args.contains(&"--namespace=team-a".to_string()));
    }

    #[test]
    fn test_global_args_from_config() {
        let client = KubectlClient::from_config(&KubectlConfig {
            binary: PathBuf::from("/usr/local/bin/kubectl"),
            kubeconfig: Some(PathBuf::from("/tmp/kubeconfig")),
            context: Some("gke-test".to_string()),
        });
        assert_eq!(
            client.global_args(),
            vec!["--kubeconfig=/tmp/kubeconfig", "--context=gke-test"]
        );
    }

    #[test]
    fn test_missing_binary_is_an_api_error() {
        let client = KubectlClient::from_config(&KubectlConfig {
            binary: PathBuf::from("/nonexistent/kubectl-for-tests"),
            kubeconfig: None,
            context: None,
        });
        let err = client.list(&POD_SNAPSHOT, "ns").unwrap_err();
        assert!(matches!(err, SnapshotError::Api(_)));
    }

    #[test]
    fn test_list_and_get_args() {
        assert_eq!(
            list_args(&POD_SNAPSHOT, "ns"),
            vec![
                "get",
                "podsnapshots.podsnapshot.gke.io",
                "--namespace=ns",
                "--output=json"
            ]
        );
        assert_eq!(get_args(&POD_SNAPSHOT, "ns", "s1")[2], "s1");
        assert_eq!(create_args("ns")[1], "--filename=-");
    }
}
