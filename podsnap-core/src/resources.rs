/*!
Typed views of the orchestration API resources Podsnap reads and writes.

The schemas belong to the snapshot controller and the sandbox operator; only
the fields the client consumes are modelled, everything else is ignored on
deserialization.
*/

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const PODSNAPSHOT_API_GROUP: &str = "podsnapshot.gke.io";
pub const PODSNAPSHOT_API_VERSION: &str = "v1alpha1";

pub const SANDBOX_API_GROUP: &str = "agents.x-k8s.io";
pub const SANDBOX_API_VERSION: &str = "v1alpha1";

pub const CLAIM_API_GROUP: &str = "extensions.agents.x-k8s.io";
pub const CLAIM_API_VERSION: &str = "v1alpha1";

pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
pub const GATEWAY_API_VERSION: &str = "v1";

/// Annotation on a sandbox carrying the name of the pod backing it
pub const POD_NAME_ANNOTATION: &str = "agents.x-k8s.io/pod-name";

/// Annotation selecting the snapshot a new sandbox is restored from
pub const RESTORE_ANNOTATION: &str = "podsnapshot.gke.io/ps-name";

/// Label the controller puts on snapshots produced by a manual trigger
pub const TRIGGER_NAME_LABEL: &str = "podsnapshot.gke.io/trigger-name";

/// Label the controller puts on snapshots naming the owning policy
pub const POLICY_NAME_LABEL: &str = "podsnapshot.gke.io/policy-name";

/// Identifies a resource type on the orchestration API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl ResourceKind {
    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Fully qualified resource name as accepted by `kubectl get`
    pub fn qualified_plural(&self) -> String {
        if self.group.is_empty() {
            self.plural.to_string()
        } else {
            format!("{}.{}", self.plural, self.group)
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind)
    }
}

pub const POD_SNAPSHOT: ResourceKind = ResourceKind {
    group: PODSNAPSHOT_API_GROUP,
    version: PODSNAPSHOT_API_VERSION,
    kind: "PodSnapshot",
    plural: "podsnapshots",
};

pub const POD_SNAPSHOT_MANUAL_TRIGGER: ResourceKind = ResourceKind {
    group: PODSNAPSHOT_API_GROUP,
    version: PODSNAPSHOT_API_VERSION,
    kind: "PodSnapshotManualTrigger",
    plural: "podsnapshotmanualtriggers",
};

pub const POD_SNAPSHOT_POLICY: ResourceKind = ResourceKind {
    group: PODSNAPSHOT_API_GROUP,
    version: PODSNAPSHOT_API_VERSION,
    kind: "PodSnapshotPolicy",
    plural: "podsnapshotpolicies",
};

pub const POD_SNAPSHOT_STORAGE_CONFIG: ResourceKind = ResourceKind {
    group: PODSNAPSHOT_API_GROUP,
    version: PODSNAPSHOT_API_VERSION,
    kind: "PodSnapshotStorageConfig",
    plural: "podsnapshotstorageconfigs",
};

pub const SANDBOX: ResourceKind = ResourceKind {
    group: SANDBOX_API_GROUP,
    version: SANDBOX_API_VERSION,
    kind: "Sandbox",
    plural: "sandboxes",
};

pub const SANDBOX_CLAIM: ResourceKind = ResourceKind {
    group: CLAIM_API_GROUP,
    version: CLAIM_API_VERSION,
    kind: "SandboxClaim",
    plural: "sandboxclaims",
};

pub const SANDBOX_TEMPLATE: ResourceKind = ResourceKind {
    group: CLAIM_API_GROUP,
    version: CLAIM_API_VERSION,
    kind: "SandboxTemplate",
    plural: "sandboxtemplates",
};

pub const GATEWAY: ResourceKind = ResourceKind {
    group: GATEWAY_API_GROUP,
    version: GATEWAY_API_VERSION,
    kind: "Gateway",
    plural: "gateways",
};

pub const POD: ResourceKind = ResourceKind {
    group: "",
    version: "v1",
    kind: "Pod",
    plural: "pods",
};

/// A resource type with a static kind descriptor
pub trait Resource: Serialize + DeserializeOwned {
    const KIND: ResourceKind;

    fn metadata(&self) -> &ObjectMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// Standard object metadata
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Server-assigned unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn named<S1, S2>(name: S1, namespace: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }
}

/// A status condition as reported by a controller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status.eq_ignore_ascii_case("true")
    }
}

fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_.eq_ignore_ascii_case(type_))
}

// ---------------------------------------------------------------------------
// PodSnapshot
// ---------------------------------------------------------------------------

/// Lifecycle state of a snapshot record
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SnapshotPhase {
    #[default]
    Pending,
    Ready,
    Failed,
}

impl fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

impl SnapshotPhase {
    /// Known `status.phase` values; anything else is left to the conditions
    pub fn from_status(phase: &str) -> Option<Self> {
        match phase {
            "Pending" => Some(Self::Pending),
            "Ready" => Some(Self::Ready),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A checkpoint record created by the controller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PodSnapshot {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSnapshotSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodSnapshotStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSnapshotSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSnapshotStatus {
    /// Raw phase string; the controller may report phases this client does
    /// not model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PodSnapshot {
    /// Owning policy, from the spec or the controller's label
    pub fn policy_name(&self) -> Option<&str> {
        self.spec
            .policy_name
            .as_deref()
            .or_else(|| self.metadata.labels.get(POLICY_NAME_LABEL).map(String::as_str))
    }

    /// Trigger that produced this snapshot, if any
    pub fn trigger_name(&self) -> Option<&str> {
        self.spec
            .trigger_name
            .as_deref()
            .or_else(|| self.metadata.labels.get(TRIGGER_NAME_LABEL).map(String::as_str))
    }

    /// Lifecycle state
    ///
    /// A known `status.phase` wins; otherwise a `Failed=True` or
    /// `Ready=True` condition decides. Anything else is still pending.
    pub fn phase(&self) -> SnapshotPhase {
        let Some(status) = &self.status else {
            return SnapshotPhase::Pending;
        };
        if let Some(phase) = status.phase.as_deref().and_then(SnapshotPhase::from_status) {
            return phase;
        }
        if find_condition(&status.conditions, "Failed").is_some_and(Condition::is_true) {
            return SnapshotPhase::Failed;
        }
        match find_condition(&status.conditions, "Ready") {
            Some(c) if c.is_true() => SnapshotPhase::Ready,
            _ => SnapshotPhase::Pending,
        }
    }

    pub fn storage_location(&self) -> Option<&str> {
        self.status.as_ref()?.storage_location.as_deref()
    }
}

impl Resource for PodSnapshot {
    const KIND: ResourceKind = POD_SNAPSHOT;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// PodSnapshotManualTrigger
// ---------------------------------------------------------------------------

/// Lifecycle state of a manual trigger
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerPhase {
    #[default]
    Pending,
    Succeeded,
    Failed,
}

impl TriggerPhase {
    /// Known `status.phase` values; anything else is left to the conditions
    pub fn from_status(phase: &str) -> Option<Self> {
        match phase {
            "Pending" => Some(Self::Pending),
            "Succeeded" => Some(Self::Succeeded),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A request asking the controller to checkpoint a pod now
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PodSnapshotManualTrigger {
    pub metadata: ObjectMeta,
    pub spec: ManualTriggerSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ManualTriggerStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManualTriggerSpec {
    pub target_pod: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManualTriggerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Snapshot produced by this trigger once it succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PodSnapshotManualTrigger {
    pub fn new<S1, S2, S3>(name: S1, namespace: S2, target_pod: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            metadata: ObjectMeta::named(name, namespace),
            spec: ManualTriggerSpec {
                target_pod: target_pod.into(),
            },
            status: None,
        }
    }

    /// Lifecycle state, from `status.phase` or the `Complete`/`Failed`
    /// conditions
    pub fn phase(&self) -> TriggerPhase {
        let Some(status) = &self.status else {
            return TriggerPhase::Pending;
        };
        if let Some(phase) = status.phase.as_deref().and_then(TriggerPhase::from_status) {
            return phase;
        }
        if find_condition(&status.conditions, "Failed").is_some_and(Condition::is_true) {
            return TriggerPhase::Failed;
        }
        if find_condition(&status.conditions, "Complete").is_some_and(Condition::is_true) {
            return TriggerPhase::Succeeded;
        }
        TriggerPhase::Pending
    }

    /// Failure reason and message as reported by the controller
    pub fn failure(&self) -> (Option<String>, String) {
        let Some(status) = &self.status else {
            return (None, "no status reported".to_string());
        };
        let condition = find_condition(&status.conditions, "Failed");
        let reason = status
            .reason
            .clone()
            .or_else(|| condition.and_then(|c| c.reason.clone()));
        let message = status
            .message
            .clone()
            .or_else(|| condition.and_then(|c| c.message.clone()))
            .or_else(|| reason.clone())
            .unwrap_or_else(|| "no message reported".to_string());
        (reason, message)
    }

    pub fn snapshot_name(&self) -> Option<&str> {
        self.status.as_ref()?.snapshot_name.as_deref()
    }
}

impl Resource for PodSnapshotManualTrigger {
    const KIND: ResourceKind = POD_SNAPSHOT_MANUAL_TRIGGER;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// PodSnapshotPolicy / PodSnapshotStorageConfig
// ---------------------------------------------------------------------------

/// Label selector with `matchLabels` and `matchExpressions`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl LabelSelector {
    /// Kubernetes selector semantics: every requirement must hold; an empty
    /// selector matches everything. Unknown operators never match.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let labels_match = self
            .match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));

        labels_match
            && self.match_expressions.iter().all(|req| {
                let value = labels.get(&req.key);
                match req.operator.as_str() {
                    "In" => value.is_some_and(|v| req.values.contains(v)),
                    "NotIn" => value.is_none_or(|v| !req.values.contains(v)),
                    "Exists" => value.is_some(),
                    "DoesNotExist" => value.is_none(),
                    _ => false,
                }
            })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PodSnapshotPolicy {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSnapshotPolicySpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSnapshotPolicySpec {
    #[serde(default)]
    pub selector: LabelSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_config_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_config: Option<TriggerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionSpec>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_snapshots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_hours: Option<u32>,
}

impl Resource for PodSnapshotPolicy {
    const KIND: ResourceKind = POD_SNAPSHOT_POLICY;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PodSnapshotStorageConfig {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: StorageConfigSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsLocation>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GcsLocation {
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl PodSnapshotStorageConfig {
    /// Human readable storage location, e.g. `gs://bucket/path`
    pub fn location(&self) -> Option<String> {
        let gcs = self.spec.gcs.as_ref()?;
        Some(match &gcs.path {
            Some(path) => format!("gs://{}/{}", gcs.bucket, path.trim_start_matches('/')),
            None => format!("gs://{}", gcs.bucket),
        })
    }
}

impl Resource for PodSnapshotStorageConfig {
    const KIND: ResourceKind = POD_SNAPSHOT_STORAGE_CONFIG;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// Sandbox, SandboxClaim, SandboxTemplate
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sandbox {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SandboxStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Sandbox {
    pub fn pod_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(POD_NAME_ANNOTATION)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Usable once a pod is assigned and no `Ready=False` condition is set
    pub fn is_ready(&self) -> bool {
        if self.pod_name().is_none() {
            return false;
        }
        let conditions = self
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        find_condition(conditions, "Ready").is_none_or(Condition::is_true)
    }
}

impl Resource for Sandbox {
    const KIND: ResourceKind = SANDBOX;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SandboxClaim {
    pub metadata: ObjectMeta,
    pub spec: SandboxClaimSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SandboxClaimSpec {
    pub sandbox_template_ref: TemplateRef,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TemplateRef {
    pub name: String,
}

impl SandboxClaim {
    pub fn new<S1, S2, S3>(name: S1, namespace: S2, template_name: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            metadata: ObjectMeta::named(name, namespace),
            spec: SandboxClaimSpec {
                sandbox_template_ref: TemplateRef {
                    name: template_name.into(),
                },
            },
        }
    }
}

impl Resource for SandboxClaim {
    const KIND: ResourceKind = SANDBOX_CLAIM;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SandboxTemplate {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: SandboxTemplateSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SandboxTemplateSpec {
    #[serde(default)]
    pub pod_template: PodTemplate,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PodTemplate {
    #[serde(default)]
    pub metadata: PodTemplateMeta,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PodTemplateMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl SandboxTemplate {
    /// Labels stamped onto pods created from this template
    pub fn pod_labels(&self) -> &BTreeMap<String, String> {
        &self.spec.pod_template.metadata.labels
    }
}

impl Resource for SandboxTemplate {
    const KIND: ResourceKind = SANDBOX_TEMPLATE;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

// ---------------------------------------------------------------------------
// Pod, Gateway
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pod {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Pod {
    pub fn is_running(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Running")
    }

    /// False only when the pod explicitly reports `Ready=False`
    pub fn is_ready(&self) -> bool {
        let conditions = self
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        find_condition(conditions, "Ready").is_none_or(Condition::is_true)
    }
}

impl Resource for Pod {
    const KIND: ResourceKind = POD;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Gateway {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<GatewayStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct GatewayStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<GatewayAddress>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GatewayAddress {
    pub value: String,
}

impl Gateway {
    pub fn first_address(&self) -> Option<&str> {
        self.status
            .as_ref()?
            .addresses
            .iter()
            .map(|a| a.value.as_str())
            .find(|v| !v.is_empty())
    }
}

impl Resource for Gateway {
    const KIND: ResourceKind = GATEWAY;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}
