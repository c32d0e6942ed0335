//! Shared types for the MulticlusterGlobalHub CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Compute resource requirements for a broker component
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceRequirements {
    /// Minimum resources requested
    #[serde(default)]
    pub requests: ResourceSpec,
    /// Maximum resources allowed
    #[serde(default)]
    pub limits: ResourceSpec,
}

/// Resource specification for CPU and memory
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ResourceSpec {
    /// CPU cores (e.g., "500m", "2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory (e.g., "1Gi", "4Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceSpec {
    pub fn new(cpu: &str, memory: &str) -> Self {
        Self {
            cpu: Some(cpu.to_string()),
            memory: Some(memory.to_string()),
        }
    }

    /// Iterate over the `(resource name, quantity)` pairs that are set
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [("cpu", self.cpu.as_deref()), ("memory", self.memory.as_deref())]
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
    }
}

/// Per-component overrides
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Advanced tuning for the managed broker cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedConfig {
    /// Resources for the brokers; also applied to the entity operator and,
    /// unless overridden, to the coordinator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka: Option<CommonSpec>,
    /// Coordinator (ZooKeeper) override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zookeeper: Option<CommonSpec>,
}

/// Broker storage type
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KafkaStorageType {
    Ephemeral,
    #[default]
    PersistentClaim,
}

impl std::fmt::Display for KafkaStorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KafkaStorageType::Ephemeral => write!(f, "ephemeral"),
            KafkaStorageType::PersistentClaim => write!(f, "persistent-claim"),
        }
    }
}

/// Broker storage configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KafkaStorageConfig {
    #[serde(default, rename = "type")]
    pub type_: KafkaStorageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Storage class name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl Default for KafkaStorageConfig {
    fn default() -> Self {
        Self {
            type_: KafkaStorageType::PersistentClaim,
            size: Some("10Gi".to_string()),
            class: None,
        }
    }
}

/// High-level broker cluster settings
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConfig {
    #[serde(default = "default_kafka_replicas")]
    pub replicas: i32,

    #[serde(default)]
    pub storage: KafkaStorageConfig,

    #[serde(default = "default_kafka_version")]
    pub version: String,

    /// Defaults to `min(replicas, 3)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_factor: Option<i32>,
}

impl KafkaConfig {
    pub fn effective_replication_factor(&self) -> i32 {
        self.replication_factor
            .unwrap_or_else(|| self.replicas.clamp(1, 3))
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            replicas: default_kafka_replicas(),
            storage: KafkaStorageConfig::default(),
            version: default_kafka_version(),
            replication_factor: None,
        }
    }
}

fn default_kafka_replicas() -> i32 {
    3
}

fn default_kafka_version() -> String {
    "3.7.0".to_string()
}

/// Status condition following Kubernetes conventions
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "TransportReady")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
}
