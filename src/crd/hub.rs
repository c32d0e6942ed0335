//! MulticlusterGlobalHub Custom Resource Definition
//!
//! The platform's top-level configuration object. Only the fields the
//! transport layer consumes are modelled here.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Toleration;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    AdvancedConfig, Condition, KafkaConfig, KafkaStorageType, ResourceRequirements,
};
use crate::quantity::normalize_quantity;

/// Structured validation error for `MulticlusterGlobalHubSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
}

impl SpecValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operator.open-cluster-management.io",
    version = "v1alpha4",
    kind = "MulticlusterGlobalHub",
    namespaced,
    status = "MulticlusterGlobalHubStatus",
    shortname = "mgh",
    printcolumn = r#"{"name":"Transport","type":"string","jsonPath":".status.transportMode"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='TransportReady')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MulticlusterGlobalHubSpec {
    /// Image pull secret propagated to every broker pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub tolerations: Vec<Toleration>,

    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default)]
    pub kafka: KafkaConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_config: Option<AdvancedConfig>,
}

impl MulticlusterGlobalHubSpec {
    /// Validate the broker-related part of the spec
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.kafka.replicas < 1 {
            errors.push(SpecValidationError::new(
                "spec.kafka.replicas",
                "kafka.replicas must be at least 1",
            ));
        }

        let factor = self.kafka.effective_replication_factor();
        if factor < 1 || factor > self.kafka.replicas.max(1) {
            errors.push(SpecValidationError::new(
                "spec.kafka.replicationFactor",
                format!(
                    "replicationFactor {} must be between 1 and replicas ({})",
                    factor, self.kafka.replicas
                ),
            ));
        }

        if self.kafka.version.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.kafka.version",
                "kafka.version must not be empty",
            ));
        }

        if self.kafka.storage.type_ == KafkaStorageType::PersistentClaim {
            match self.kafka.storage.size.as_deref() {
                None | Some("") => errors.push(SpecValidationError::new(
                    "spec.kafka.storage.size",
                    "size is required for persistent-claim storage",
                )),
                Some(size) if normalize_quantity(size).is_none() => {
                    errors.push(SpecValidationError::new(
                        "spec.kafka.storage.size",
                        format!("invalid quantity {size:?}"),
                    ))
                }
                Some(_) => {}
            }
        }

        if let Some(advanced) = &self.advanced_config {
            let components = [
                ("kafka", advanced.kafka.as_ref()),
                ("zookeeper", advanced.zookeeper.as_ref()),
            ];
            for (component, common) in components {
                if let Some(resources) = common.and_then(|c| c.resources.as_ref()) {
                    validate_resources(
                        &format!("spec.advancedConfig.{component}.resources"),
                        resources,
                        &mut errors,
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The broker resources, fanned out to every sub-component
    pub fn kafka_resources(&self) -> Option<&ResourceRequirements> {
        self.advanced_config
            .as_ref()
            .and_then(|a| a.kafka.as_ref())
            .and_then(|c| c.resources.as_ref())
    }

    /// Coordinator override; falls back to the broker resources
    pub fn zookeeper_resources(&self) -> Option<&ResourceRequirements> {
        self.advanced_config
            .as_ref()
            .and_then(|a| a.zookeeper.as_ref())
            .and_then(|c| c.resources.as_ref())
            .or_else(|| self.kafka_resources())
    }
}

fn validate_resources(
    field: &str,
    resources: &ResourceRequirements,
    errors: &mut Vec<SpecValidationError>,
) {
    let sections = [
        ("requests", &resources.requests),
        ("limits", &resources.limits),
    ];
    for (section, spec) in sections {
        for (name, value) in spec.entries() {
            if normalize_quantity(value).is_none() {
                errors.push(SpecValidationError::new(
                    format!("{field}.{section}.{name}"),
                    format!("invalid quantity {value:?}"),
                ));
            }
        }
    }
}

/// Status reported on the MulticlusterGlobalHub
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MulticlusterGlobalHubStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_mode: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
