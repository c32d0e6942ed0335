//! Broker cluster spec reconciliation
//!
//! The desired [`KafkaSpec`] is recomputed from the hub on every pass and
//! compared field by field against the live resource. Set-valued fields
//! (tolerations, pull secrets, affinity terms) are compared as sets and
//! resource quantities by normalized value, so a cluster that is already
//! converged never gets rewritten.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{
    Affinity, LocalObjectReference, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, ResourceRequirements as K8sResources, Toleration,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use serde_json::json;
use tracing::{debug, info, instrument};

use super::metrics::{METRICS_CONFIG_MAP_NAME, METRICS_KAFKA_KEY, METRICS_ZOOKEEPER_KEY};
use super::store::ClusterStore;
use crate::crd::strimzi::{
    ComponentTemplate, ConfigMapKeyRef, EntityOperatorComponent, EntityOperatorSpec,
    GenericKafkaListener, KafkaAuthorization, KafkaClusterSpec, KafkaStorage,
    ListenerAuthentication, MetricsConfig, MetricsValueFrom, PodTemplate, ZookeeperClusterSpec,
};
use crate::crd::{
    Kafka, KafkaSpec, KafkaStorageConfig, KafkaStorageType, MulticlusterGlobalHub,
    ResourceRequirements,
};
use crate::error::{Error, Result};
use crate::quantity::resource_lists_equal;

pub const PLAIN_LISTENER_PORT: i32 = 9092;
pub const TLS_LISTENER_PORT: i32 = 9093;
pub const TLS_LISTENER_NAME: &str = "tls";

const DEFAULT_CPU_REQUEST: &str = "25m";
const DEFAULT_MEMORY_REQUEST: &str = "128Mi";

/// Broker cluster settings derived from the hub configuration
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredBrokerSpec {
    pub replicas: i32,
    pub storage: KafkaStorageConfig,
    pub version: String,
    pub replication_factor: i32,
    /// Applied to the brokers and the entity operator
    pub kafka_resources: K8sResources,
    pub zookeeper_resources: K8sResources,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
    pub image_pull_secrets: Vec<String>,
    pub metrics: bool,
}

impl DesiredBrokerSpec {
    /// Rejects a hub whose broker section fails validation
    pub fn from_hub(hub: &MulticlusterGlobalHub) -> Result<Self> {
        let spec = &hub.spec;
        spec.validate().map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Error::ValidationError(joined)
        })?;

        Ok(Self {
            replicas: spec.kafka.replicas,
            storage: spec.kafka.storage.clone(),
            version: spec.kafka.version.clone(),
            replication_factor: spec.kafka.effective_replication_factor(),
            kafka_resources: to_k8s_resources(spec.kafka_resources()),
            zookeeper_resources: to_k8s_resources(spec.zookeeper_resources()),
            node_selector: spec.node_selector.clone(),
            tolerations: spec.tolerations.clone(),
            image_pull_secrets: spec
                .image_pull_secret
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect(),
            metrics: spec.enable_metrics,
        })
    }

    /// Render the full cluster spec. `live_tolerations` are the tolerations
    /// currently applied; they are kept alongside the configured ones.
    pub fn render(&self, live_tolerations: &[Toleration]) -> KafkaSpec {
        let template = ComponentTemplate {
            pod: Some(PodTemplate {
                affinity: node_affinity(&self.node_selector),
                tolerations: merge_tolerations(&self.tolerations, live_tolerations),
                image_pull_secrets: self
                    .image_pull_secrets
                    .iter()
                    .map(|name| LocalObjectReference {
                        name: Some(name.clone()),
                    })
                    .collect(),
            }),
        };
        let storage = self.storage();

        KafkaSpec {
            kafka: KafkaClusterSpec {
                version: Some(self.version.clone()),
                replicas: self.replicas,
                listeners: listeners(),
                authorization: Some(KafkaAuthorization {
                    type_: "simple".to_string(),
                }),
                config: Some(self.broker_config()),
                storage: storage.clone(),
                resources: Some(self.kafka_resources.clone()),
                template: Some(template.clone()),
                metrics_config: self.metrics.then(|| metrics_config(METRICS_KAFKA_KEY)),
            },
            zookeeper: ZookeeperClusterSpec {
                replicas: self.replicas,
                storage,
                resources: Some(self.zookeeper_resources.clone()),
                template: Some(template.clone()),
                metrics_config: self.metrics.then(|| metrics_config(METRICS_ZOOKEEPER_KEY)),
            },
            entity_operator: Some(EntityOperatorSpec {
                topic_operator: Some(EntityOperatorComponent {
                    resources: Some(self.kafka_resources.clone()),
                }),
                user_operator: Some(EntityOperatorComponent {
                    resources: Some(self.kafka_resources.clone()),
                }),
                template: Some(template),
            }),
        }
    }

    fn storage(&self) -> KafkaStorage {
        match self.storage.type_ {
            KafkaStorageType::Ephemeral => KafkaStorage {
                type_: KafkaStorageType::Ephemeral.to_string(),
                ..Default::default()
            },
            KafkaStorageType::PersistentClaim => KafkaStorage {
                type_: KafkaStorageType::PersistentClaim.to_string(),
                size: self.storage.size.clone(),
                class: self.storage.class.clone(),
                delete_claim: Some(false),
            },
        }
    }

    fn broker_config(&self) -> serde_json::Map<String, serde_json::Value> {
        let factor = self.replication_factor;
        let min_insync = if factor > 1 { factor - 1 } else { 1 };
        let mut config = serde_json::Map::new();
        config.insert("default.replication.factor".to_string(), json!(factor));
        config.insert("offsets.topic.replication.factor".to_string(), json!(factor));
        config.insert(
            "transaction.state.log.replication.factor".to_string(),
            json!(factor),
        );
        config.insert(
            "transaction.state.log.min.isr".to_string(),
            json!(min_insync),
        );
        config.insert("min.insync.replicas".to_string(), json!(min_insync));
        config
    }
}

fn to_k8s_resources(resources: Option<&ResourceRequirements>) -> K8sResources {
    fn list(spec: &crate::crd::ResourceSpec) -> Option<BTreeMap<String, Quantity>> {
        let map: BTreeMap<String, Quantity> = spec
            .entries()
            .map(|(name, value)| (name.to_string(), Quantity(value.to_string())))
            .collect();
        (!map.is_empty()).then_some(map)
    }

    match resources {
        Some(r) => K8sResources {
            requests: list(&r.requests),
            limits: list(&r.limits),
            ..Default::default()
        },
        None => K8sResources {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(DEFAULT_CPU_REQUEST.to_string())),
                (
                    "memory".to_string(),
                    Quantity(DEFAULT_MEMORY_REQUEST.to_string()),
                ),
            ])),
            ..Default::default()
        },
    }
}

fn listeners() -> Vec<GenericKafkaListener> {
    vec![
        GenericKafkaListener {
            name: "plain".to_string(),
            port: PLAIN_LISTENER_PORT,
            type_: "internal".to_string(),
            tls: false,
            authentication: None,
        },
        GenericKafkaListener {
            name: TLS_LISTENER_NAME.to_string(),
            port: TLS_LISTENER_PORT,
            type_: "internal".to_string(),
            tls: true,
            authentication: Some(ListenerAuthentication {
                type_: "tls".to_string(),
            }),
        },
    ]
}

fn metrics_config(key: &str) -> MetricsConfig {
    MetricsConfig {
        type_: "jmxPrometheusExporter".to_string(),
        value_from: MetricsValueFrom {
            config_map_key_ref: ConfigMapKeyRef {
                name: METRICS_CONFIG_MAP_NAME.to_string(),
                key: key.to_string(),
            },
        },
    }
}

/// One required `In` expression per selector key, all in a single term so
/// every key must match.
fn node_affinity(node_selector: &BTreeMap<String, String>) -> Option<Affinity> {
    if node_selector.is_empty() {
        return None;
    }
    let match_expressions = node_selector
        .iter()
        .map(|(key, value)| NodeSelectorRequirement {
            key: key.clone(),
            operator: "In".to_string(),
            values: Some(vec![value.clone()]),
        })
        .collect();

    Some(Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(match_expressions),
                    match_fields: None,
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

type TolerationKey = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
);

fn toleration_key(t: &Toleration) -> TolerationKey {
    (
        t.key.clone(),
        t.operator.clone(),
        t.value.clone(),
        t.effect.clone(),
        t.toleration_seconds,
    )
}

/// Configured tolerations first, then live ones not configured, no duplicates
pub fn merge_tolerations(configured: &[Toleration], live: &[Toleration]) -> Vec<Toleration> {
    let mut seen = BTreeSet::new();
    configured
        .iter()
        .chain(live)
        .filter(|t| seen.insert(toleration_key(t)))
        .cloned()
        .collect()
}

fn tolerations_equal(a: &[Toleration], b: &[Toleration]) -> bool {
    let a: BTreeSet<_> = a.iter().map(toleration_key).collect();
    let b: BTreeSet<_> = b.iter().map(toleration_key).collect();
    a == b
}

fn pull_secrets_equal(a: &[LocalObjectReference], b: &[LocalObjectReference]) -> bool {
    let a: BTreeSet<_> = a.iter().filter_map(|r| r.name.as_deref()).collect();
    let b: BTreeSet<_> = b.iter().filter_map(|r| r.name.as_deref()).collect();
    a == b
}

type AffinityTerm = BTreeSet<(String, String, BTreeSet<String>)>;

fn affinity_terms(affinity: Option<&Affinity>) -> BTreeSet<AffinityTerm> {
    affinity
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|n| n.required_during_scheduling_ignored_during_execution.as_ref())
        .map(|selector| {
            selector
                .node_selector_terms
                .iter()
                .map(|term| {
                    term.match_expressions
                        .iter()
                        .flatten()
                        .map(|expr| {
                            (
                                expr.key.clone(),
                                expr.operator.clone(),
                                expr.values.iter().flatten().cloned().collect(),
                            )
                        })
                        .collect::<AffinityTerm>()
                })
                .filter(|term| !term.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn affinity_equal(a: Option<&Affinity>, b: Option<&Affinity>) -> bool {
    affinity_terms(a) == affinity_terms(b)
}

fn resources_equal(a: Option<&K8sResources>, b: Option<&K8sResources>) -> bool {
    let requests = |r: Option<&K8sResources>| r.and_then(|r| r.requests.as_ref()).cloned();
    let limits = |r: Option<&K8sResources>| r.and_then(|r| r.limits.as_ref()).cloned();
    resource_lists_equal(requests(a).as_ref(), requests(b).as_ref())
        && resource_lists_equal(limits(a).as_ref(), limits(b).as_ref())
}

fn templates_equal(a: Option<&ComponentTemplate>, b: Option<&ComponentTemplate>) -> bool {
    let empty = PodTemplate::default();
    let a = a.and_then(|t| t.pod.as_ref()).unwrap_or(&empty);
    let b = b.and_then(|t| t.pod.as_ref()).unwrap_or(&empty);

    affinity_equal(a.affinity.as_ref(), b.affinity.as_ref())
        && tolerations_equal(&a.tolerations, &b.tolerations)
        && pull_secrets_equal(&a.image_pull_secrets, &b.image_pull_secrets)
}

fn kafka_component_equal(live: &KafkaClusterSpec, desired: &KafkaClusterSpec) -> bool {
    live.version == desired.version
        && live.replicas == desired.replicas
        && live.listeners == desired.listeners
        && live.authorization == desired.authorization
        && live.config == desired.config
        && live.storage == desired.storage
        && live.metrics_config == desired.metrics_config
        && resources_equal(live.resources.as_ref(), desired.resources.as_ref())
        && templates_equal(live.template.as_ref(), desired.template.as_ref())
}

fn zookeeper_component_equal(live: &ZookeeperClusterSpec, desired: &ZookeeperClusterSpec) -> bool {
    live.replicas == desired.replicas
        && live.storage == desired.storage
        && live.metrics_config == desired.metrics_config
        && resources_equal(live.resources.as_ref(), desired.resources.as_ref())
        && templates_equal(live.template.as_ref(), desired.template.as_ref())
}

fn entity_operator_equal(
    live: Option<&EntityOperatorSpec>,
    desired: Option<&EntityOperatorSpec>,
) -> bool {
    let component_resources = |c: Option<&EntityOperatorComponent>| {
        c.and_then(|c| c.resources.as_ref()).cloned()
    };
    match (live, desired) {
        (None, None) => true,
        (Some(live), Some(desired)) => {
            live.topic_operator.is_some() == desired.topic_operator.is_some()
                && live.user_operator.is_some() == desired.user_operator.is_some()
                && resources_equal(
                    component_resources(live.topic_operator.as_ref()).as_ref(),
                    component_resources(desired.topic_operator.as_ref()).as_ref(),
                )
                && resources_equal(
                    component_resources(live.user_operator.as_ref()).as_ref(),
                    component_resources(desired.user_operator.as_ref()).as_ref(),
                )
                && templates_equal(live.template.as_ref(), desired.template.as_ref())
        }
        _ => false,
    }
}

/// `true` when every tracked field of `live` already matches `desired`
pub fn spec_matches(live: &KafkaSpec, desired: &KafkaSpec) -> bool {
    kafka_component_equal(&live.kafka, &desired.kafka)
        && zookeeper_component_equal(&live.zookeeper, &desired.zookeeper)
        && entity_operator_equal(live.entity_operator.as_ref(), desired.entity_operator.as_ref())
}

fn live_tolerations(spec: &KafkaSpec) -> Vec<Toleration> {
    let templates = [
        spec.kafka.template.as_ref(),
        spec.zookeeper.template.as_ref(),
        spec.entity_operator
            .as_ref()
            .and_then(|e| e.template.as_ref()),
    ];
    let all: Vec<Toleration> = templates
        .into_iter()
        .flatten()
        .filter_map(|t| t.pod.as_ref())
        .flat_map(|p| p.tolerations.iter().cloned())
        .collect();
    merge_tolerations(&[], &all)
}

/// Create the cluster when absent, otherwise rewrite it if it drifted.
/// Returns whether a write happened.
#[instrument(skip(store, desired, owner), fields(namespace = store.namespace()))]
pub async fn create_or_update(
    store: &dyn ClusterStore,
    name: &str,
    desired: &DesiredBrokerSpec,
    owner: Option<OwnerReference>,
) -> Result<bool> {
    let Some(live) = store.get_kafka(name).await? else {
        let kafka = Kafka {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(store.namespace().to_string()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".to_string(),
                    super::store::FIELD_MANAGER.to_string(),
                )])),
                owner_references: owner.map(|o| vec![o]),
                ..Default::default()
            },
            spec: desired.render(&[]),
            status: None,
        };
        store.create_kafka(&kafka).await?;
        info!("Created Kafka cluster {}/{}", store.namespace(), name);
        return Ok(true);
    };

    let spec = desired.render(&live_tolerations(&live.spec));
    if spec_matches(&live.spec, &spec) {
        debug!("Kafka cluster {} is up to date", name);
        return Ok(false);
    }

    let mut updated = live;
    updated.spec = spec;
    store.replace_kafka(&updated).await?;
    info!("Updated Kafka cluster {}/{}", store.namespace(), name);
    Ok(true)
}
