//! Broker metrics exposure
//!
//! The JMX exporter rules live in a ConfigMap referenced from the cluster's
//! `metricsConfig`; a PodMonitor (group `monitoring.coreos.com/v1`, no
//! typed bindings, so it goes through `DynamicObject`) scrapes the pods.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ObjectMeta};
use serde_json::json;
use tracing::{debug, instrument};

use super::store::{ClusterStore, FIELD_MANAGER};
use crate::error::Result;

pub const METRICS_CONFIG_MAP_NAME: &str = "kafka-metrics";
pub const METRICS_KAFKA_KEY: &str = "kafka-metrics-config.yml";
pub const METRICS_ZOOKEEPER_KEY: &str = "zookeeper-metrics-config.yml";
pub const POD_MONITOR_NAME: &str = "kafka-resources-metrics";

const KAFKA_METRICS_RULES: &str = r#"lowercaseOutputName: true
rules:
- pattern: kafka.server<type=(.+), name=(.+), clientId=(.+), topic=(.+), partition=(.*)><>Value
  name: kafka_server_$1_$2
  type: GAUGE
  labels:
    clientId: "$3"
    topic: "$4"
    partition: "$5"
- pattern: kafka.server<type=(.+), name=(.+), clientId=(.+), brokerHost=(.+), brokerPort=(.+)><>Value
  name: kafka_server_$1_$2
  type: GAUGE
  labels:
    clientId: "$3"
    broker: "$4:$5"
- pattern: kafka.(\w+)<type=(.+), name=(.+)PerSec\w*><>Count
  name: kafka_$1_$2_$3_total
  type: COUNTER
- pattern: kafka.(\w+)<type=(.+), name=(.+)><>Value
  name: kafka_$1_$2_$3
  type: GAUGE
"#;

const ZOOKEEPER_METRICS_RULES: &str = r#"lowercaseOutputName: true
rules:
- pattern: "org.apache.ZooKeeperService<name0=ReplicatedServer_id(\\d+)><>(\\w+)"
  name: "zookeeper_$2"
  type: GAUGE
- pattern: "org.apache.ZooKeeperService<name0=ReplicatedServer_id(\\d+), name1=replica.(\\d+), name2=(\\w+)><>(Packets\\w+)"
  name: "zookeeper_$4"
  type: COUNTER
  labels:
    replicaId: "$2"
    memberType: "$3"
"#;

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "app.kubernetes.io/managed-by".to_string(),
        FIELD_MANAGER.to_string(),
    )])
}

pub fn pod_monitor_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: "monitoring.coreos.com".to_string(),
        version: "v1".to_string(),
        kind: "PodMonitor".to_string(),
    })
}

pub fn build_metrics_config_map(namespace: &str, owner: Option<&OwnerReference>) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(METRICS_CONFIG_MAP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels()),
            owner_references: owner.map(|o| vec![o.clone()]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (METRICS_KAFKA_KEY.to_string(), KAFKA_METRICS_RULES.to_string()),
            (
                METRICS_ZOOKEEPER_KEY.to_string(),
                ZOOKEEPER_METRICS_RULES.to_string(),
            ),
        ])),
        ..Default::default()
    }
}

/// PodMonitor selecting every pod of the broker cluster
pub fn build_pod_monitor(
    namespace: &str,
    cluster_name: &str,
    owner: Option<&OwnerReference>,
) -> DynamicObject {
    let mut obj = DynamicObject::new(POD_MONITOR_NAME, &pod_monitor_api_resource());
    obj.metadata = ObjectMeta {
        name: Some(POD_MONITOR_NAME.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels()),
        owner_references: owner.map(|o| vec![o.clone()]),
        ..Default::default()
    };
    obj.data = json!({
        "spec": {
            "namespaceSelector": { "matchNames": [namespace] },
            "selector": {
                "matchExpressions": [{
                    "key": "strimzi.io/kind",
                    "operator": "In",
                    "values": ["Kafka"],
                }],
            },
            "podMetricsEndpoints": [{
                "path": "/metrics",
                "port": "tcp-prometheus",
                "relabelings": [{
                    "action": "replace",
                    "replacement": cluster_name,
                    "targetLabel": "kafka_cluster",
                }],
            }],
        }
    });
    obj
}

/// Apply the exporter rules and the PodMonitor
#[instrument(skip(store, owner), fields(namespace = store.namespace()))]
pub async fn ensure_metrics_resources(
    store: &dyn ClusterStore,
    cluster_name: &str,
    owner: Option<&OwnerReference>,
) -> Result<()> {
    let namespace = store.namespace().to_string();
    store
        .apply_config_map(&build_metrics_config_map(&namespace, owner))
        .await?;
    store
        .apply_dynamic(
            &build_pod_monitor(&namespace, cluster_name, owner),
            &pod_monitor_api_resource(),
        )
        .await?;
    debug!("Applied broker metrics resources in {}", namespace);
    Ok(())
}
