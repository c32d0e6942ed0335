//! In-memory [`ClusterStore`] used by the unit tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::{ApiResource, DynamicObject, ObjectMeta};
use kube::ResourceExt;

use super::store::ClusterStore;
use crate::crd::strimzi::{KafkaCondition, KafkaStatus, ListenerStatus};
use crate::crd::{
    Kafka, KafkaTopic, KafkaUser, MulticlusterGlobalHub, MulticlusterGlobalHubSpec,
    MulticlusterGlobalHubStatus,
};
use crate::error::{Error, Result};

#[derive(Default)]
struct State {
    secrets: BTreeMap<String, Secret>,
    kafkas: BTreeMap<String, Kafka>,
    users: BTreeMap<String, KafkaUser>,
    topics: BTreeMap<String, KafkaTopic>,
    config_maps: BTreeMap<String, ConfigMap>,
    dynamic: BTreeMap<(String, String), DynamicObject>,
    hub_statuses: BTreeMap<String, MulticlusterGlobalHubStatus>,
    next_version: u64,
    kafka_creates: usize,
    kafka_replaces: usize,
    user_conflicts: u32,
    kafka_get_failures: u32,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

fn conflict(kind: &str, name: &str) -> Error {
    Error::Conflict(format!("{kind} {name}: the object has been modified"))
}

fn unavailable() -> Error {
    Error::KubeError(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "etcdserver: request timed out".to_string(),
        reason: "ServiceUnavailable".to_string(),
        code: 503,
    }))
}

pub struct MemoryStore {
    namespace: String,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("store lock")
    }

    pub fn insert_secret(&self, name: &str, data: &[(&str, &str)]) {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Default::default()
        };
        self.state().secrets.insert(name.to_string(), secret);
    }

    pub fn remove_secret(&self, name: &str) {
        self.state().secrets.remove(name);
    }

    pub fn kafka(&self, name: &str) -> Option<Kafka> {
        self.state().kafkas.get(name).cloned()
    }

    pub fn user(&self, name: &str) -> Option<KafkaUser> {
        self.state().users.get(name).cloned()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.state().topics.keys().cloned().collect()
    }

    pub fn config_map(&self, name: &str) -> Option<ConfigMap> {
        self.state().config_maps.get(name).cloned()
    }

    pub fn dynamic(&self, kind: &str, name: &str) -> Option<DynamicObject> {
        self.state()
            .dynamic
            .get(&(kind.to_string(), name.to_string()))
            .cloned()
    }

    pub fn hub_status(&self, name: &str) -> Option<MulticlusterGlobalHubStatus> {
        self.state().hub_statuses.get(name).cloned()
    }

    pub fn kafka_writes(&self) -> (usize, usize) {
        let state = self.state();
        (state.kafka_creates, state.kafka_replaces)
    }

    /// The next `n` user replaces fail with a conflict
    pub fn inject_user_conflicts(&self, n: u32) {
        self.state().user_conflicts = n;
    }

    /// The next `n` cluster reads fail with a transient API error
    pub fn inject_kafka_get_failures(&self, n: u32) {
        self.state().kafka_get_failures = n;
    }

    /// Simulate the broker operator reporting status
    pub fn set_kafka_status(&self, name: &str, status: KafkaStatus) {
        let mut state = self.state();
        if let Some(kafka) = state.kafkas.get_mut(name) {
            kafka.status = Some(status);
        }
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.state().secrets.get(name).cloned())
    }

    async fn get_kafka(&self, name: &str) -> Result<Option<Kafka>> {
        let mut state = self.state();
        if state.kafka_get_failures > 0 {
            state.kafka_get_failures -= 1;
            return Err(unavailable());
        }
        Ok(state.kafkas.get(name).cloned())
    }

    async fn create_kafka(&self, kafka: &Kafka) -> Result<Kafka> {
        let mut state = self.state();
        let name = kafka.name_any();
        if state.kafkas.contains_key(&name) {
            return Err(conflict("Kafka", &name));
        }
        let mut stored = kafka.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.kafka_creates += 1;
        state.kafkas.insert(name, stored.clone());
        Ok(stored)
    }

    async fn replace_kafka(&self, kafka: &Kafka) -> Result<Kafka> {
        let mut state = self.state();
        let name = kafka.name_any();
        let current = state
            .kafkas
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::ConfigError(format!("Kafka {name} not found")))?;
        if current.metadata.resource_version != kafka.metadata.resource_version {
            return Err(conflict("Kafka", &name));
        }
        let mut stored = kafka.clone();
        // Status is a subresource; a spec replace never changes it.
        stored.status = current.status;
        stored.metadata.resource_version = Some(state.bump());
        state.kafka_replaces += 1;
        state.kafkas.insert(name, stored.clone());
        Ok(stored)
    }

    async fn get_kafka_user(&self, name: &str) -> Result<Option<KafkaUser>> {
        Ok(self.state().users.get(name).cloned())
    }

    async fn create_kafka_user(&self, user: &KafkaUser) -> Result<KafkaUser> {
        let mut state = self.state();
        let name = user.name_any();
        if state.users.contains_key(&name) {
            return Err(conflict("KafkaUser", &name));
        }
        let mut stored = user.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.users.insert(name, stored.clone());
        Ok(stored)
    }

    async fn replace_kafka_user(&self, user: &KafkaUser) -> Result<KafkaUser> {
        let mut state = self.state();
        let name = user.name_any();
        if state.user_conflicts > 0 {
            state.user_conflicts -= 1;
            // Someone else wrote in between; bump the stored version.
            let version = state.bump();
            if let Some(current) = state.users.get_mut(&name) {
                current.metadata.resource_version = Some(version);
            }
            return Err(conflict("KafkaUser", &name));
        }
        let current_version = state
            .users
            .get(&name)
            .and_then(|u| u.metadata.resource_version.clone());
        if current_version.is_none() || current_version != user.metadata.resource_version {
            return Err(conflict("KafkaUser", &name));
        }
        let mut stored = user.clone();
        stored.metadata.resource_version = Some(state.bump());
        state.users.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_kafka_user(&self, name: &str) -> Result<()> {
        self.state().users.remove(name);
        Ok(())
    }

    async fn apply_kafka_topic(&self, topic: &KafkaTopic) -> Result<()> {
        self.state().topics.insert(topic.name_any(), topic.clone());
        Ok(())
    }

    async fn delete_kafka_topic(&self, name: &str) -> Result<()> {
        self.state().topics.remove(name);
        Ok(())
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.state()
            .config_maps
            .insert(config_map.name_any(), config_map.clone());
        Ok(())
    }

    async fn apply_dynamic(&self, object: &DynamicObject, resource: &ApiResource) -> Result<()> {
        self.state()
            .dynamic
            .insert((resource.kind.clone(), object.name_any()), object.clone());
        Ok(())
    }

    async fn patch_hub_status(
        &self,
        name: &str,
        status: &MulticlusterGlobalHubStatus,
    ) -> Result<()> {
        self.state()
            .hub_statuses
            .insert(name.to_string(), status.clone());
        Ok(())
    }
}

/// A hub with an ephemeral single-broker cluster
pub fn test_hub(name: &str, namespace: &str) -> MulticlusterGlobalHub {
    let mut spec = MulticlusterGlobalHubSpec::default();
    spec.kafka.replicas = 1;
    spec.kafka.storage.type_ = crate::crd::KafkaStorageType::Ephemeral;
    spec.kafka.storage.size = None;

    let mut hub = MulticlusterGlobalHub::new(name, spec);
    hub.metadata.namespace = Some(namespace.to_string());
    hub.metadata.uid = Some(format!("uid-{name}"));
    hub.metadata.generation = Some(1);
    hub
}

/// Status of a cluster that is ready and serves a TLS listener
pub fn ready_status() -> KafkaStatus {
    KafkaStatus {
        cluster_id: Some("MXpoZsJTRD2DDiVUh3Rsqg".to_string()),
        conditions: vec![KafkaCondition {
            type_: Some("Ready".to_string()),
            status: Some("True".to_string()),
            ..Default::default()
        }],
        listeners: vec![
            ListenerStatus {
                name: Some("plain".to_string()),
                bootstrap_servers: Some("kafka-kafka-bootstrap.ns.svc:9092".to_string()),
                certificates: vec![],
            },
            ListenerStatus {
                name: Some("tls".to_string()),
                bootstrap_servers: Some("kafka-kafka-bootstrap.ns.svc:9093".to_string()),
                certificates: vec!["cert".to_string()],
            },
        ],
    }
}
