//! Managed transport backed by a Strimzi broker cluster

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{info, instrument};

use super::kafka_cluster::{self, DesiredBrokerSpec};
use super::kafka_topic::{self, build_topic};
use super::kafka_user;
use super::metrics::ensure_metrics_resources;
use super::readiness::{wait_for_connection, ReadinessOptions};
use super::store::ClusterStore;
use super::subscription::ensure_subscription;
use crate::crd::MulticlusterGlobalHub;
use crate::error::Result;
use crate::transport::{
    ClusterTopic, KafkaConnection, TransportMode, Transporter, EVENT_TOPIC,
    GLOBAL_HUB_USER_NAME, SPEC_TOPIC, STATUS_TOPIC_PATTERN,
};

#[derive(Clone, Debug)]
pub struct ManagedOptions {
    /// Name of the `Kafka` resource
    pub cluster_name: String,
    pub community: bool,
    pub readiness: ReadinessOptions,
}

pub struct StrimziTransporter {
    store: Arc<dyn ClusterStore>,
    options: ManagedOptions,
}

fn owner_ref(hub: &MulticlusterGlobalHub) -> Option<OwnerReference> {
    hub.controller_owner_ref(&()).map(|mut r| {
        r.block_owner_deletion = Some(true);
        r
    })
}

impl StrimziTransporter {
    pub fn new(store: Arc<dyn ClusterStore>, options: ManagedOptions) -> Self {
        Self { store, options }
    }

    /// The hub's own principal writes specs and reads everything the
    /// clusters report back.
    async fn ensure_global_hub_user(&self, owner: Option<&OwnerReference>) -> Result<()> {
        let store = self.store.as_ref();
        kafka_user::create_and_update_user(
            store,
            &self.options.cluster_name,
            GLOBAL_HUB_USER_NAME,
            owner,
        )
        .await?;
        kafka_user::grant_write(store, GLOBAL_HUB_USER_NAME, SPEC_TOPIC).await?;
        kafka_user::grant_read(store, GLOBAL_HUB_USER_NAME, EVENT_TOPIC).await?;
        kafka_user::grant_read(store, GLOBAL_HUB_USER_NAME, STATUS_TOPIC_PATTERN).await
    }

    async fn ensure_shared_topics(&self, owner: Option<&OwnerReference>) -> Result<()> {
        for name in [SPEC_TOPIC, EVENT_TOPIC] {
            let topic = build_topic(
                self.store.namespace(),
                &self.options.cluster_name,
                name,
                owner,
            );
            self.store.apply_kafka_topic(&topic).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transporter for StrimziTransporter {
    fn mode(&self) -> TransportMode {
        TransportMode::Managed
    }

    #[instrument(skip(self, hub), fields(name = %hub.name_any(), cluster = %self.options.cluster_name))]
    async fn ensure_connection(&self, hub: &MulticlusterGlobalHub) -> Result<KafkaConnection> {
        let owner = owner_ref(hub);
        let store = self.store.as_ref();

        ensure_subscription(store, self.options.community, owner.as_ref()).await?;
        if hub.spec.enable_metrics {
            ensure_metrics_resources(store, &self.options.cluster_name, owner.as_ref()).await?;
        }

        if self.create_or_update_cluster(hub).await? {
            info!(
                "Kafka cluster {} changed, waiting for it to become ready",
                self.options.cluster_name
            );
        }
        self.ensure_global_hub_user(owner.as_ref()).await?;
        self.ensure_shared_topics(owner.as_ref()).await?;

        wait_for_connection(
            store,
            &self.options.cluster_name,
            GLOBAL_HUB_USER_NAME,
            self.options.readiness,
        )
        .await
    }

    async fn create_or_update_cluster(&self, hub: &MulticlusterGlobalHub) -> Result<bool> {
        let desired = DesiredBrokerSpec::from_hub(hub)?;
        kafka_cluster::create_or_update(
            self.store.as_ref(),
            &self.options.cluster_name,
            &desired,
            owner_ref(hub),
        )
        .await
    }

    async fn create_and_update_user(&self, user_name: &str) -> Result<()> {
        kafka_user::create_and_update_user(
            self.store.as_ref(),
            &self.options.cluster_name,
            user_name,
            None,
        )
        .await
    }

    async fn grant_read(&self, user_name: &str, topic_pattern: &str) -> Result<()> {
        kafka_user::grant_read(self.store.as_ref(), user_name, topic_pattern).await
    }

    async fn grant_write(&self, user_name: &str, topic_pattern: &str) -> Result<()> {
        kafka_user::grant_write(self.store.as_ref(), user_name, topic_pattern).await
    }

    async fn delete_user(&self, user_name: &str) -> Result<()> {
        kafka_user::delete_user(self.store.as_ref(), user_name).await
    }

    async fn create_and_update_topic(&self, topics: &ClusterTopic) -> Result<()> {
        kafka_topic::create_and_update_topic(
            self.store.as_ref(),
            &self.options.cluster_name,
            topics,
            None,
        )
        .await
    }

    async fn delete_topic(&self, topics: &ClusterTopic) -> Result<()> {
        kafka_topic::delete_topic(self.store.as_ref(), topics).await
    }
}
