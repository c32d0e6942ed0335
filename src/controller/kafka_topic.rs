//! Topic provisioning for managed clusters
//!
//! Replicas are left to the broker's `default.replication.factor`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use tracing::{debug, instrument};

use super::store::ClusterStore;
use crate::crd::strimzi::STRIMZI_CLUSTER_LABEL;
use crate::crd::{KafkaTopic, KafkaTopicSpec};
use crate::error::Result;
use crate::transport::ClusterTopic;

const TOPIC_PARTITIONS: i32 = 1;

pub fn build_topic(
    namespace: &str,
    cluster_name: &str,
    topic_name: &str,
    owner: Option<&OwnerReference>,
) -> KafkaTopic {
    KafkaTopic {
        metadata: ObjectMeta {
            name: Some(topic_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                STRIMZI_CLUSTER_LABEL.to_string(),
                cluster_name.to_string(),
            )])),
            owner_references: owner.map(|o| vec![o.clone()]),
            ..Default::default()
        },
        spec: KafkaTopicSpec {
            topic_name: Some(topic_name.to_string()),
            partitions: Some(TOPIC_PARTITIONS),
            replicas: None,
            config: None,
        },
    }
}

/// Apply every topic in the set; shared topics are applied too so a fresh
/// cluster gets them on its first tenant.
#[instrument(skip(store, topics, owner), fields(namespace = store.namespace(), status_topic = %topics.status_topic))]
pub async fn create_and_update_topic(
    store: &dyn ClusterStore,
    cluster_name: &str,
    topics: &ClusterTopic,
    owner: Option<&OwnerReference>,
) -> Result<()> {
    for name in topics.all() {
        let topic = build_topic(store.namespace(), cluster_name, name, owner);
        store.apply_kafka_topic(&topic).await?;
        debug!("Applied KafkaTopic {}", name);
    }
    Ok(())
}

/// Remove the topics owned by this tenant alone
pub async fn delete_topic(store: &dyn ClusterStore, topics: &ClusterTopic) -> Result<()> {
    for name in topics.cluster_scoped() {
        store.delete_kafka_topic(name).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::MemoryStore;
    use crate::transport::generate_cluster_topic;

    #[tokio::test]
    async fn test_topics_are_applied_idempotently() {
        let store = MemoryStore::new("hub");
        let topics = generate_cluster_topic("hub1");
        create_and_update_topic(&store, "kafka", &topics, None)
            .await
            .expect("apply");
        create_and_update_topic(&store, "kafka", &topics, None)
            .await
            .expect("apply again");

        assert_eq!(
            store.topic_names(),
            vec![
                "event".to_string(),
                "spec".to_string(),
                "status.hub1".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_keeps_shared_topics() {
        let store = MemoryStore::new("hub");
        let hub1 = generate_cluster_topic("hub1");
        let hub2 = generate_cluster_topic("hub2");
        create_and_update_topic(&store, "kafka", &hub1, None)
            .await
            .expect("apply hub1");
        create_and_update_topic(&store, "kafka", &hub2, None)
            .await
            .expect("apply hub2");

        delete_topic(&store, &hub1).await.expect("delete");
        delete_topic(&store, &hub1).await.expect("delete again");
        assert_eq!(
            store.topic_names(),
            vec![
                "event".to_string(),
                "spec".to_string(),
                "status.hub2".to_string()
            ]
        );
    }

    #[test]
    fn test_topic_is_bound_to_cluster() {
        let topic = build_topic("hub", "kafka", "spec", None);
        assert_eq!(
            topic
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(STRIMZI_CLUSTER_LABEL))
                .map(String::as_str),
            Some("kafka")
        );
        assert_eq!(topic.spec.topic_name.as_deref(), Some("spec"));
        assert_eq!(topic.spec.replicas, None);
    }
}
