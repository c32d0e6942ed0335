//! Per-cluster topic derivation

use serde::{Deserialize, Serialize};

/// Topic carrying hub-to-spoke specs, shared by every managed cluster
pub const SPEC_TOPIC: &str = "spec";
/// Topic carrying spoke events, shared by every managed cluster
pub const EVENT_TOPIC: &str = "event";
/// Status topics are `status.<cluster>`
pub const STATUS_TOPIC_PREFIX: &str = "status.";
/// Matches every cluster's status topic
pub const STATUS_TOPIC_PATTERN: &str = "^status.*";

/// The topics used by one managed cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTopic {
    pub spec_topic: String,
    pub event_topic: String,
    pub status_topic: String,
    pub status_topic_pattern: String,
}

impl ClusterTopic {
    /// Topics owned by this cluster alone; the shared ones outlive it
    pub fn cluster_scoped(&self) -> Vec<&str> {
        vec![self.status_topic.as_str()]
    }

    /// Every distinct topic the cluster publishes to or reads from
    pub fn all(&self) -> Vec<&str> {
        vec![
            self.spec_topic.as_str(),
            self.event_topic.as_str(),
            self.status_topic.as_str(),
        ]
    }
}

/// Derive the topic set for `cluster_name`
pub fn generate_cluster_topic(cluster_name: &str) -> ClusterTopic {
    ClusterTopic {
        spec_topic: SPEC_TOPIC.to_string(),
        event_topic: EVENT_TOPIC.to_string(),
        status_topic: format!("{}{}", STATUS_TOPIC_PREFIX, cluster_name),
        status_topic_pattern: STATUS_TOPIC_PATTERN.to_string(),
    }
}

/// Literal prefix a wildcard pattern (`^status.*`) stands for, or `None`
/// when the pattern names a single topic.
pub fn status_topic_prefix(pattern: &str) -> Option<&str> {
    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    body.strip_suffix(".*")
        .or_else(|| body.strip_suffix('*'))
        .filter(|_| pattern.contains('*'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_cluster_topic() {
        let topics = generate_cluster_topic("hub1");
        assert_eq!(topics.spec_topic, "spec");
        assert_eq!(topics.event_topic, "event");
        assert_eq!(topics.status_topic, "status.hub1");
        assert_eq!(topics.status_topic_pattern, STATUS_TOPIC_PATTERN);
    }

    #[test]
    fn test_shared_topics_identical_across_clusters() {
        let a = generate_cluster_topic("hub1");
        let b = generate_cluster_topic("hub2");
        assert_eq!(a.spec_topic, b.spec_topic);
        assert_eq!(a.event_topic, b.event_topic);
        assert_ne!(a.status_topic, b.status_topic);
        assert_eq!(a, generate_cluster_topic("hub1"));
    }

    #[test]
    fn test_status_pattern_matches_status_topic() {
        let topics = generate_cluster_topic("hub1");
        let prefix = status_topic_prefix(&topics.status_topic_pattern).expect("wildcard");
        assert_eq!(prefix, "status");
        assert!(topics.status_topic.starts_with(prefix));
        assert!(!"spec".starts_with(prefix));
    }

    #[test]
    fn test_literal_topic_has_no_prefix() {
        assert_eq!(status_topic_prefix("spec"), None);
        assert_eq!(status_topic_prefix("status.hub1"), None);
    }

    #[test]
    fn test_cluster_scoped_topics() {
        let topics = generate_cluster_topic("hub1");
        assert_eq!(topics.cluster_scoped(), vec!["status.hub1"]);
        assert_eq!(topics.all().len(), 3);
    }
}
