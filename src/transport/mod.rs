//! Transport-wide types shared by the reconciler and transport consumers
//!
//! The fixed names in this module are part of the wire contract with the
//! spoke clusters and must not change.

mod publisher;
mod topics;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crd::MulticlusterGlobalHub;
use crate::error::Result;

pub use publisher::ConnectionPublisher;
pub use topics::{
    generate_cluster_topic, status_topic_prefix, ClusterTopic, EVENT_TOPIC, SPEC_TOPIC,
    STATUS_TOPIC_PATTERN, STATUS_TOPIC_PREFIX,
};

/// Secret holding a user-supplied ("bring your own") broker connection
pub const TRANSPORT_SECRET_NAME: &str = "multicluster-global-hub-transport";

/// Keys of the BYO transport secret
pub const SECRET_KEY_BOOTSTRAP_SERVER: &str = "bootstrap_server";
pub const SECRET_KEY_CA_CERT: &str = "ca.crt";
pub const SECRET_KEY_CLIENT_CERT: &str = "client.crt";
pub const SECRET_KEY_CLIENT_KEY: &str = "client.key";
pub const SECRET_KEY_CLUSTER_ID: &str = "cluster_id";

/// Suffix appended to a managed cluster name to build its principal name
pub const USER_NAME_SUFFIX: &str = "kafka-user";

/// Principal used by the hub itself
pub const GLOBAL_HUB_USER_NAME: &str = "global-hub-kafka-user";

/// How the platform reaches its message broker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    #[default]
    Unset,
    /// Connection details supplied by the platform operator
    Byo,
    /// Broker cluster provisioned by this operator
    Managed,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Unset => write!(f, "Unset"),
            TransportMode::Byo => write!(f, "BYO"),
            TransportMode::Managed => write!(f, "Managed"),
        }
    }
}

/// Everything a producer or consumer needs to reach the broker
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConnection {
    pub bootstrap_server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

// Key material stays out of logs.
impl fmt::Debug for KafkaConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaConnection")
            .field("bootstrap_server", &self.bootstrap_server)
            .field("cluster_id", &self.cluster_id)
            .field("ca_cert", &format_args!("<{} bytes>", self.ca_cert.len()))
            .field("client_cert", &format_args!("<{} bytes>", self.client_cert.len()))
            .field("client_key", &"<redacted>")
            .finish()
    }
}

/// Build the principal name for a managed cluster: `<cluster>-kafka-user`
pub fn generate_user_name(cluster_name: &str) -> String {
    format!("{}-{}", cluster_name, USER_NAME_SUFFIX)
}

/// One transport variant (BYO or managed).
///
/// Both variants share the same contract so the top-level reconciler can
/// swap them when the mode flips.
#[async_trait]
pub trait Transporter: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Converge whatever the variant owns and return a usable connection
    async fn ensure_connection(&self, hub: &MulticlusterGlobalHub) -> Result<KafkaConnection>;

    /// Apply the desired broker cluster; `true` when an update was written
    async fn create_or_update_cluster(&self, hub: &MulticlusterGlobalHub) -> Result<bool>;

    fn generate_user_name(&self, cluster_name: &str) -> String {
        generate_user_name(cluster_name)
    }

    fn generate_cluster_topic(&self, cluster_name: &str) -> ClusterTopic {
        generate_cluster_topic(cluster_name)
    }

    async fn create_and_update_user(&self, user_name: &str) -> Result<()>;

    async fn grant_read(&self, user_name: &str, topic_pattern: &str) -> Result<()>;

    async fn grant_write(&self, user_name: &str, topic_pattern: &str) -> Result<()>;

    async fn delete_user(&self, user_name: &str) -> Result<()>;

    async fn create_and_update_topic(&self, topics: &ClusterTopic) -> Result<()>;

    async fn delete_topic(&self, topics: &ClusterTopic) -> Result<()>;
}
