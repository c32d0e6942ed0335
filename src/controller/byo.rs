//! Bring-your-own transport
//!
//! The connection comes straight from the transport secret. Nothing is
//! provisioned, so every principal, topic and cluster operation is a no-op.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::debug;

use super::store::{secret_value, ClusterStore};
use crate::crd::MulticlusterGlobalHub;
use crate::error::{Error, Result};
use crate::transport::{
    ClusterTopic, KafkaConnection, TransportMode, Transporter, SECRET_KEY_BOOTSTRAP_SERVER,
    SECRET_KEY_CA_CERT, SECRET_KEY_CLIENT_CERT, SECRET_KEY_CLIENT_KEY, SECRET_KEY_CLUSTER_ID,
    TRANSPORT_SECRET_NAME,
};

/// Parse a transport secret. Every key except the cluster id is required.
pub fn connection_from_secret(secret: &Secret) -> Result<KafkaConnection> {
    let required = |key: &str| -> Result<String> {
        secret_value(secret, key)?.ok_or_else(|| {
            Error::ConfigError(format!(
                "secret {} is missing required key {}",
                secret.name_any(),
                key
            ))
        })
    };

    Ok(KafkaConnection {
        bootstrap_server: required(SECRET_KEY_BOOTSTRAP_SERVER)?,
        cluster_id: secret_value(secret, SECRET_KEY_CLUSTER_ID)?,
        ca_cert: required(SECRET_KEY_CA_CERT)?,
        client_cert: required(SECRET_KEY_CLIENT_CERT)?,
        client_key: required(SECRET_KEY_CLIENT_KEY)?,
    })
}

pub struct ByoTransporter {
    store: Arc<dyn ClusterStore>,
}

impl ByoTransporter {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Transporter for ByoTransporter {
    fn mode(&self) -> TransportMode {
        TransportMode::Byo
    }

    async fn ensure_connection(&self, _hub: &MulticlusterGlobalHub) -> Result<KafkaConnection> {
        let secret = self
            .store
            .get_secret(TRANSPORT_SECRET_NAME)
            .await?
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "transport secret {}/{} not found",
                    self.store.namespace(),
                    TRANSPORT_SECRET_NAME
                ))
            })?;
        connection_from_secret(&secret)
    }

    async fn create_or_update_cluster(&self, _hub: &MulticlusterGlobalHub) -> Result<bool> {
        Ok(false)
    }

    async fn create_and_update_user(&self, user_name: &str) -> Result<()> {
        debug!("BYO transport: not creating user {}", user_name);
        Ok(())
    }

    async fn grant_read(&self, _user_name: &str, _topic_pattern: &str) -> Result<()> {
        Ok(())
    }

    async fn grant_write(&self, _user_name: &str, _topic_pattern: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_user(&self, _user_name: &str) -> Result<()> {
        Ok(())
    }

    async fn create_and_update_topic(&self, topics: &ClusterTopic) -> Result<()> {
        debug!("BYO transport: not creating topic {}", topics.status_topic);
        Ok(())
    }

    async fn delete_topic(&self, _topics: &ClusterTopic) -> Result<()> {
        Ok(())
    }
}
