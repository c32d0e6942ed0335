//! Readiness polling for the managed broker cluster
//!
//! The poller is the only place that looks at a partially reconciled
//! cluster. Missing resources and API errors just mean "not ready yet";
//! only the overall timeout ends the wait with an error.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

use super::store::{secret_value, ClusterStore};
use crate::crd::strimzi::{KafkaStatus, ListenerStatus};
use crate::error::{Error, Result};
use crate::transport::KafkaConnection;

/// Keys of the credential secret the broker operator writes for a principal
pub const USER_CERT_KEY: &str = "user.crt";
pub const USER_KEY_KEY: &str = "user.key";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Ready=True reported by the broker operator
pub fn is_ready(status: &KafkaStatus) -> bool {
    status.conditions.iter().any(|c| {
        c.type_.as_deref() == Some("Ready") && c.status.as_deref() == Some("True")
    })
}

/// First listener exposing both a bootstrap address and a certificate
pub fn usable_listener(status: &KafkaStatus) -> Option<&ListenerStatus> {
    status.listeners.iter().find(|l| {
        l.bootstrap_servers.as_deref().is_some_and(|b| !b.is_empty())
            && l.certificates.iter().any(|c| !c.is_empty())
    })
}

/// Connection for a ready cluster, `None` while it is not usable
pub fn connection_from_status(
    status: &KafkaStatus,
    client_cert: &str,
    client_key: &str,
) -> Option<KafkaConnection> {
    if !is_ready(status) {
        return None;
    }
    let listener = usable_listener(status)?;
    Some(KafkaConnection {
        bootstrap_server: listener.bootstrap_servers.clone()?,
        cluster_id: status.cluster_id.clone(),
        ca_cert: listener.certificates.iter().find(|c| !c.is_empty())?.clone(),
        client_cert: client_cert.to_string(),
        client_key: client_key.to_string(),
    })
}

async fn check_connection(
    store: &dyn ClusterStore,
    cluster_name: &str,
    user_name: &str,
) -> Result<Option<KafkaConnection>> {
    let Some(status) = store.get_kafka(cluster_name).await?.and_then(|k| k.status) else {
        return Ok(None);
    };
    if !is_ready(&status) || usable_listener(&status).is_none() {
        return Ok(None);
    }

    // The user operator writes the principal's certificate once it is ready.
    let Some(secret) = store.get_secret(user_name).await? else {
        return Ok(None);
    };
    let (Some(cert), Some(key)) = (
        secret_value(&secret, USER_CERT_KEY)?,
        secret_value(&secret, USER_KEY_KEY)?,
    ) else {
        return Ok(None);
    };
    Ok(connection_from_status(&status, &cert, &key))
}

/// Poll until the cluster and the principal's credentials are usable
#[instrument(skip(store, options), fields(namespace = store.namespace()))]
pub async fn wait_for_connection(
    store: &dyn ClusterStore,
    cluster_name: &str,
    user_name: &str,
    options: ReadinessOptions,
) -> Result<KafkaConnection> {
    let poll = async {
        let mut ticker = tokio::time::interval(options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u64 = 0;
        loop {
            ticker.tick().await;
            attempts += 1;
            match check_connection(store, cluster_name, user_name).await {
                Ok(Some(connection)) => return (connection, attempts),
                Ok(None) => debug!("Kafka cluster {} not ready yet", cluster_name),
                Err(e) => debug!("Checking Kafka cluster {}: {}", cluster_name, e),
            }
        }
    };

    match tokio::time::timeout(options.timeout, poll).await {
        Ok((connection, attempts)) => {
            info!(
                "Kafka cluster {} is ready after {} attempt(s)",
                cluster_name, attempts
            );
            Ok(connection)
        }
        Err(_) => Err(Error::Timeout(format!(
            "Kafka cluster {} not ready within {:?}",
            cluster_name, options.timeout
        ))),
    }
}
