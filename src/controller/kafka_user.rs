//! Principals and their ACL grants
//!
//! Grants are read-modify-write on the `KafkaUser` resource. A grant that
//! is already present is never appended again, and optimistic-concurrency
//! conflicts are retried a bounded number of times.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use tracing::{debug, info, instrument, warn};

use super::store::ClusterStore;
use crate::crd::strimzi::{
    AclOperation, AclPatternType, AclResource, AclResourceType, AclRule, UserAuthentication,
    UserAuthorization, STRIMZI_CLUSTER_LABEL,
};
use crate::crd::{KafkaUser, KafkaUserSpec};
use crate::error::{Error, Result};
use crate::transport::status_topic_prefix;

/// Retries after the first attempt when a grant hits a write conflict
pub const MAX_CONFLICT_RETRIES: u32 = 3;

const ALL_HOSTS: &str = "*";
const ALL_GROUPS: &str = "*";

fn topic_resource(topic_pattern: &str) -> AclResource {
    match status_topic_prefix(topic_pattern) {
        Some(prefix) => AclResource {
            type_: AclResourceType::Topic,
            name: Some(prefix.to_string()),
            pattern_type: Some(AclPatternType::Prefix),
        },
        None => AclResource {
            type_: AclResourceType::Topic,
            name: Some(topic_pattern.to_string()),
            pattern_type: Some(AclPatternType::Literal),
        },
    }
}

fn rule(resource: AclResource, operation: AclOperation) -> AclRule {
    AclRule {
        resource,
        operations: vec![operation],
        host: Some(ALL_HOSTS.to_string()),
    }
}

/// Read on the topic plus read on any consumer group
pub fn read_rules(topic_pattern: &str) -> Vec<AclRule> {
    vec![
        rule(topic_resource(topic_pattern), AclOperation::Read),
        rule(
            AclResource {
                type_: AclResourceType::Group,
                name: Some(ALL_GROUPS.to_string()),
                pattern_type: Some(AclPatternType::Literal),
            },
            AclOperation::Read,
        ),
    ]
}

pub fn write_rules(topic_pattern: &str) -> Vec<AclRule> {
    vec![rule(topic_resource(topic_pattern), AclOperation::Write)]
}

fn same_grant(a: &AclRule, b: &AclRule) -> bool {
    let ops = |r: &AclRule| {
        let mut ops = r.operations.clone();
        ops.sort();
        ops.dedup();
        ops
    };
    a.resource == b.resource && ops(a) == ops(b)
}

fn new_user(
    namespace: &str,
    cluster_name: &str,
    user_name: &str,
    owner: Option<&OwnerReference>,
) -> KafkaUser {
    KafkaUser {
        metadata: ObjectMeta {
            name: Some(user_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                STRIMZI_CLUSTER_LABEL.to_string(),
                cluster_name.to_string(),
            )])),
            owner_references: owner.map(|o| vec![o.clone()]),
            ..Default::default()
        },
        spec: KafkaUserSpec {
            authentication: Some(UserAuthentication {
                type_: "tls".to_string(),
            }),
            authorization: Some(UserAuthorization {
                type_: "simple".to_string(),
                acls: Vec::new(),
            }),
        },
    }
}

/// Create the principal if it does not exist yet
#[instrument(skip(store, owner), fields(namespace = store.namespace()))]
pub async fn create_and_update_user(
    store: &dyn ClusterStore,
    cluster_name: &str,
    user_name: &str,
    owner: Option<&OwnerReference>,
) -> Result<()> {
    if store.get_kafka_user(user_name).await?.is_some() {
        debug!("KafkaUser {} already exists", user_name);
        return Ok(());
    }

    let user = new_user(store.namespace(), cluster_name, user_name, owner);
    match store.create_kafka_user(&user).await {
        Ok(_) => {
            info!("Created KafkaUser {}/{}", store.namespace(), user_name);
            Ok(())
        }
        // Lost a create race; the user exists now.
        Err(Error::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Append every rule the principal does not already hold
pub async fn grant(store: &dyn ClusterStore, user_name: &str, rules: &[AclRule]) -> Result<()> {
    let mut attempt = 0;
    loop {
        let mut user = store.get_kafka_user(user_name).await?.ok_or_else(|| {
            Error::ConfigError(format!("KafkaUser {user_name} does not exist"))
        })?;

        let authorization = user
            .spec
            .authorization
            .get_or_insert_with(|| UserAuthorization {
                type_: "simple".to_string(),
                acls: Vec::new(),
            });
        let missing: Vec<AclRule> = rules
            .iter()
            .filter(|r| !authorization.acls.iter().any(|a| same_grant(a, r)))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let added = missing.len();
        authorization.acls.extend(missing);

        match store.replace_kafka_user(&user).await {
            Ok(_) => {
                debug!("Granted {} ACL(s) to {}", added, user_name);
                return Ok(());
            }
            Err(Error::Conflict(msg)) if attempt < MAX_CONFLICT_RETRIES => {
                attempt += 1;
                warn!(
                    "Conflict granting ACLs to {} (attempt {}): {}",
                    user_name, attempt, msg
                );
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn grant_read(store: &dyn ClusterStore, user_name: &str, topic_pattern: &str) -> Result<()> {
    grant(store, user_name, &read_rules(topic_pattern)).await
}

pub async fn grant_write(
    store: &dyn ClusterStore,
    user_name: &str,
    topic_pattern: &str,
) -> Result<()> {
    grant(store, user_name, &write_rules(topic_pattern)).await
}

pub async fn delete_user(store: &dyn ClusterStore, user_name: &str) -> Result<()> {
    store.delete_kafka_user(user_name).await
}
