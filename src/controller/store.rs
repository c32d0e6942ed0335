//! Access to the external resources the transport layer drives
//!
//! Every read and write of broker resources goes through [`ClusterStore`] so
//! the reconciliation logic can run against the API server in production
//! and against an in-memory store in tests. A store is bound to one
//! namespace.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, Patch, PatchParams, PostParams,
};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use crate::crd::{Kafka, KafkaTopic, KafkaUser, MulticlusterGlobalHub, MulticlusterGlobalHubStatus};
use crate::error::{Error, Result};

pub const FIELD_MANAGER: &str = "transport-operator";

#[async_trait]
pub trait ClusterStore: Send + Sync {
    fn namespace(&self) -> &str;

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>>;

    async fn get_kafka(&self, name: &str) -> Result<Option<Kafka>>;

    async fn create_kafka(&self, kafka: &Kafka) -> Result<Kafka>;

    /// Replace the spec of an existing cluster. Fails with
    /// [`Error::Conflict`] if `kafka` carries a stale resource version.
    async fn replace_kafka(&self, kafka: &Kafka) -> Result<Kafka>;

    async fn get_kafka_user(&self, name: &str) -> Result<Option<KafkaUser>>;

    /// Fails with [`Error::Conflict`] when the user already exists
    async fn create_kafka_user(&self, user: &KafkaUser) -> Result<KafkaUser>;

    async fn replace_kafka_user(&self, user: &KafkaUser) -> Result<KafkaUser>;

    /// Deleting a missing user succeeds
    async fn delete_kafka_user(&self, name: &str) -> Result<()>;

    async fn apply_kafka_topic(&self, topic: &KafkaTopic) -> Result<()>;

    /// Deleting a missing topic succeeds
    async fn delete_kafka_topic(&self, name: &str) -> Result<()>;

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    /// Server-side apply of a resource without typed bindings
    async fn apply_dynamic(&self, object: &DynamicObject, resource: &ApiResource) -> Result<()>;

    /// Merge-patch the status subresource of a hub in the store's namespace
    async fn patch_hub_status(
        &self,
        name: &str,
        status: &MulticlusterGlobalHubStatus,
    ) -> Result<()>;
}

/// Value of `key` in `secret` as UTF-8. `Ok(None)` when the key is absent
/// or empty.
pub fn secret_value(secret: &Secret, key: &str) -> Result<Option<String>> {
    let Some(bytes) = secret.data.as_ref().and_then(|d| d.get(key)) else {
        return Ok(None);
    };
    let value = String::from_utf8(bytes.0.clone()).map_err(|_| {
        Error::ConfigError(format!(
            "key {} of secret {} is not valid UTF-8",
            key,
            secret.name_any()
        ))
    })?;
    Ok((!value.is_empty()).then_some(value))
}

/// [`ClusterStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    namespace: String,
}

impl KubeStore {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// Map 409 to [`Error::Conflict`], everything else to [`Error::KubeError`]
fn write_error(kind: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(e) if e.code == 409 => {
            Error::Conflict(format!("{} {}: {}", kind, name, e.message))
        }
        other => Error::KubeError(other),
    }
}

async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::KubeError(e)),
    }
}

async fn delete_ignoring_missing<K>(api: &Api<K>, kind: &str, name: &str) -> Result<()>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => info!("Deleted {} {}", kind, name),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            debug!("{} {} not found, already deleted", kind, name);
        }
        Err(e) => return Err(Error::KubeError(e)),
    }
    Ok(())
}

#[async_trait]
impl ClusterStore for KubeStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>> {
        get_opt(&self.api::<Secret>(), name).await
    }

    async fn get_kafka(&self, name: &str) -> Result<Option<Kafka>> {
        get_opt(&self.api::<Kafka>(), name).await
    }

    async fn create_kafka(&self, kafka: &Kafka) -> Result<Kafka> {
        self.api::<Kafka>()
            .create(&PostParams::default(), kafka)
            .await
            .map_err(|e| write_error("Kafka", &kafka.name_any(), e))
    }

    async fn replace_kafka(&self, kafka: &Kafka) -> Result<Kafka> {
        let name = kafka.name_any();
        self.api::<Kafka>()
            .replace(&name, &PostParams::default(), kafka)
            .await
            .map_err(|e| write_error("Kafka", &name, e))
    }

    async fn get_kafka_user(&self, name: &str) -> Result<Option<KafkaUser>> {
        get_opt(&self.api::<KafkaUser>(), name).await
    }

    async fn create_kafka_user(&self, user: &KafkaUser) -> Result<KafkaUser> {
        self.api::<KafkaUser>()
            .create(&PostParams::default(), user)
            .await
            .map_err(|e| write_error("KafkaUser", &user.name_any(), e))
    }

    async fn replace_kafka_user(&self, user: &KafkaUser) -> Result<KafkaUser> {
        let name = user.name_any();
        self.api::<KafkaUser>()
            .replace(&name, &PostParams::default(), user)
            .await
            .map_err(|e| write_error("KafkaUser", &name, e))
    }

    async fn delete_kafka_user(&self, name: &str) -> Result<()> {
        delete_ignoring_missing(&self.api::<KafkaUser>(), "KafkaUser", name).await
    }

    async fn apply_kafka_topic(&self, topic: &KafkaTopic) -> Result<()> {
        let name = topic.name_any();
        self.api::<KafkaTopic>()
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(topic),
            )
            .await
            .map_err(|e| write_error("KafkaTopic", &name, e))?;
        Ok(())
    }

    async fn delete_kafka_topic(&self, name: &str) -> Result<()> {
        delete_ignoring_missing(&self.api::<KafkaTopic>(), "KafkaTopic", name).await
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let name = config_map.name_any();
        self.api::<ConfigMap>()
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(config_map),
            )
            .await
            .map_err(|e| write_error("ConfigMap", &name, e))?;
        Ok(())
    }

    async fn apply_dynamic(&self, object: &DynamicObject, resource: &ApiResource) -> Result<()> {
        let name = object.name_any();
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &self.namespace, resource);
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(object),
        )
        .await
        .map_err(|e| write_error(&resource.kind, &name, e))?;
        Ok(())
    }

    async fn patch_hub_status(
        &self,
        name: &str,
        status: &MulticlusterGlobalHubStatus,
    ) -> Result<()> {
        let patch = serde_json::json!({ "status": status });
        self.api::<MulticlusterGlobalHub>()
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| write_error("MulticlusterGlobalHub", name, e))?;
        Ok(())
    }
}
