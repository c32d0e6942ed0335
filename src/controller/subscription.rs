//! OLM subscription for the broker operator
//!
//! The managed cluster needs the Strimzi operator (or its supported build,
//! AMQ Streams) installed before any `Kafka` resource is reconciled.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ObjectMeta};
use serde_json::json;
use tracing::{info, instrument};

use super::store::ClusterStore;
use crate::error::Result;

/// Object name of the subscription, whichever package it installs
pub const SUBSCRIPTION_NAME: &str = "strimzi-kafka-operator";

const SUBSCRIPTION_GROUP: &str = "operators.coreos.com";
const SUBSCRIPTION_VERSION: &str = "v1alpha1";
const SUBSCRIPTION_KIND: &str = "Subscription";
const CATALOG_SOURCE_NAMESPACE: &str = "openshift-marketplace";

/// Package, channel and catalog of the operator to install
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionSource {
    pub package: &'static str,
    pub channel: &'static str,
    pub catalog: &'static str,
}

impl SubscriptionSource {
    pub fn for_mode(community: bool) -> Self {
        if community {
            Self {
                package: "strimzi-kafka-operator",
                channel: "strimzi-0.40.x",
                catalog: "community-operators",
            }
        } else {
            Self {
                package: "amq-streams",
                channel: "amq-streams-2.7.x",
                catalog: "redhat-operators",
            }
        }
    }
}

pub fn subscription_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: SUBSCRIPTION_GROUP.to_string(),
        version: SUBSCRIPTION_VERSION.to_string(),
        kind: SUBSCRIPTION_KIND.to_string(),
    })
}

pub fn build_subscription(
    namespace: &str,
    source: &SubscriptionSource,
    owner: Option<&OwnerReference>,
) -> DynamicObject {
    let mut obj = DynamicObject::new(SUBSCRIPTION_NAME, &subscription_api_resource());
    obj.metadata = ObjectMeta {
        name: Some(SUBSCRIPTION_NAME.to_string()),
        namespace: Some(namespace.to_string()),
        owner_references: owner.map(|o| vec![o.clone()]),
        ..Default::default()
    };
    obj.data = json!({
        "spec": {
            "name": source.package,
            "channel": source.channel,
            "installPlanApproval": "Automatic",
            "source": source.catalog,
            "sourceNamespace": CATALOG_SOURCE_NAMESPACE,
        }
    });
    obj
}

#[instrument(skip(store, owner), fields(namespace = store.namespace()))]
pub async fn ensure_subscription(
    store: &dyn ClusterStore,
    community: bool,
    owner: Option<&OwnerReference>,
) -> Result<()> {
    let source = SubscriptionSource::for_mode(community);
    store
        .apply_dynamic(
            &build_subscription(store.namespace(), &source, owner),
            &subscription_api_resource(),
        )
        .await?;
    info!(
        "Applied {} subscription from {}",
        source.package, source.catalog
    );
    Ok(())
}
