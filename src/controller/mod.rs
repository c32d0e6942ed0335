//! Controller module for MulticlusterGlobalHub reconciliation
//! This module contains the controller loop, the transport reconciliation
//! engine and the broker resources it manages.

pub mod byo;
pub mod conditions;
pub mod kafka_cluster;
pub mod kafka_topic;
pub mod kafka_user;
pub mod managed;
pub mod metrics;
pub mod readiness;
mod reconciler;
pub mod retry;
pub mod store;
pub mod subscription;
mod tasks;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;
#[cfg(test)]
mod transport_test;

pub use byo::ByoTransporter;
pub use kafka_cluster::DesiredBrokerSpec;
pub use managed::{ManagedOptions, StrimziTransporter};
pub use readiness::ReadinessOptions;
pub use reconciler::{run_controller, ControllerState, MULTICLUSTER_GLOBAL_HUB_FINALIZER};
pub use retry::RetryPolicy;
pub use store::{ClusterStore, KubeStore};
pub use tasks::{run_hub_task, HubTasks};
pub use transport::TransportReconciler;
