//! Main reconciler for MulticlusterGlobalHub resources
//!
//! Implements the controller pattern using kube-rs runtime. The watch loop
//! only starts or cancels per-hub background tasks; the transport work
//! itself runs in [`run_hub_task`].

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::Api,
    client::Client,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument};

use super::managed::ManagedOptions;
use super::readiness::ReadinessOptions;
use super::store::{ClusterStore, KubeStore};
use super::tasks::{run_hub_task, HubTasks};
use super::transport::{hub_key, TransportReconciler};
use crate::config::OperatorConfig;
use crate::crd::MulticlusterGlobalHub;
use crate::error::{Error, Result};
use crate::transport::ConnectionPublisher;

/// Finalizer that holds the hub until its transport task is stopped
pub const MULTICLUSTER_GLOBAL_HUB_FINALIZER: &str =
    "operator.open-cluster-management.io/transport-finalizer";

/// Periodic resync so a created or deleted transport secret is noticed
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub config: OperatorConfig,
    pub store: Arc<dyn ClusterStore>,
    pub transport: Arc<TransportReconciler>,
    pub tasks: HubTasks,
}

impl ControllerState {
    pub fn new(client: Client, config: OperatorConfig, publisher: Arc<ConnectionPublisher>) -> Self {
        let store: Arc<dyn ClusterStore> =
            Arc::new(KubeStore::new(client.clone(), config.namespace.clone()));
        let managed = ManagedOptions {
            cluster_name: config.kafka_cluster_name.clone(),
            community: config.community,
            readiness: ReadinessOptions {
                interval: config.readiness_interval(),
                timeout: config.readiness_timeout(),
            },
        };
        let transport = Arc::new(TransportReconciler::new(
            Arc::clone(&store),
            publisher,
            managed,
        ));

        Self {
            client,
            config,
            store,
            transport,
            tasks: HubTasks::new(),
        }
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let hubs: Api<MulticlusterGlobalHub> =
        Api::namespaced(state.client.clone(), &state.config.namespace);

    info!(
        "Starting MulticlusterGlobalHub controller in namespace {}",
        state.config.namespace
    );

    // Verify CRD exists
    match hubs.list(&Default::default()).await {
        Ok(_) => info!("MulticlusterGlobalHub CRD is available"),
        Err(e) => {
            error!(
                "MulticlusterGlobalHub CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError(
                "MulticlusterGlobalHub CRD not installed".to_string(),
            ));
        }
    }

    Controller::new(hubs, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::clone(&state))
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    info!("Controller stopped, cancelling transport tasks");
    state.tasks.shutdown();
    Ok(())
}

/// The main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<MulticlusterGlobalHub>, ctx: Arc<ControllerState>) -> Result<Action> {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<MulticlusterGlobalHub> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, MULTICLUSTER_GLOBAL_HUB_FINALIZER, obj, |event| async {
        match event {
            FinalizerEvent::Apply(hub) => apply_hub(&ctx, hub),
            FinalizerEvent::Cleanup(hub) => cleanup_hub(&ctx, &hub),
        }
    })
    .await
    .map_err(Error::from)
}

/// Make sure a transport task runs for the hub's current generation
fn apply_hub(ctx: &Arc<ControllerState>, hub: Arc<MulticlusterGlobalHub>) -> Result<Action> {
    let key = hub_key(&hub);
    let transport = Arc::clone(&ctx.transport);
    let store = Arc::clone(&ctx.store);
    let policy = ctx.config.retry_policy();
    let generation = hub.metadata.generation;

    let spawned = ctx.tasks.ensure(&key, generation, move |token| async move {
        run_hub_task(transport, store, policy, hub, token).await;
    });
    if spawned {
        info!("Started transport task for {} (generation {:?})", key, generation);
    } else {
        debug!("Transport task for {} already running", key);
    }

    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Stop the task and withdraw the connection if this hub published it;
/// owner references take care of the broker resources.
fn cleanup_hub(ctx: &ControllerState, hub: &MulticlusterGlobalHub) -> Result<Action> {
    let key = hub_key(hub);
    ctx.tasks.cancel(&key);
    ctx.transport.release(hub);
    info!("Cleaned up transport for {}", key);
    Ok(Action::await_change())
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(
    hub: Arc<MulticlusterGlobalHub>,
    error: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    error!("Reconciliation error for {}: {:?}", hub.name_any(), error);

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
