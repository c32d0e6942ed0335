//! Background transport reconciliation, one task per hub
//!
//! Watch events only make sure a task is running for the hub's current
//! generation, so a long readiness wait never blocks event dispatch.
//! Every task hangs off one shutdown token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use kube::ResourceExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conditions::transport_status;
use super::retry::{run_until_success, RetryPolicy};
use super::store::ClusterStore;
use super::transport::TransportReconciler;
use crate::crd::{MulticlusterGlobalHub, MulticlusterGlobalHubStatus};
use crate::transport::TransportMode;

struct HubTask {
    generation: Option<i64>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct HubTasks {
    tasks: Mutex<HashMap<String, HubTask>>,
    shutdown: CancellationToken,
}

impl HubTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` for `key` unless one for the same generation is still
    /// running. A task for an older generation is cancelled first. Returns
    /// whether a task was spawned.
    pub fn ensure<F, Fut>(&self, key: &str, generation: Option<i64>, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = tasks.get(key) {
            if existing.generation == generation && !existing.handle.is_finished() {
                return false;
            }
            existing.token.cancel();
        }

        let token = self.shutdown.child_token();
        let handle = tokio::spawn(task(token.clone()));
        tasks.insert(
            key.to_string(),
            HubTask {
                generation,
                token,
                handle,
            },
        );
        true
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Cancel and forget the task for `key`
    pub fn cancel(&self, key: &str) {
        let removed = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if let Some(task) = removed {
            task.token.cancel();
            debug!("Cancelled transport task for {}", key);
        }
    }

    /// Cancel every task; no new task starts afterwards
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Reconcile the hub's transport until it succeeds or `token` is cancelled,
/// reporting every attempt on the hub status.
pub async fn run_hub_task(
    transport: Arc<TransportReconciler>,
    store: Arc<dyn ClusterStore>,
    policy: RetryPolicy,
    hub: Arc<MulticlusterGlobalHub>,
    token: CancellationToken,
) -> Option<TransportMode> {
    let name = hub.name_any();
    let last_status: Mutex<Option<MulticlusterGlobalHubStatus>> = Mutex::new(hub.status.clone());

    let transport = transport.as_ref();
    let store = store.as_ref();
    let hub = hub.as_ref();
    let last = &last_status;
    let name_ref = name.as_str();

    let mode = run_until_success(&policy, "transport-reconcile", &token, || async move {
        let outcome = transport.reconcile(hub).await;
        let next = {
            let previous = last.lock().unwrap_or_else(PoisonError::into_inner);
            transport_status(previous.as_ref(), hub.metadata.generation, &outcome)
        };
        if let Err(e) = store.patch_hub_status(name_ref, &next).await {
            warn!("Failed to update status of {}: {}", name_ref, e);
        }
        *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(next);
        outcome
    })
    .await;

    match mode {
        Some(mode) => info!("Transport for {} is ready in {} mode", name, mode),
        None => debug!("Transport task for {} cancelled", name),
    }
    mode
}
