//! Transport mode selection and connection publishing
//!
//! A present transport secret selects BYO; otherwise the operator manages
//! the broker itself. The selected mode is published as soon as it is known
//! and the active [`Transporter`] is swapped when it flips. A connection is
//! only replaced after the selected variant produced a usable one.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use kube::ResourceExt;
use tracing::{info, instrument};

use super::byo::ByoTransporter;
use super::managed::{ManagedOptions, StrimziTransporter};
use super::store::ClusterStore;
use crate::crd::MulticlusterGlobalHub;
use crate::error::Result;
use crate::transport::{ConnectionPublisher, TransportMode, Transporter, TRANSPORT_SECRET_NAME};

/// `<namespace>/<name>` of a hub
pub fn hub_key(hub: &MulticlusterGlobalHub) -> String {
    format!(
        "{}/{}",
        hub.namespace().unwrap_or_else(|| "default".to_string()),
        hub.name_any()
    )
}

pub struct TransportReconciler {
    store: Arc<dyn ClusterStore>,
    publisher: Arc<ConnectionPublisher>,
    managed: ManagedOptions,
    active: RwLock<Option<Arc<dyn Transporter>>>,
    /// Hub whose reconciliation published the current connection
    published_by: Mutex<Option<String>>,
}

impl TransportReconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        publisher: Arc<ConnectionPublisher>,
        managed: ManagedOptions,
    ) -> Self {
        Self {
            store,
            publisher,
            managed,
            active: RwLock::new(None),
            published_by: Mutex::new(None),
        }
    }

    pub fn publisher(&self) -> &Arc<ConnectionPublisher> {
        &self.publisher
    }

    /// The variant selected by the last reconciliation
    pub fn active(&self) -> Option<Arc<dyn Transporter>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn select_mode(&self) -> Result<TransportMode> {
        let secret = self.store.get_secret(TRANSPORT_SECRET_NAME).await?;
        Ok(if secret.is_some() {
            TransportMode::Byo
        } else {
            TransportMode::Managed
        })
    }

    fn transporter_for(&self, mode: TransportMode) -> Arc<dyn Transporter> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = active.as_ref().filter(|t| t.mode() == mode) {
            return Arc::clone(current);
        }

        let transporter: Arc<dyn Transporter> = match mode {
            TransportMode::Byo => Arc::new(ByoTransporter::new(Arc::clone(&self.store))),
            _ => Arc::new(StrimziTransporter::new(
                Arc::clone(&self.store),
                self.managed.clone(),
            )),
        };
        *active = Some(Arc::clone(&transporter));
        transporter
    }

    /// One complete convergence attempt. Safe to call repeatedly and
    /// concurrently; every step underneath is idempotent.
    #[instrument(skip(self, hub), fields(name = %hub.name_any(), namespace = hub.namespace()))]
    pub async fn reconcile(&self, hub: &MulticlusterGlobalHub) -> Result<TransportMode> {
        let mode = self.select_mode().await?;
        // Consumers learn the selected mode right away; the connection of
        // the previous attempt stays until this one produces a new one.
        self.publisher.set_mode(mode);

        let transporter = self.transporter_for(mode);
        let connection = transporter.ensure_connection(hub).await?;

        let mut published_by = self
            .published_by
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.publisher.publish(mode, connection);
        *published_by = Some(hub_key(hub));
        Ok(mode)
    }

    /// Withdraw the published connection if `hub` published it. Returns
    /// whether the publisher was reset.
    pub fn release(&self, hub: &MulticlusterGlobalHub) -> bool {
        let mut published_by = self
            .published_by
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if published_by.as_deref() != Some(hub_key(hub).as_str()) {
            return false;
        }
        self.publisher.reset();
        *published_by = None;
        info!("Withdrew the transport connection published for {}", hub_key(hub));
        true
    }
}
