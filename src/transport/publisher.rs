//! Process-wide holder of the active transport mode and connection
//!
//! The reconciler is the only writer; producers and consumers anywhere in
//! the process read through the synchronized accessors.

use std::sync::{PoisonError, RwLock};

use tracing::info;

use super::{KafkaConnection, TransportMode};

#[derive(Debug, Default)]
struct Published {
    mode: TransportMode,
    connection: Option<KafkaConnection>,
}

/// Shared, lifecycle-scoped publisher. Wrap it in an `Arc` and hand it to
/// whoever needs the connection.
#[derive(Debug, Default)]
pub struct ConnectionPublisher {
    inner: RwLock<Published>,
}

impl ConnectionPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection, absent until a reconciliation succeeded
    pub fn connection(&self) -> Option<KafkaConnection> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connection
            .clone()
    }

    pub fn set_connection(&self, connection: Option<KafkaConnection>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.connection = connection;
    }

    pub fn mode(&self) -> TransportMode {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).mode
    }

    pub fn set_mode(&self, mode: TransportMode) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if guard.mode != mode {
            info!("Transport mode changed: {} -> {}", guard.mode, mode);
        }
        guard.mode = mode;
    }

    /// Replace mode and connection under a single write
    pub fn publish(&self, mode: TransportMode, connection: KafkaConnection) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if guard.connection.as_ref() != Some(&connection) {
            info!(
                "Publishing {} transport connection to {}",
                mode, connection.bootstrap_server
            );
        }
        guard.mode = mode;
        guard.connection = Some(connection);
    }

    /// Read mode and connection under a single lock
    pub fn snapshot(&self) -> (TransportMode, Option<KafkaConnection>) {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        (guard.mode, guard.connection.clone())
    }

    /// Back to the initial state
    pub fn reset(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Published::default();
    }
}
