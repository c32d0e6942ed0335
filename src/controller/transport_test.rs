//! Unit tests for transport mode selection and publishing

use std::sync::Arc;
use std::time::Duration;

use super::managed::ManagedOptions;
use super::readiness::{ReadinessOptions, USER_CERT_KEY, USER_KEY_KEY};
use super::testing::{ready_status, test_hub, MemoryStore};
use super::transport::TransportReconciler;
use crate::crd::strimzi::KafkaCondition;
use crate::error::Error;
use crate::transport::{
    ConnectionPublisher, TransportMode, GLOBAL_HUB_USER_NAME, SECRET_KEY_BOOTSTRAP_SERVER,
    SECRET_KEY_CA_CERT, SECRET_KEY_CLIENT_CERT, SECRET_KEY_CLIENT_KEY, SECRET_KEY_CLUSTER_ID,
    TRANSPORT_SECRET_NAME,
};

const NS: &str = "multicluster-global-hub";

fn reconciler(store: Arc<MemoryStore>) -> TransportReconciler {
    TransportReconciler::new(
        store,
        Arc::new(ConnectionPublisher::new()),
        ManagedOptions {
            cluster_name: "kafka".to_string(),
            community: true,
            readiness: ReadinessOptions {
                interval: Duration::from_millis(5),
                timeout: Duration::from_millis(50),
            },
        },
    )
}

fn insert_byo_secret(store: &MemoryStore) {
    store.insert_secret(
        TRANSPORT_SECRET_NAME,
        &[
            (SECRET_KEY_BOOTSTRAP_SERVER, "byo-kafka.example.com:443"),
            (SECRET_KEY_CA_CERT, "byo-ca"),
            (SECRET_KEY_CLIENT_CERT, "byo-crt"),
            (SECRET_KEY_CLIENT_KEY, "byo-key"),
            (SECRET_KEY_CLUSTER_ID, "byo-cluster"),
        ],
    );
}

fn make_managed_ready(store: &MemoryStore) {
    store.set_kafka_status("kafka", ready_status());
    store.insert_secret(
        GLOBAL_HUB_USER_NAME,
        &[(USER_CERT_KEY, "hub-crt"), (USER_KEY_KEY, "hub-key")],
    );
}

#[tokio::test]
async fn test_byo_secret_skips_managed_path() {
    let store = Arc::new(MemoryStore::new(NS));
    insert_byo_secret(&store);
    let reconciler = reconciler(store.clone());

    let mode = reconciler
        .reconcile(&test_hub("hub", NS))
        .await
        .expect("byo reconcile");
    assert_eq!(mode, TransportMode::Byo);

    let (published_mode, conn) = reconciler.publisher().snapshot();
    assert_eq!(published_mode, TransportMode::Byo);
    let conn = conn.expect("published");
    assert_eq!(conn.bootstrap_server, "byo-kafka.example.com:443");
    assert_eq!(conn.cluster_id.as_deref(), Some("byo-cluster"));

    assert!(store.kafka("kafka").is_none());
    assert!(store.dynamic("Subscription", "strimzi-kafka-operator").is_none());
    assert!(store.user(GLOBAL_HUB_USER_NAME).is_none());
}

#[tokio::test]
async fn test_deleting_secret_switches_to_managed() {
    let store = Arc::new(MemoryStore::new(NS));
    insert_byo_secret(&store);
    let reconciler = reconciler(store.clone());
    let hub = test_hub("hub", NS);

    reconciler.reconcile(&hub).await.expect("byo reconcile");
    assert_eq!(
        reconciler.active().map(|t| t.mode()),
        Some(TransportMode::Byo)
    );

    let byo_connection = reconciler.publisher().connection();

    store.remove_secret(TRANSPORT_SECRET_NAME);
    let err = reconciler
        .reconcile(&hub)
        .await
        .expect_err("managed cluster not ready yet");
    assert!(matches!(err, Error::Timeout(_)));
    // The mode follows the selection; the connection waits for a success.
    let (mode, connection) = reconciler.publisher().snapshot();
    assert_eq!(mode, TransportMode::Managed);
    assert_eq!(connection, byo_connection);
    assert_eq!(
        reconciler.active().map(|t| t.mode()),
        Some(TransportMode::Managed)
    );
    assert!(store.kafka("kafka").is_some());
    assert!(store
        .dynamic("Subscription", "strimzi-kafka-operator")
        .is_some());

    make_managed_ready(&store);
    let mode = reconciler.reconcile(&hub).await.expect("managed reconcile");
    assert_eq!(mode, TransportMode::Managed);
    let conn = reconciler.publisher().connection().expect("published");
    assert_eq!(conn.bootstrap_server, "kafka-kafka-bootstrap.ns.svc:9093");
    assert_eq!(conn.client_key, "hub-key");
}

#[tokio::test]
async fn test_failed_attempt_keeps_previous_connection() {
    let store = Arc::new(MemoryStore::new(NS));
    let reconciler = reconciler(store.clone());
    let hub = test_hub("hub", NS);

    assert!(reconciler.reconcile(&hub).await.is_err());
    assert!(reconciler.publisher().connection().is_none());

    make_managed_ready(&store);
    reconciler.reconcile(&hub).await.expect("managed reconcile");
    let before = reconciler.publisher().connection();
    assert!(before.is_some());

    let mut degraded = ready_status();
    degraded.conditions = vec![KafkaCondition {
        type_: Some("Ready".to_string()),
        status: Some("False".to_string()),
        reason: Some("RollingUpdate".to_string()),
        ..Default::default()
    }];
    store.set_kafka_status("kafka", degraded);

    assert!(reconciler.reconcile(&hub).await.is_err());
    assert_eq!(reconciler.publisher().connection(), before);
    assert_eq!(reconciler.publisher().mode(), TransportMode::Managed);
}

#[tokio::test]
async fn test_repeated_and_concurrent_reconciles_converge() {
    let store = Arc::new(MemoryStore::new(NS));
    let reconciler = Arc::new(reconciler(store.clone()));
    let hub = test_hub("hub", NS);

    assert!(reconciler.reconcile(&hub).await.is_err());
    make_managed_ready(&store);

    let (a, b) = tokio::join!(reconciler.reconcile(&hub), reconciler.reconcile(&hub));
    assert_eq!(a.expect("first"), TransportMode::Managed);
    assert_eq!(b.expect("second"), TransportMode::Managed);

    assert_eq!(store.kafka_writes(), (1, 0));
    let acls = store
        .user(GLOBAL_HUB_USER_NAME)
        .and_then(|u| u.spec.authorization)
        .expect("global hub user")
        .acls;
    assert_eq!(acls.len(), 4);
}

#[tokio::test]
async fn test_invalid_hub_is_not_published() {
    let store = Arc::new(MemoryStore::new(NS));
    let reconciler = reconciler(store.clone());
    let mut hub = test_hub("hub", NS);
    hub.spec.kafka.replicas = 0;

    let err = reconciler.reconcile(&hub).await.expect_err("invalid");
    assert!(matches!(err, Error::ValidationError(_)));
    assert!(store.kafka("kafka").is_none());
    assert!(reconciler.publisher().connection().is_none());
}

#[tokio::test]
async fn test_mode_is_published_before_the_connection() {
    let store = Arc::new(MemoryStore::new(NS));
    let reconciler = Arc::new(TransportReconciler::new(
        store.clone(),
        Arc::new(ConnectionPublisher::new()),
        ManagedOptions {
            cluster_name: "kafka".to_string(),
            community: true,
            readiness: ReadinessOptions {
                interval: Duration::from_millis(5),
                timeout: Duration::from_secs(5),
            },
        },
    ));
    let hub = test_hub("hub", NS);

    let attempt = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.reconcile(&hub).await })
    };

    // Still waiting for the cluster, yet consumers already see the mode.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!attempt.is_finished());
    assert_eq!(
        reconciler.publisher().snapshot(),
        (TransportMode::Managed, None)
    );

    make_managed_ready(&store);
    let mode = tokio::time::timeout(Duration::from_secs(5), attempt)
        .await
        .expect("attempt finishes")
        .expect("join")
        .expect("managed reconcile");
    assert_eq!(mode, TransportMode::Managed);
    assert!(reconciler.publisher().connection().is_some());
}

#[tokio::test]
async fn test_only_the_publishing_hub_withdraws_the_connection() {
    let store = Arc::new(MemoryStore::new(NS));
    insert_byo_secret(&store);
    let reconciler = reconciler(store.clone());
    let hub_a = test_hub("hub-a", NS);
    let hub_b = test_hub("hub-b", NS);

    reconciler.reconcile(&hub_a).await.expect("hub-a reconcile");
    reconciler.reconcile(&hub_b).await.expect("hub-b reconcile");

    // hub-b published last; deleting hub-a leaves its connection in place.
    assert!(!reconciler.release(&hub_a));
    assert_eq!(reconciler.publisher().mode(), TransportMode::Byo);
    assert!(reconciler.publisher().connection().is_some());

    assert!(reconciler.release(&hub_b));
    assert_eq!(reconciler.publisher().snapshot(), (TransportMode::Unset, None));
    assert!(!reconciler.release(&hub_b));
}
