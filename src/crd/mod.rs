//! Custom Resource Definitions for the transport operator
//!
//! `MulticlusterGlobalHub` is owned by this operator; the Strimzi types
//! mirror the broker operator's resources that the transport layer drives.

mod hub;
pub mod strimzi;
pub mod types;


pub use hub::{
    MulticlusterGlobalHub, MulticlusterGlobalHubSpec, MulticlusterGlobalHubStatus,
    SpecValidationError,
};
pub use strimzi::{Kafka, KafkaSpec, KafkaStatus, KafkaTopic, KafkaTopicSpec, KafkaUser, KafkaUserSpec};
pub use types::*;
