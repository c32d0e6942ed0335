//! Hub transport operator: provisions and publishes the Kafka transport
//!
//! The operator either adopts a bring-your-own Kafka described by a
//! secret, or installs a Strimzi-managed cluster and provisions the users
//! and topics the hub and its managed clusters talk over.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod quantity;
pub mod transport;

pub use crate::error::{Error, Result};
