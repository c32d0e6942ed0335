//! Operator configuration
//!
//! Every setting is a CLI flag with an environment fallback so the operator
//! can be configured from its Deployment manifest.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::controller::retry::RetryPolicy;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Namespace every transport resource is read from and written to
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Name of the managed Kafka cluster resource
    #[arg(long, env = "KAFKA_CLUSTER_NAME", default_value = "kafka")]
    pub kafka_cluster_name: String,

    /// Install the community broker operator instead of the supported one
    #[arg(long, env = "TRANSPORT_COMMUNITY")]
    pub community: bool,

    /// Upper bound on waiting for the broker cluster to become ready
    #[arg(long, env = "READINESS_TIMEOUT_SECS", default_value_t = 600)]
    pub readiness_timeout_secs: u64,

    /// Interval between readiness checks
    #[arg(long, env = "READINESS_INTERVAL_MILLIS", default_value_t = 1000)]
    pub readiness_interval_millis: u64,

    /// First delay of the background retry loop
    #[arg(long, env = "RETRY_INITIAL_MILLIS", default_value_t = 1000)]
    pub retry_initial_millis: u64,

    /// Cap on the background retry delay
    #[arg(long, env = "RETRY_MAX_MILLIS", default_value_t = 30_000)]
    pub retry_max_millis: u64,

    /// Growth factor of the retry delay; 1.0 retries at a fixed interval
    #[arg(long, env = "RETRY_MULTIPLIER", default_value_t = 2.0)]
    pub retry_multiplier: f64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl OperatorConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_millis)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.retry_initial_millis),
            max_delay: Duration::from_millis(self.retry_max_millis),
            multiplier: self.retry_multiplier,
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            kafka_cluster_name: "kafka".to_string(),
            community: false,
            readiness_timeout_secs: 600,
            readiness_interval_millis: 1000,
            retry_initial_millis: 1000,
            retry_max_millis: 30_000,
            retry_multiplier: 2.0,
            log_format: LogFormat::Text,
        }
    }
}
