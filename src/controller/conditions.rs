//! Condition management helpers following Kubernetes API conventions

use chrono::Utc;

use crate::crd::{Condition, MulticlusterGlobalHubStatus};
use crate::error::Error;
use crate::transport::TransportMode;

/// Set once a usable transport connection has been published
pub const CONDITION_TYPE_TRANSPORT_READY: &str = "TransportReady";

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status changes.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = now;
        }
        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == CONDITION_STATUS_TRUE)
}

fn failure_reason(error: &Error) -> &'static str {
    match error {
        Error::Timeout(_) => "KafkaNotReady",
        Error::ConfigError(_) => "InvalidTransportConfig",
        Error::ValidationError(_) => "InvalidSpec",
        Error::Conflict(_) | Error::KubeError(_) => "ApiError",
        Error::SerializationError(_) | Error::FinalizerError(_) => "ReconcileFailed",
    }
}

/// Next hub status after one transport reconciliation attempt
pub fn transport_status(
    previous: Option<&MulticlusterGlobalHubStatus>,
    generation: Option<i64>,
    outcome: &Result<TransportMode, Error>,
) -> MulticlusterGlobalHubStatus {
    let mut status = previous.cloned().unwrap_or_default();
    match outcome {
        Ok(mode) => {
            status.transport_mode = Some(mode.to_string());
            set_condition(
                &mut status.conditions,
                CONDITION_TYPE_TRANSPORT_READY,
                CONDITION_STATUS_TRUE,
                "ConnectionPublished",
                &format!("{} transport connection is available", mode),
            );
            status.observed_generation = generation;
        }
        Err(e) => {
            set_condition(
                &mut status.conditions,
                CONDITION_TYPE_TRANSPORT_READY,
                CONDITION_STATUS_FALSE,
                failure_reason(e),
                &e.to_string(),
            );
        }
    }
    status
}
