//! ConnectionAdmission - gates inbound connection attempts.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;

use crate::domain::connection::Handshake;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{AdmissionDecision, AdmissionError, AdmissionPolicy};

/// A connection attempt that will not be established.
///
/// A normal negative outcome, not a failure of the node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct AdmissionRejected {
    pub policy: &'static str,
    pub reason: Option<String>,
}

impl fmt::Display for AdmissionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection rejected by {}", self.policy)?;
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

impl From<&AdmissionRejected> for DomainError {
    fn from(rejected: &AdmissionRejected) -> Self {
        let error = DomainError::new(ErrorCode::AdmissionRejected, rejected.to_string());
        match &rejected.reason {
            Some(reason) => error.with_detail("reason", reason.clone()),
            None => error,
        }
    }
}

/// Longest an asynchronous policy may take before the attempt is rejected.
pub const DEFAULT_POLICY_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs the configured admission policy. Fails closed.
pub struct ConnectionAdmission {
    policy: Arc<dyn AdmissionPolicy>,
    timeout: Duration,
}

impl ConnectionAdmission {
    pub fn new(policy: Arc<dyn AdmissionPolicy>) -> Self {
        Self {
            policy,
            timeout: DEFAULT_POLICY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Decide on a connection attempt.
    ///
    /// A policy error, panic or timeout is a reject; it never admits the
    /// connection.
    pub async fn admit(&self, handshake: &Handshake) -> Result<(), AdmissionRejected> {
        let policy = self.policy.name();
        let origin = handshake.origin().unwrap_or("-");

        match self.decide(handshake).await {
            Ok(AdmissionDecision::Allow) => {
                tracing::debug!(policy, origin, "connection admitted");
                Ok(())
            }
            Ok(AdmissionDecision::Reject { reason }) => {
                tracing::info!(policy, origin, reason = reason.as_deref().unwrap_or("-"), "connection rejected");
                Err(AdmissionRejected { policy, reason })
            }
            Err(e) => {
                tracing::warn!(policy, origin, error = %e, "admission policy failed, rejecting");
                Err(AdmissionRejected {
                    policy,
                    reason: Some(e.to_string()),
                })
            }
        }
    }

    async fn decide(&self, handshake: &Handshake) -> Result<AdmissionDecision, AdmissionError> {
        let guarded = AssertUnwindSafe(self.policy.admit(handshake)).catch_unwind();
        match tokio::time::timeout(self.timeout, guarded).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(panic)) => Err(AdmissionError::PolicyFailed(panic_message(&*panic))),
            Err(_) => Err(AdmissionError::Abandoned),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("policy panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("policy panicked: {message}")
    } else {
        "policy panicked".to_string()
    }
}
