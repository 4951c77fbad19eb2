//! AdmissionPolicy port - decides whether a connection attempt may proceed.
//!
//! Synchronous and asynchronous policies share one contract: `admit`
//! returns a single future. A policy that errors is treated as a reject by
//! the admission service; there is no way for a failing policy to admit a
//! connection.

use async_trait::async_trait;

use crate::domain::connection::Handshake;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allow,
    Reject { reason: Option<String> },
}

impl AdmissionDecision {
    pub fn reject(reason: impl Into<String>) -> Self {
        AdmissionDecision::Reject {
            reason: Some(reason.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allow)
    }
}

/// Errors raised by a policy while deciding.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The policy itself failed (lookup error, panic in user code, ...).
    #[error("Admission policy failed: {0}")]
    PolicyFailed(String),

    /// An asynchronous policy never completed its decision.
    #[error("Admission policy did not complete")]
    Abandoned,
}

/// Port for connection admission.
///
/// # Example
///
/// ```ignore
/// struct TokenPolicy { tokens: HashSet<String> }
///
/// #[async_trait]
/// impl AdmissionPolicy for TokenPolicy {
///     async fn admit(&self, handshake: &Handshake) -> Result<AdmissionDecision, AdmissionError> {
///         match handshake.query_param("token") {
///             Some(t) if self.tokens.contains(t) => Ok(AdmissionDecision::Allow),
///             _ => Ok(AdmissionDecision::reject("unknown token")),
///         }
///     }
///
///     fn name(&self) -> &'static str { "TokenPolicy" }
/// }
/// ```
#[async_trait]
pub trait AdmissionPolicy: Send + Sync {
    async fn admit(&self, handshake: &Handshake) -> Result<AdmissionDecision, AdmissionError>;

    /// Policy name for logging.
    fn name(&self) -> &'static str;
}
