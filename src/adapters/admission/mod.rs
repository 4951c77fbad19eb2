//! Admission policies.
//!
//! [`policy_from_config`] picks one from [`AdmissionConfig`]:
//!
//! | `allowed_origins` | `allow_any_origin` | Policy |
//! |-------------------|--------------------|--------|
//! | set               | any                | [`OriginAllowList`] |
//! | unset             | `true`             | [`AllowAnyOrigin`] |
//! | unset             | `false`            | [`SameOriginPolicy`] |

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AdmissionConfig;
use crate::domain::connection::Handshake;
use crate::ports::{AdmissionDecision, AdmissionError, AdmissionPolicy};

/// Build the admission policy described by configuration.
pub fn policy_from_config(config: &AdmissionConfig) -> Arc<dyn AdmissionPolicy> {
    let origins = config.allowed_origins_list();
    if !origins.is_empty() {
        Arc::new(OriginAllowList::new(origins))
    } else if config.allow_any_origin {
        Arc::new(AllowAnyOrigin)
    } else {
        Arc::new(SameOriginPolicy)
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Admits only browsers whose `Origin` is on the list.
///
/// Attempts without an `Origin` header are rejected.
#[derive(Debug, Clone)]
pub struct OriginAllowList {
    origins: Vec<String>,
}

impl OriginAllowList {
    pub fn new(origins: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            origins: origins
                .into_iter()
                .map(|o| normalize_origin(o.as_ref()))
                .collect(),
        }
    }
}

#[async_trait]
impl AdmissionPolicy for OriginAllowList {
    async fn admit(&self, handshake: &Handshake) -> Result<AdmissionDecision, AdmissionError> {
        let Some(origin) = handshake.origin() else {
            return Ok(AdmissionDecision::reject("missing Origin header"));
        };
        if self.origins.contains(&normalize_origin(origin)) {
            Ok(AdmissionDecision::Allow)
        } else {
            Ok(AdmissionDecision::reject(format!("origin '{origin}' not allowed")))
        }
    }

    fn name(&self) -> &'static str {
        "OriginAllowList"
    }
}

/// Admits attempts with no `Origin` header, or whose origin host matches
/// the `Host` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameOriginPolicy;

#[async_trait]
impl AdmissionPolicy for SameOriginPolicy {
    async fn admit(&self, handshake: &Handshake) -> Result<AdmissionDecision, AdmissionError> {
        let Some(origin) = handshake.origin() else {
            return Ok(AdmissionDecision::Allow);
        };
        let origin_host = origin
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(origin)
            .trim_end_matches('/');

        match handshake.host() {
            Some(host) if host.eq_ignore_ascii_case(origin_host) => Ok(AdmissionDecision::Allow),
            _ => Ok(AdmissionDecision::reject(format!(
                "cross-origin connection from '{origin}'"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "SameOriginPolicy"
    }
}

/// Admits everything. Refused by configuration validation in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnyOrigin;

#[async_trait]
impl AdmissionPolicy for AllowAnyOrigin {
    async fn admit(&self, _handshake: &Handshake) -> Result<AdmissionDecision, AdmissionError> {
        Ok(AdmissionDecision::Allow)
    }

    fn name(&self) -> &'static str {
        "AllowAnyOrigin"
    }
}

/// Wraps a synchronous closure as a policy.
pub struct FnPolicy<F> {
    name: &'static str,
    decide: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&Handshake) -> Result<AdmissionDecision, AdmissionError> + Send + Sync,
{
    pub fn new(name: &'static str, decide: F) -> Self {
        Self { name, decide }
    }
}

#[async_trait]
impl<F> AdmissionPolicy for FnPolicy<F>
where
    F: Fn(&Handshake) -> Result<AdmissionDecision, AdmissionError> + Send + Sync,
{
    async fn admit(&self, handshake: &Handshake) -> Result<AdmissionDecision, AdmissionError> {
        (self.decide)(handshake)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
