//! The `EnrollmentGateway` trait -- the asynchronous round trip performed
//! while connecting a plan.
//!
//! Today the only implementation is [`LocalGateway`], which accepts every
//! request after an optional artificial latency. A remote eligibility check
//! would implement the same trait.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// The identifiers a patient submits when connecting a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub provider_id: String,
    pub plan_id: String,
    pub member_id: String,
}

/// Adapter interface for verifying an enrollment with the payer.
///
/// An `Err` means the round trip itself failed; the store reports it as a
/// generic connect failure. Catalog validation happens in the store, not here.
#[async_trait]
pub trait EnrollmentGateway: Send + Sync {
    /// Human-readable name for this gateway (e.g. "local").
    fn name(&self) -> &str;

    /// Perform the round trip for `request`.
    async fn verify(&self, request: &ConnectRequest) -> Result<()>;
}

// Compile-time assertion: EnrollmentGateway must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn EnrollmentGateway) {}
};

/// In-process gateway that accepts every request.
#[derive(Debug, Clone, Default)]
pub struct LocalGateway {
    latency: Duration,
}

impl LocalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` before answering, to mimic a network hop.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl EnrollmentGateway for LocalGateway {
    fn name(&self) -> &str {
        "local"
    }

    async fn verify(&self, request: &ConnectRequest) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        tracing::debug!(
            plan_id = %request.plan_id,
            provider_id = %request.provider_id,
            "local gateway accepted enrollment"
        );
        Ok(())
    }
}
