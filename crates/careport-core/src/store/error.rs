use thiserror::Error;

/// Reasons a `connect` call can fail.
///
/// Every variant is recoverable: the store records the message in its
/// `error` field, keeps the prior connection, and accepts a retry at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("another plan connection is already in progress")]
    Busy,

    #[error("plan {0:?} was not found")]
    PlanNotFound(String),

    #[error("insurance provider {0:?} was not found")]
    ProviderNotFound(String),

    #[error("a member ID is required to connect a plan")]
    MissingMemberId,

    #[error("plan {plan:?} is not offered by provider {provider:?}")]
    PlanProviderMismatch { plan: String, provider: String },

    /// Catch-all for gateway or persistence failures.
    #[error("failed to connect insurance plan: {0}")]
    ConnectFailed(String),
}

impl ConnectError {
    /// `true` for failures caused by the submitted identifiers rather than
    /// by the store or its collaborators.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::PlanNotFound(_)
                | Self::ProviderNotFound(_)
                | Self::MissingMemberId
                | Self::PlanProviderMismatch { .. }
        )
    }
}
