use thiserror::Error;

/// Failure categories surfaced by the harness.
///
/// Soft timeouts are not represented here: a run that exhausts its wait
/// budget still completes and records `timedOut` in the artifact metadata.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Rejected before any browser resource is allocated.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The target page loaded but is not usable (e.g. auth-denied).
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A UI control never became actionable within its bounded wait.
    #[error("interaction timed out: {0}")]
    InteractionTimeout(String),
}
