//! Error types for the auto-proxy crate.

use thiserror::Error;

/// Error returned when the pool had nothing to hand out within the requested wait.
///
/// This is an idle signal rather than a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Proxy pool is empty")]
pub struct Empty;

/// Error returned when no proxy is available to activate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No proxy available in pool")]
pub struct NoProxyAvailable;

/// Failure while pulling proxies from the listing service.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport level failure talking to the listing service.
    #[error("listing request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The listing service answered with a non-success status.
    #[error("listing service returned status {0}")]
    Status(u16),
    /// The response body was not the expected JSON shape.
    #[error("malformed listing response: {0}")]
    Parse(#[from] serde_json::Error),
    /// A record could not be turned into a proxy descriptor.
    #[error("invalid proxy record: {0}")]
    InvalidRecord(String),
    /// Another fetch is still in progress.
    #[error("a fetch is already in progress")]
    AlreadyRunning,
}

impl FetchError {
    /// Whether the failure was a timeout talking to the listing service.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Http(e) if e.is_timeout())
    }
}

/// Failure of a liveness probe routed through a candidate proxy.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The proxied client could not be built (bad proxy URL, TLS backend, ...).
    #[error("failed to build proxied client: {0}")]
    Client(#[source] reqwest::Error),
    /// The request through the proxy failed or timed out.
    #[error("probe request failed: {0}")]
    Request(#[source] reqwest::Error),
    /// The probe target answered, but not with a success status.
    #[error("probe target returned status {0}")]
    Status(u16),
}

/// Failure reading or writing the system proxy configuration store.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// The key does not exist in the store.
    #[error("setting {0} not present in store")]
    MissingKey(&'static str),
    /// The new value is of a different kind than the stored one.
    #[error("setting {key} expects a {expected} value")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
    },
    /// Platform specific failure.
    #[error("system proxy store error: {0}")]
    Backend(String),
}

/// Failure of [`ProxyApplier::activate`](crate::ProxyApplier::activate).
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    NoProxyAvailable(#[from] NoProxyAvailable),
    #[error(transparent)]
    Store(#[from] ConfigStoreError),
}

/// Failure controlling the verification loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifierError {
    #[error("verification loop was already started")]
    AlreadyStarted,
    #[error("verification loop needs a tokio runtime")]
    NoRuntime,
}
