//! # auto-proxy
//!
//! A self-verifying pool of free HTTP proxies.
//!
//! Proxies are pulled from a paginated listing service into a score-ordered pool,
//! continuously re-checked in the background, and the best one can be activated
//! as the system proxy through a pluggable settings store.

pub mod apply;
pub mod config;
pub mod error;
pub mod listing;
pub mod log_buffer;
pub mod manager;
pub mod pool;
pub mod probe;
pub mod proxy;
pub mod verify;

pub use apply::{MemoryProxyStore, ProxyApplier, ProxySetting, SettingValue, SystemProxyStore};
pub use config::{AutoProxyConfig, AutoProxyConfigBuilder};
pub use error::{ApplyError, ConfigStoreError, Empty, FetchError, NoProxyAvailable, ProbeError, VerifierError};
pub use listing::{HttpListingSource, ListingPage, ListingSource, ProxyRecord};
pub use log_buffer::RollingLog;
pub use manager::ProxyManager;
pub use pool::{ProxyPool, Wait, MAX_SCORE};
pub use probe::{HttpProber, Prober};
pub use proxy::{Health, PoolEntry, ProxyDescriptor, ProxyScheme};
pub use verify::{Verdict, Verifier, VerifierState};
