//! The operations a front end drives: fetch, verify, activate, deactivate, snapshot.

use crate::apply::{ProxyApplier, SystemProxyStore};
use crate::config::AutoProxyConfig;
use crate::error::{ApplyError, ConfigStoreError, FetchError, VerifierError};
use crate::listing::{self, HttpListingSource, ListingSource};
use crate::pool::ProxyPool;
use crate::probe::{HttpProber, Prober};
use crate::proxy::{PoolEntry, ProxyDescriptor};
use crate::verify::{Verifier, VerifierState};

use log::{info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owns the pool and wires the fetch, verification and apply components to it.
pub struct ProxyManager {
    config: AutoProxyConfig,
    pool: Arc<ProxyPool>,
    source: Arc<dyn ListingSource>,
    verifier: Verifier,
    applier: ProxyApplier,
    fetching: AtomicBool,
    current: Mutex<Option<ProxyDescriptor>>,
}

impl ProxyManager {
    /// Create a manager talking to the configured listing service and probe target.
    pub fn new(config: AutoProxyConfig, store: Arc<dyn SystemProxyStore>) -> Result<Self, FetchError> {
        let source = Arc::new(HttpListingSource::new(&config)?);
        let prober = Arc::new(HttpProber::from_config(&config));
        Ok(Self::with_parts(config, source, prober, store))
    }

    /// Create a manager from explicit collaborators.
    pub fn with_parts(
        config: AutoProxyConfig,
        source: Arc<dyn ListingSource>,
        prober: Arc<dyn Prober>,
        store: Arc<dyn SystemProxyStore>,
    ) -> Self {
        let pool = Arc::new(ProxyPool::new());
        let verifier = Verifier::new(Arc::clone(&pool), prober, &config);
        let applier = ProxyApplier::new(Arc::clone(&pool), store, config.bypass_list.clone());
        Self {
            config,
            pool,
            source,
            verifier,
            applier,
            fetching: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AutoProxyConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Fetch every listing page into the pool. Only one fetch runs at a time.
    pub async fn fetch_all(&self) -> Result<usize, FetchError> {
        if self
            .fetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Proxy fetch already in progress");
            return Err(FetchError::AlreadyRunning);
        }
        let _guard = FetchGuard(&self.fetching);

        info!("Fetching proxies");
        listing::fetch_all(&self.pool, self.source.as_ref(), self.config.initial_score).await
    }

    pub fn start_verification(&self) -> Result<(), VerifierError> {
        self.verifier.start()
    }

    pub fn stop_verification(&self) {
        self.verifier.stop();
    }

    pub fn verification_state(&self) -> VerifierState {
        self.verifier.state()
    }

    /// Fetch once, then start verifying. A failed fetch does not prevent verification.
    pub async fn start(&self) -> Result<(), VerifierError> {
        if let Err(e) = self.fetch_all().await {
            warn!("Initial proxy fetch failed: {}", e);
        }
        self.start_verification()
    }

    /// Make the best pooled proxy the system proxy.
    pub fn activate(&self) -> Result<ProxyDescriptor, ApplyError> {
        let proxy = self.applier.activate()?;
        *self.current.lock() = Some(proxy.clone());
        Ok(proxy)
    }

    /// Turn the system proxy off.
    pub fn deactivate(&self) -> Result<(), ConfigStoreError> {
        self.applier.deactivate()?;
        *self.current.lock() = None;
        Ok(())
    }

    /// The proxy last applied by [`activate`](Self::activate), if still active.
    pub fn current(&self) -> Option<ProxyDescriptor> {
        self.current.lock().clone()
    }

    /// Ordered copy of the pool for display.
    pub fn snapshot(&self) -> Vec<PoolEntry> {
        self.pool.snapshot()
    }

    /// Stop verification, wait for the loop to exit, then turn the system proxy off.
    pub async fn shutdown(&self) -> Result<(), ConfigStoreError> {
        self.verifier.stop();
        self.verifier.stopped().await;
        self.deactivate()
    }
}

struct FetchGuard<'a>(&'a AtomicBool);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
