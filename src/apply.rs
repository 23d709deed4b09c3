//! Activating a pooled proxy as the system proxy.
//!
//! The OS specific settings store is reached only through [`SystemProxyStore`].

use crate::error::{ApplyError, ConfigStoreError, NoProxyAvailable};
use crate::pool::{ProxyPool, Wait};
use crate::proxy::ProxyDescriptor;

use log::info;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Settings the applier reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxySetting {
    /// Whether the system proxy is on (`1`) or off (`0`).
    Enable,
    /// Hosts that bypass the proxy, `;` separated.
    Override,
    /// Proxy server address as `host:port`.
    Server,
}

impl ProxySetting {
    pub fn name(&self) -> &'static str {
        match self {
            ProxySetting::Enable => "ProxyEnable",
            ProxySetting::Override => "ProxyOverride",
            ProxySetting::Server => "ProxyServer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Number(u32),
    Text(String),
}

impl SettingValue {
    fn kind(&self) -> &'static str {
        match self {
            SettingValue::Number(_) => "number",
            SettingValue::Text(_) => "text",
        }
    }
}

/// The system proxy configuration store.
///
/// `set` keeps the kind of the value already stored under a key. Written
/// values take effect only after `refresh`.
pub trait SystemProxyStore: Send + Sync {
    fn get(&self, key: ProxySetting) -> Result<SettingValue, ConfigStoreError>;
    fn set(&self, key: ProxySetting, value: SettingValue) -> Result<(), ConfigStoreError>;
    fn refresh(&self) -> Result<(), ConfigStoreError>;
}

/// In-memory store, for platforms without a system proxy store and for tests.
#[derive(Debug, Default)]
pub struct MemoryProxyStore {
    values: Mutex<HashMap<ProxySetting, SettingValue>>,
    refreshes: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryProxyStore {
    /// A store holding every setting, proxy disabled.
    pub fn new() -> Self {
        let store = Self::empty();
        {
            let mut values = store.values.lock();
            values.insert(ProxySetting::Enable, SettingValue::Number(0));
            values.insert(ProxySetting::Override, SettingValue::Text(String::new()));
            values.insert(ProxySetting::Server, SettingValue::Text(String::new()));
        }
        store
    }

    /// A store with no settings at all; every access fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of `refresh` calls so far.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Number of `get`, `set` and `refresh` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SystemProxyStore for MemoryProxyStore {
    fn get(&self, key: ProxySetting) -> Result<SettingValue, ConfigStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .get(&key)
            .cloned()
            .ok_or(ConfigStoreError::MissingKey(key.name()))
    }

    fn set(&self, key: ProxySetting, value: SettingValue) -> Result<(), ConfigStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut values = self.values.lock();
        let current = values
            .get_mut(&key)
            .ok_or(ConfigStoreError::MissingKey(key.name()))?;
        if current.kind() != value.kind() {
            return Err(ConfigStoreError::TypeMismatch {
                key: key.name(),
                expected: current.kind(),
            });
        }
        *current = value;
        Ok(())
    }

    fn refresh(&self) -> Result<(), ConfigStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Moves the best pooled proxy into the system proxy settings.
pub struct ProxyApplier {
    pool: Arc<ProxyPool>,
    store: Arc<dyn SystemProxyStore>,
    bypass_list: String,
}

impl ProxyApplier {
    pub fn new(pool: Arc<ProxyPool>, store: Arc<dyn SystemProxyStore>, bypass_list: impl Into<String>) -> Self {
        Self {
            pool,
            store,
            bypass_list: bypass_list.into(),
        }
    }

    /// Take the best-ranked proxy out of the pool and make it the system proxy.
    ///
    /// The proxy leaves the pool for good, even if writing the settings fails.
    pub fn activate(&self) -> Result<ProxyDescriptor, ApplyError> {
        let entry = self.pool.pop_best(Wait::Immediate).map_err(|_| {
            info!("Proxy pool is empty, fetch proxies first");
            NoProxyAvailable
        })?;
        let proxy = entry.descriptor;

        self.store.set(ProxySetting::Enable, SettingValue::Number(1))?;
        self.store
            .set(ProxySetting::Override, SettingValue::Text(self.bypass_list.clone()))?;
        self.store
            .set(ProxySetting::Server, SettingValue::Text(proxy.address()))?;
        self.store.refresh()?;

        info!("System proxy set to {}", proxy);
        Ok(proxy)
    }

    /// Turn the system proxy off.
    pub fn deactivate(&self) -> Result<(), ConfigStoreError> {
        self.store.set(ProxySetting::Enable, SettingValue::Number(0))?;
        self.store.refresh()?;
        info!("System proxy stopped");
        Ok(())
    }
}
