//! Liveness probes routed through a candidate proxy.

use crate::config::AutoProxyConfig;
use crate::error::ProbeError;
use crate::proxy::ProxyDescriptor;

use async_trait::async_trait;
use std::time::Duration;

/// Issues one request through a given proxy and reports whether it got through.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, proxy: &ProxyDescriptor) -> Result<(), ProbeError>;
}

/// Prober that fetches a fixed URL through the proxy with reqwest.
///
/// reqwest binds proxies at client construction, so each probe builds its own
/// client routed through exactly one proxy.
#[derive(Debug, Clone)]
pub struct HttpProber {
    target: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    /// Create a prober using the probe settings from `config`.
    pub fn from_config(config: &AutoProxyConfig) -> Self {
        Self::new(config.probe_url.clone(), config.probe_timeout)
    }

    fn client_for(&self, proxy: &ProxyDescriptor) -> Result<reqwest::Client, ProbeError> {
        let proxy = proxy.to_reqwest_proxy().map_err(ProbeError::Client)?;
        reqwest::Client::builder()
            .timeout(self.timeout)
            .proxy(proxy)
            .build()
            .map_err(ProbeError::Client)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, proxy: &ProxyDescriptor) -> Result<(), ProbeError> {
        let client = self.client_for(proxy)?;
        let response = client
            .get(&self.target)
            .send()
            .await
            .map_err(ProbeError::Request)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status.as_u16()))
        }
    }
}
