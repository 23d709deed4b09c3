//! Configuration for the proxy manager.

use std::time::Duration;

/// Configuration shared by the fetch, verification and apply components.
#[derive(Debug, Clone)]
pub struct AutoProxyConfig {
    /// Endpoint of the paginated proxy listing service.
    pub listing_url: String,
    /// `country` filter sent to the listing service.
    pub country: String,
    /// `order_by` parameter sent to the listing service.
    pub order_by: String,
    /// `order_rule` parameter sent to the listing service.
    pub order_rule: String,
    /// Timeout for each listing page request.
    pub listing_timeout: Duration,
    /// URL requested through a candidate proxy to check it is alive.
    pub probe_url: String,
    /// Timeout for a single probe.
    pub probe_timeout: Duration,
    /// Minimum spacing between verification cycles.
    pub verify_interval: Duration,
    /// How long a verification cycle waits for an entry.
    pub pop_timeout: Duration,
    /// Score given to freshly fetched proxies.
    pub initial_score: u32,
    /// Score added to a proxy each time its probe fails.
    pub failure_penalty: u32,
    /// Hosts that bypass the system proxy.
    pub bypass_list: String,
}

impl AutoProxyConfig {
    /// Create a new configuration builder.
    pub fn builder() -> AutoProxyConfigBuilder {
        AutoProxyConfigBuilder::new()
    }
}

impl Default for AutoProxyConfig {
    fn default() -> Self {
        AutoProxyConfigBuilder::new().build()
    }
}

/// Builder for `AutoProxyConfig`.
#[derive(Debug, Default)]
pub struct AutoProxyConfigBuilder {
    listing_url: Option<String>,
    country: Option<String>,
    order_by: Option<String>,
    order_rule: Option<String>,
    listing_timeout: Option<Duration>,
    probe_url: Option<String>,
    probe_timeout: Option<Duration>,
    verify_interval: Option<Duration>,
    pop_timeout: Option<Duration>,
    initial_score: Option<u32>,
    failure_penalty: Option<u32>,
    bypass_list: Option<String>,
}

impl AutoProxyConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listing service endpoint.
    pub fn listing_url(mut self, url: impl Into<String>) -> Self {
        self.listing_url = Some(url.into());
        self
    }

    /// Set the country filter.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Set the listing sort field and direction.
    pub fn order(mut self, by: impl Into<String>, rule: impl Into<String>) -> Self {
        self.order_by = Some(by.into());
        self.order_rule = Some(rule.into());
        self
    }

    /// Set the timeout for listing requests.
    pub fn listing_timeout(mut self, timeout: Duration) -> Self {
        self.listing_timeout = Some(timeout);
        self
    }

    /// Set the URL used for liveness probes.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// Set the timeout for liveness probes.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Set the minimum spacing between verification cycles.
    pub fn verify_interval(mut self, interval: Duration) -> Self {
        self.verify_interval = Some(interval);
        self
    }

    /// Set how long a verification cycle waits for an entry.
    pub fn pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = Some(timeout);
        self
    }

    /// Set the score of freshly fetched proxies.
    pub fn initial_score(mut self, score: u32) -> Self {
        self.initial_score = Some(score);
        self
    }

    /// Set the score penalty for a failed probe.
    pub fn failure_penalty(mut self, penalty: u32) -> Self {
        self.failure_penalty = Some(penalty);
        self
    }

    /// Set the system proxy bypass list.
    pub fn bypass_list(mut self, list: impl Into<String>) -> Self {
        self.bypass_list = Some(list.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> AutoProxyConfig {
        AutoProxyConfig {
            listing_url: self
                .listing_url
                .unwrap_or_else(|| "https://ip.jiangxianli.com/api/proxy_ips".to_string()),
            country: self.country.unwrap_or_else(|| "中国".to_string()),
            order_by: self.order_by.unwrap_or_else(|| "validated_at".to_string()),
            order_rule: self.order_rule.unwrap_or_else(|| "ASC".to_string()),
            listing_timeout: self.listing_timeout.unwrap_or(Duration::from_secs(10)),
            probe_url: self.probe_url.unwrap_or_else(|| "http://www.baidu.com".to_string()),
            probe_timeout: self.probe_timeout.unwrap_or(Duration::from_secs(5)),
            verify_interval: self.verify_interval.unwrap_or(Duration::from_millis(250)),
            pop_timeout: self.pop_timeout.unwrap_or(Duration::from_secs(2)),
            initial_score: self.initial_score.unwrap_or(50),
            failure_penalty: self.failure_penalty.unwrap_or(10),
            bypass_list: self.bypass_list.unwrap_or_else(|| "*.local;<local>".to_string()),
        }
    }
}
