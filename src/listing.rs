//! Fetching proxy lists from the paginated listing service.

use crate::config::AutoProxyConfig;
use crate::error::FetchError;
use crate::pool::ProxyPool;
use crate::proxy::{PoolEntry, ProxyDescriptor, ProxyScheme};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use serde::Deserialize;

/// One proxy as reported by the listing service.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRecord {
    pub protocol: String,
    pub ip: String,
    pub port: PortField,
}

/// The listing service sends ports either as numbers or as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortField {
    Number(u16),
    Text(String),
}

impl ProxyRecord {
    /// Convert the record into a descriptor.
    pub fn to_descriptor(&self) -> Result<ProxyDescriptor, FetchError> {
        let scheme = self
            .protocol
            .parse::<ProxyScheme>()
            .map_err(FetchError::InvalidRecord)?;
        let port = match &self.port {
            PortField::Number(port) => *port,
            PortField::Text(text) => text.trim().parse().map_err(|_| {
                FetchError::InvalidRecord(format!("bad port `{text}` for {}", self.ip))
            })?,
        };
        let host = self.ip.trim();
        if host.is_empty() {
            return Err(FetchError::InvalidRecord("empty ip".to_string()));
        }
        Ok(ProxyDescriptor::new(scheme, host, port))
    }
}

/// One page of listing results.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub proxies: Vec<ProxyRecord>,
    pub last_page: u32,
}

#[derive(Deserialize)]
struct ListingResponse {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    data: Vec<ProxyRecord>,
    last_page: u32,
}

/// Parse a raw listing response body.
pub(crate) fn parse_listing(body: &[u8]) -> Result<ListingPage, FetchError> {
    let response: ListingResponse = serde_json::from_slice(body)?;
    Ok(ListingPage {
        proxies: response.data.data,
        last_page: response.data.last_page,
    })
}

/// A paginated source of proxy records. Pages are numbered from 1.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<ListingPage, FetchError>;
}

/// Listing source backed by the HTTP listing API.
pub struct HttpListingSource {
    client: Client,
    url: String,
    country: String,
    order_by: String,
    order_rule: String,
}

impl HttpListingSource {
    /// Create a source using the listing settings from `config`.
    pub fn new(config: &AutoProxyConfig) -> Result<Self, FetchError> {
        // The listing service itself is always reached directly.
        let client = Client::builder()
            .timeout(config.listing_timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: config.listing_url.clone(),
            country: config.country.clone(),
            order_by: config.order_by.clone(),
            order_rule: config.order_rule.clone(),
        })
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_page(&self, page: u32) -> Result<ListingPage, FetchError> {
        let page = page.to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("country", self.country.as_str()),
                ("order_by", self.order_by.as_str()),
                ("order_rule", self.order_rule.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        parse_listing(&body)
    }
}

/// Pull every page from `source` into `pool`, each proxy starting at `initial_score`.
///
/// Stops at the first failure; proxies inserted before it stay in the pool.
/// Returns the number of records the pool accepted; a proxy listed twice
/// counts twice, records refused for their score are not counted.
pub async fn fetch_all(
    pool: &ProxyPool,
    source: &dyn ListingSource,
    initial_score: u32,
) -> Result<usize, FetchError> {
    let result = fetch_pages(pool, source, initial_score).await;
    match &result {
        Ok(count) => info!("Proxy fetch completed: {} proxies, pool size {}", count, pool.len()),
        Err(e) => {
            error!("Proxy fetch failed");
            if e.is_timeout() {
                warn!("The free listing service is unstable; if fetching keeps failing, try again later");
            }
            debug!("Fetch error: {:?}", e);
        }
    }
    result
}

async fn fetch_pages(
    pool: &ProxyPool,
    source: &dyn ListingSource,
    initial_score: u32,
) -> Result<usize, FetchError> {
    let mut page = 1;
    let mut inserted = 0;

    loop {
        let listing = source.fetch_page(page).await?;
        for record in &listing.proxies {
            if pool.put(PoolEntry::new(record.to_descriptor()?, initial_score)) {
                inserted += 1;
            }
        }
        info!("Fetched page {} of {} ({} proxies)", page, listing.last_page, listing.proxies.len());

        if page >= listing.last_page {
            break;
        }
        page += 1;
    }

    Ok(inserted)
}
