//! Listing data access: file/HTTP sources, catalog snapshots, admin paging.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hirescope_core::{DataUnavailableError, Listing};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "hirescope-storage";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("reading listings from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding listings from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// One page of the admin listing view. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPage {
    pub items: Vec<Listing>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl AdminPage {
    /// Out-of-range page numbers clamp to the nearest valid page, so a fetch
    /// that races a delete still returns the best-known page.
    pub fn from_listings(listings: &[Listing], page_number: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_pages = listings.len().max(1).div_ceil(page_size);
        let page = page_number.clamp(1, total_pages);
        let start = (page - 1) * page_size;
        let items = listings.iter().skip(start).take(page_size).cloned().collect();
        Self {
            items,
            page,
            page_size,
            total_pages,
            total_items: listings.len(),
        }
    }
}

/// Data-access collaborator the engine pulls listings from.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch_listings(&self) -> Result<Vec<Listing>, SourceError>;

    async fn fetch_page(&self, page_number: usize, page_size: usize) -> Result<AdminPage, SourceError> {
        let listings = self.fetch_listings().await?;
        Ok(AdminPage::from_listings(&listings, page_number, page_size))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListingFeed {
    Bare(Vec<JsonValue>),
    Wrapped { listings: Vec<JsonValue> },
}

/// Decode a JSON feed (a bare array or `{"listings": [...]}`). Records that
/// do not decode as a listing are skipped with a warning.
pub fn decode_listings(origin: &str, bytes: &[u8]) -> Result<Vec<Listing>, SourceError> {
    let feed: ListingFeed = serde_json::from_slice(bytes).map_err(|source| SourceError::Decode {
        origin: origin.to_string(),
        source,
    })?;
    let raw = match feed {
        ListingFeed::Bare(items) | ListingFeed::Wrapped { listings: items } => items,
    };
    let mut out = Vec::with_capacity(raw.len());
    for (idx, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<Listing>(value) {
            Ok(listing) => out.push(listing),
            Err(err) => warn!(origin, index = idx, error = %err, "skipping malformed listing"),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Default)]
pub struct StaticListingSource {
    listings: Vec<Listing>,
}

impl StaticListingSource {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self { listings }
    }
}

#[async_trait]
impl ListingSource for StaticListingSource {
    fn describe(&self) -> String {
        format!("static ({} listings)", self.listings.len())
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>, SourceError> {
        Ok(self.listings.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FileListingSource {
    path: PathBuf,
}

impl FileListingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ListingSource for FileListingSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| SourceError::Io {
            path: self.path.clone(),
            source,
        })?;
        decode_listings(&self.describe(), &bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Listing feed served over HTTP(S), fetched with capped exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    client: reqwest::Client,
    url: String,
    backoff: BackoffPolicy,
}

impl HttpListingSource {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            url: url.into(),
            backoff: config.backoff,
        })
    }

    async fn fetch_bytes(&self) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.client.get(&self.url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        return Ok(resp.bytes().await?.to_vec());
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(%status, attempt, "retrying listing feed");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(error = %err, attempt, "retrying listing feed");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>, SourceError> {
        let span = info_span!("listing_fetch", url = %self.url);
        let bytes = self.fetch_bytes().instrument(span).await?;
        decode_listings(&self.url, &bytes)
    }
}

/// Where listings come from: a local JSON file or an HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingsLocation {
    File(PathBuf),
    Url(String),
}

impl ListingsLocation {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::File(PathBuf::from(trimmed))
        }
    }

    pub fn open(&self, http: HttpClientConfig) -> anyhow::Result<Arc<dyn ListingSource>> {
        Ok(match self {
            Self::File(path) => Arc::new(FileListingSource::new(path.clone())),
            Self::Url(url) => Arc::new(HttpListingSource::new(url.clone(), http)?),
        })
    }
}

/// Monotonic ticket counter used to drop results of superseded fetches.
#[derive(Debug, Default)]
pub struct StalePageGuard {
    latest: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket(u64);

impl StalePageGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fetch. Any ticket issued earlier becomes stale.
    pub fn begin(&self) -> PageTicket {
        PageTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Mark every outstanding ticket stale, e.g. after a mutation.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, ticket: PageTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Immutable, shareable view of the loaded listings.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub listings: Arc<Vec<Listing>>,
    pub loaded_at: DateTime<Utc>,
    pub origin: String,
}

#[derive(Debug, Clone)]
enum CatalogState {
    Loaded(CatalogSnapshot),
    Unavailable(DataUnavailableError),
}

/// Listings fetched once and shared read-only across requests. A failed
/// load is remembered as [`DataUnavailableError`] rather than an empty list.
pub struct ListingCatalog {
    source: Arc<dyn ListingSource>,
    state: RwLock<CatalogState>,
    refreshes: StalePageGuard,
}

impl ListingCatalog {
    pub async fn load(source: Arc<dyn ListingSource>) -> Self {
        let catalog = Self {
            source,
            state: RwLock::new(CatalogState::Unavailable(DataUnavailableError::new(
                "listings not loaded yet",
            ))),
            refreshes: StalePageGuard::new(),
        };
        // A failed initial load is recorded in the catalog state.
        let _ = catalog.refresh().await;
        catalog
    }

    /// Refetch from the source. A refresh overtaken by a newer one is discarded.
    pub async fn refresh(&self) -> Result<usize, DataUnavailableError> {
        let ticket = self.refreshes.begin();
        let origin = self.source.describe();
        let fetched = self.source.fetch_listings().await;

        // Ticket must be checked while holding the write guard.
        let mut state = self.state.write().await;
        if !self.refreshes.is_current(ticket) {
            info!(%origin, "discarding superseded listing refresh");
            return match &*state {
                CatalogState::Loaded(snapshot) => Ok(snapshot.listings.len()),
                CatalogState::Unavailable(err) => Err(err.clone()),
            };
        }

        match fetched {
            Ok(listings) => {
                let count = listings.len();
                info!(%origin, count, "listing catalog loaded");
                *state = CatalogState::Loaded(CatalogSnapshot {
                    listings: Arc::new(listings),
                    loaded_at: Utc::now(),
                    origin,
                });
                Ok(count)
            }
            Err(err) => {
                warn!(%origin, error = %err, "listing catalog unavailable");
                let unavailable = DataUnavailableError::new(err.to_string());
                // Keep serving the previous snapshot if there is one.
                if matches!(*state, CatalogState::Unavailable(_)) {
                    *state = CatalogState::Unavailable(unavailable.clone());
                }
                Err(unavailable)
            }
        }
    }

    /// Drop any in-flight refresh result without touching the current snapshot.
    pub fn invalidate_pending(&self) {
        self.refreshes.invalidate();
    }

    pub async fn snapshot(&self) -> Result<CatalogSnapshot, DataUnavailableError> {
        match &*self.state.read().await {
            CatalogState::Loaded(snapshot) => Ok(snapshot.clone()),
            CatalogState::Unavailable(err) => Err(err.clone()),
        }
    }

    pub async fn is_available(&self) -> bool {
        self.snapshot().await.is_ok()
    }

    /// Admin pagination. Source failures fall back to the last snapshot.
    pub async fn fetch_page(&self, page_number: usize, page_size: usize) -> Result<AdminPage, DataUnavailableError> {
        match self.source.fetch_page(page_number, page_size).await {
            Ok(page) => Ok(page),
            Err(err) => {
                warn!(error = %err, page_number, "admin page fetch failed, serving last snapshot");
                let snapshot = self.snapshot().await?;
                Ok(AdminPage::from_listings(&snapshot.listings, page_number, page_size))
            }
        }
    }
}
