//! JSON-over-HTTP backend for a remote item store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{Backend, Item, ItemId, NewItem, Query, StoreError};

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the store, e.g. `http://localhost:3000/api`.
    pub base_url: String,
    /// Resource path segment under the base URL.
    pub resource: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    /// First wait between retries of a transient failure.
    pub initial_retry_interval: Duration,
    /// Give up retrying after this long. `None` retries forever.
    pub max_retry_elapsed: Option<Duration>,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            resource: "items".to_string(),
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            initial_retry_interval: Duration::from_millis(500),
            max_retry_elapsed: Some(Duration::from_secs(10)),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Fail on the first transient error instead of retrying.
    pub fn without_retry(mut self) -> Self {
        self.max_retry_elapsed = Some(Duration::ZERO);
        self
    }
}

/// Backend that talks to a REST item store.
///
/// Reads and deletes retry transient failures; creates do not.
///
/// - `POST {base}/{resource}` creates an item
/// - `DELETE {base}/{resource}/{id}` destroys one
/// - `GET {base}/{resource}?where=..&orderBy=..&offset=..&limit=..` queries
pub struct HttpBackend {
    http: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.resource
        )
    }

    fn member_url(&self, id: &ItemId) -> String {
        format!("{}/{}", self.collection_url(), id)
    }

    /// Run `attempt` until it succeeds, fails permanently, or the retry
    /// budget is spent.
    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut backoff = ExponentialBackoff {
            current_interval: self.config.initial_retry_interval,
            initial_interval: self.config.initial_retry_interval,
            max_interval: Duration::from_secs(5),
            max_elapsed_time: self.config.max_retry_elapsed,
            ..Default::default()
        };

        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => match backoff.next_backoff() {
                    Some(wait) => {
                        warn!(
                            operation,
                            error = %e,
                            wait_ms = wait.as_millis() as u64,
                            "transient store error, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        id: Option<&ItemId>,
    ) -> Result<T, StoreError> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        if status == StatusCode::NOT_FOUND
            && let Some(id) = id
        {
            return Err(StoreError::NotFound {
                resource: self.config.resource.clone(),
                id: id.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(StoreError::Validation(body));
        }

        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    fn query_params(query: &Query) -> Result<Vec<(&'static str, String)>, StoreError> {
        let mut params = Vec::new();
        if !query.conditions.is_empty() {
            params.push(("where", serde_json::to_string(&query.conditions)?));
        }
        if !query.order_by.is_empty() {
            params.push(("orderBy", serde_json::to_string(&query.order_by)?));
        }
        if let Some(offset) = query.offset {
            params.push(("offset", offset.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        Ok(params)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn resource(&self) -> &str {
        &self.config.resource
    }

    /// Sent once. The store assigns the id, so a retried POST could create
    /// the item twice.
    async fn create(&self, record: &NewItem) -> Result<Item, StoreError> {
        let response = self
            .http
            .post(self.collection_url())
            .json(record)
            .send()
            .await?;
        self.read_json(response, None).await
    }

    async fn destroy(&self, id: &ItemId) -> Result<Item, StoreError> {
        let url = self.member_url(id);
        let url = url.as_str();
        self.with_retry("destroy", move || async move {
            let response = self.http.delete(url).send().await?;
            self.read_json(response, Some(id)).await
        })
        .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>, StoreError> {
        let url = self.collection_url();
        let params = Self::query_params(query)?;
        let (url, params) = (url.as_str(), params.as_slice());
        let items: Vec<Item> = self
            .with_retry("query", move || async move {
                let response = self.http.get(url).query(params).send().await?;
                self.read_json(response, None).await
            })
            .await?;

        debug!(url = %url, count = items.len(), "queried store");
        Ok(items)
    }
}
