use crate::error::WalkerError;
use crate::model::{PageKind, SearchResults, VersionPayload};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// The backend calls the front end depends on.
#[async_trait]
pub trait WalkerApi: Send + Sync {
    /// `GET /api/{kind}/{version}/{entity}`.
    async fn fetch_version(
        &self,
        kind: PageKind,
        version: &str,
        entity: &str,
    ) -> Result<VersionPayload, WalkerError>;

    /// `POST {path}` with form body `search={query}`. `None` means the
    /// backend answered with no results body.
    async fn post_search(&self, path: &str, query: &str)
    -> Result<Option<SearchResults>, WalkerError>;
}

pub fn version_path(kind: PageKind, version: &str, entity: &str) -> String {
    format!("/api/{}/{}/{}", kind.as_str(), version, entity)
}

/// Decodes a search response body; blank and `null` bodies mean "no results".
pub fn decode_search_body(body: &str) -> Result<Option<SearchResults>, WalkerError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str(body)?)
}

#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, WalkerError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_body(url: String, response: reqwest::Response) -> Result<String, WalkerError> {
        let status = response.status();
        if !status.is_success() {
            return Err(WalkerError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl WalkerApi for HttpApi {
    async fn fetch_version(
        &self,
        kind: PageKind,
        version: &str,
        entity: &str,
    ) -> Result<VersionPayload, WalkerError> {
        let url = self.url(&version_path(kind, version, entity));
        debug!(%url, "fetching version payload");
        let response = self.client.get(&url).send().await?;
        let body = Self::read_body(url, response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_search(
        &self,
        path: &str,
        query: &str,
    ) -> Result<Option<SearchResults>, WalkerError> {
        let url = self.url(path);
        debug!(%url, query, "posting search");
        let response = self
            .client
            .post(&url)
            .form(&[("search", query)])
            .send()
            .await?;
        let body = Self::read_body(url, response).await?;
        decode_search_body(&body)
    }
}
