use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};
use crate::model::{AssetRef, AssetType, DisplayMode, SearchFilter};

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<AssetRef>,
    pub has_more: bool,
}

impl Page {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Read-only view of the remote photo index.
///
/// Implementations never fail: transport or decoding errors are logged and
/// reported as an empty page with `has_more == false`.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// For `Random` and `SmartShuffle`, `page` is ignored and every call may
    /// return a different, possibly overlapping sample.
    async fn fetch_page(
        &self,
        filter: &SearchFilter,
        mode: DisplayMode,
        page: u32,
        page_size: usize,
    ) -> Page;

    /// URL the renderer and the hub can load the asset from.
    fn asset_url(&self, _asset: &AssetRef) -> Option<String> {
        None
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchCriteria<'a> {
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    person_ids: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    tag_ids: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    album_ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    taken_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    taken_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_favorite: Option<bool>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    asset_type: Option<AssetType>,
}

impl<'a> From<&'a SearchFilter> for SearchCriteria<'a> {
    fn from(filter: &'a SearchFilter) -> Self {
        Self {
            person_ids: &filter.person_ids,
            tag_ids: &filter.tag_ids,
            album_ids: &filter.album_ids,
            city: filter.city.as_deref(),
            state: filter.state.as_deref(),
            country: filter.country.as_deref(),
            taken_after: filter.taken_after,
            taken_before: filter.taken_before,
            is_archived: filter.is_archived,
            is_favorite: filter.is_favorite,
            asset_type: filter.media_type,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSearchRequest<'a> {
    page: u32,
    size: usize,
    order: &'static str,
    #[serde(flatten)]
    criteria: SearchCriteria<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmartSearchRequest<'a> {
    query: &'a str,
    page: u32,
    size: usize,
    #[serde(flatten)]
    criteria: SearchCriteria<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RandomSearchRequest<'a> {
    size: usize,
    #[serde(flatten)]
    criteria: SearchCriteria<'a>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    assets: AssetPage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetPage {
    items: Vec<AssetRef>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    next_page: Option<String>,
}

/// Client for an Immich server's search API.
#[derive(Clone)]
pub struct ImmichClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl ImmichClient {
    pub fn new(server_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(server_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus(response.status()));
        }
        Ok(response)
    }

    /// Fallible search; the [`AssetSource`] impl wraps this and swallows
    /// errors.
    pub async fn search(
        &self,
        filter: &SearchFilter,
        mode: DisplayMode,
        page: u32,
        page_size: usize,
    ) -> Result<Page> {
        let criteria = SearchCriteria::from(filter);

        match mode {
            DisplayMode::Sequential => {
                let response = match filter.query.as_deref() {
                    Some(query) if !query.trim().is_empty() => {
                        let body = SmartSearchRequest {
                            query,
                            page,
                            size: page_size,
                            criteria,
                        };
                        self.post("api/search/smart", &body).await?
                    }
                    _ => {
                        let body = MetadataSearchRequest {
                            page,
                            size: page_size,
                            order: "asc",
                            criteria,
                        };
                        self.post("api/search/metadata", &body).await?
                    }
                };

                let parsed: SearchResponse = response.json().await?;
                let has_more = parsed.assets.next_page.is_some()
                    || parsed
                        .assets
                        .total
                        .map_or(false, |total| (page as usize) * page_size < total);

                Ok(Page {
                    items: parsed.assets.items,
                    has_more,
                })
            }
            DisplayMode::Random | DisplayMode::SmartShuffle => {
                if filter.query.is_some() {
                    tracing::debug!("Free-text query is not applied to random sampling");
                }
                let body = RandomSearchRequest {
                    size: page_size,
                    criteria,
                };
                let items: Vec<AssetRef> = self.post("api/search/random", &body).await?.json().await?;

                Ok(Page {
                    items,
                    has_more: false,
                })
            }
        }
    }
}

#[async_trait]
impl AssetSource for ImmichClient {
    async fn fetch_page(
        &self,
        filter: &SearchFilter,
        mode: DisplayMode,
        page: u32,
        page_size: usize,
    ) -> Page {
        match self.search(filter, mode, page, page_size).await {
            Ok(page_result) => {
                tracing::debug!(
                    "Fetched {} assets ({} mode, page {}, more: {})",
                    page_result.items.len(),
                    mode.as_str(),
                    page,
                    page_result.has_more
                );
                page_result
            }
            Err(e) => {
                tracing::warn!("Asset search failed ({} mode, page {}): {}", mode.as_str(), page, e);
                Page::empty()
            }
        }
    }

    fn asset_url(&self, asset: &AssetRef) -> Option<String> {
        let mut url = self
            .endpoint(&format!("api/assets/{}/thumbnail", asset.id))
            .ok()?;
        url.query_pairs_mut().append_pair("size", "preview");
        Some(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &Server) -> ImmichClient {
        ImmichClient::new(&server.url(), "secret", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn sequential_page_reports_next_page() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/search/metadata")
            .match_header("x-api-key", "secret")
            .match_body(Matcher::PartialJson(json!({
                "page": 2,
                "size": 50,
                "order": "asc",
                "albumIds": ["album-1"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "assets": {
                        "items": [
                            { "id": "a1", "originalPath": "/lib/a1.jpg", "type": "IMAGE" },
                            { "id": "a2", "originalPath": "/lib/a2.jpg", "type": "IMAGE" }
                        ],
                        "total": 2,
                        "count": 2,
                        "nextPage": "3"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let filter = SearchFilter {
            album_ids: vec!["album-1".into()],
            ..SearchFilter::default()
        };
        let page = client(&server)
            .fetch_page(&filter, DisplayMode::Sequential, 2, 50)
            .await;

        mock.assert_async().await;
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn last_sequential_page_has_no_more() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/search/metadata")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "assets": {
                        "items": [{ "id": "a1", "originalPath": "/lib/a1.jpg" }],
                        "total": 1,
                        "nextPage": null
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let page = client(&server)
            .fetch_page(&SearchFilter::default(), DisplayMode::Sequential, 1, 50)
            .await;
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn free_text_query_uses_smart_search() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/search/smart")
            .match_body(Matcher::PartialJson(json!({ "query": "beach sunset" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "assets": { "items": [], "nextPage": null } }).to_string())
            .create_async()
            .await;

        let filter = SearchFilter {
            query: Some("beach sunset".into()),
            ..SearchFilter::default()
        };
        let page = client(&server)
            .fetch_page(&filter, DisplayMode::Sequential, 1, 10)
            .await;
        mock.assert_async().await;
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn random_mode_reads_plain_array() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/search/random")
            .match_body(Matcher::PartialJson(json!({ "size": 3, "isFavorite": true })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    { "id": "r1", "originalPath": "/lib/r1.jpg" },
                    { "id": "r2", "originalPath": "/lib/r2.jpg" }
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let filter = SearchFilter {
            is_favorite: Some(true),
            ..SearchFilter::default()
        };
        let page = client(&server)
            .fetch_page(&filter, DisplayMode::Random, 7, 3)
            .await;
        mock.assert_async().await;
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn server_error_becomes_empty_page() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/search/random")
            .with_status(500)
            .create_async()
            .await;

        let client = client(&server);
        let err = client
            .search(&SearchFilter::default(), DisplayMode::Random, 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus(s) if s.as_u16() == 500));

        let page = client
            .fetch_page(&SearchFilter::default(), DisplayMode::Random, 1, 10)
            .await;
        assert_eq!(page, Page::empty());
    }

    #[test]
    fn asset_url_keeps_server_sub_path() {
        let client = ImmichClient::new("http://nas.local/immich", "k", Duration::from_secs(1)).unwrap();
        let asset = AssetRef {
            id: "abc".into(),
            original_path: "/x.jpg".into(),
            original_file_name: None,
            created_at: None,
            asset_type: AssetType::Image,
        };
        assert_eq!(
            client.asset_url(&asset).as_deref(),
            Some("http://nas.local/immich/api/assets/abc/thumbnail?size=preview")
        );
    }
}
