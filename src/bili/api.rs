use crate::bili::models::{PageListDocument, PlayInfoDocument};
use crate::bili::{MetadataError, MetadataSource, VideoId};
use crate::config::UpstreamConfig;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    api_base: String,
    metadata_timeout: Duration,
}

/// HTTP client for the platform's player API and its audio CDN.
#[derive(Debug, Clone)]
pub struct BiliClient {
    inner: Arc<Inner>,
}

impl BiliClient {
    pub fn new(cfg: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        // The CDN answers 403 to asset requests without a site referer.
        headers.insert(
            REFERER,
            HeaderValue::from_str(&cfg.referer).context("invalid upstream.referer")?,
        );
        let origin = cfg.referer.trim_end_matches('/');
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(origin).context("invalid upstream.referer")?,
        );

        let timeout = Duration::from_secs(cfg.timeout_secs);
        // No client-wide total timeout: it would also cut off long asset bodies.
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(timeout)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                api_base: cfg.api_base.trim_end_matches('/').to_string(),
                metadata_timeout: timeout,
            }),
        })
    }

    pub fn page_list_url(&self, id: &VideoId) -> String {
        format!(
            "{}/x/player/pagelist?bvid={}",
            self.inner.api_base,
            urlencoding::encode(id.as_str())
        )
    }

    /// Raw bytes of a resolved audio asset.
    pub async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, MetadataError> {
        tracing::debug!(%url, "fetch audio asset");
        let body = read_body(self.inner.http.get(url)).await?;
        tracing::debug!(bytes = body.len(), "audio asset fetched");
        Ok(body)
    }

    async fn get_metadata(&self, url: &str) -> Result<Vec<u8>, MetadataError> {
        let req = self.inner.http.get(url).timeout(self.inner.metadata_timeout);
        read_body(req).await
    }
}

async fn read_body(req: reqwest::RequestBuilder) -> Result<Vec<u8>, MetadataError> {
    let body = req.send().await?.error_for_status()?.bytes().await?;
    Ok(body.to_vec())
}

#[async_trait]
impl MetadataSource for BiliClient {
    fn play_info_url(&self, id: &VideoId, cid: u64) -> String {
        // fnval=16 asks for the DASH layout, which is where the audio-only tracks live.
        format!(
            "{}/x/player/playurl?bvid={}&cid={cid}&fnval=16",
            self.inner.api_base,
            urlencoding::encode(id.as_str())
        )
    }

    async fn fetch_page_list(&self, id: &VideoId) -> Result<PageListDocument, MetadataError> {
        let url = self.page_list_url(id);
        tracing::debug!(%url, "fetch page list");
        let body = self.get_metadata(&url).await?;
        PageListDocument::from_json(&body)
    }

    async fn fetch_play_info(
        &self,
        id: &VideoId,
        cid: u64,
    ) -> Result<PlayInfoDocument, MetadataError> {
        let url = self.play_info_url(id, cid);
        tracing::debug!(%url, "fetch play info");
        let body = self.get_metadata(&url).await?;
        PlayInfoDocument::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn mk_client(base: &str) -> BiliClient {
        mk_client_with_timeout(base, 2)
    }

    fn mk_client_with_timeout(base: &str, timeout_secs: u64) -> BiliClient {
        let cfg = UpstreamConfig {
            api_base: base.to_string(),
            timeout_secs,
            ..UpstreamConfig::default()
        };
        BiliClient::new(&cfg).expect("client")
    }

    fn id() -> VideoId {
        VideoId::parse("BV1xx411c7mD").unwrap()
    }

    #[test]
    fn test_play_info_url_is_deterministic() {
        let client = mk_client("https://api.example.com/");
        assert_eq!(
            client.play_info_url(&id(), 42),
            "https://api.example.com/x/player/playurl?bvid=BV1xx411c7mD&cid=42&fnval=16"
        );
        assert_eq!(
            client.page_list_url(&id()),
            "https://api.example.com/x/player/pagelist?bvid=BV1xx411c7mD"
        );
    }

    #[tokio::test]
    async fn test_fetch_page_list_and_play_info() {
        let server = MockServer::start_async().await;
        let pagelist = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/x/player/pagelist")
                    .query_param("bvid", "BV1xx411c7mD")
                    .header_exists("referer");
                then.status(200).json_body(json!({
                    "code": 0,
                    "data": [ { "cid": 7, "page": 1, "duration": 12 } ]
                }));
            })
            .await;
        let playurl = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/x/player/playurl")
                    .query_param("bvid", "BV1xx411c7mD")
                    .query_param("cid", "7")
                    .query_param("fnval", "16");
                then.status(200).json_body(json!({
                    "code": 0,
                    "data": { "dash": { "audio": [ { "bandwidth": 10, "baseUrl": "http://a" } ] } }
                }));
            })
            .await;

        let client = mk_client(&server.base_url());
        let pages = client.fetch_page_list(&id()).await.unwrap();
        assert_eq!(pages.segments[0].usable_cid(), Some(7));
        let info = client.fetch_play_info(&id(), 7).await.unwrap();
        assert_eq!(info.audio[0].url, "http://a");

        pagelist.assert_hits_async(1).await;
        playurl.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_network_and_parse_errors_are_distinct() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/x/player/pagelist");
                then.status(503).body("unavailable");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/x/player/playurl");
                then.status(200).body("not json");
            })
            .await;

        let client = mk_client(&server.base_url());
        let err = client.fetch_page_list(&id()).await.unwrap_err();
        assert!(matches!(err, MetadataError::Network(_)), "{err:?}");
        let err = client.fetch_play_info(&id(), 1).await.unwrap_err();
        assert!(matches!(err, MetadataError::Parse(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_fetch_asset_returns_bytes() {
        let server = MockServer::start_async().await;
        let asset = server
            .mock_async(|when, then| {
                when.method(GET).path("/upgcxcode/a.m4s");
                then.status(200).body(b"\x00\x01m4a-bytes".as_slice());
            })
            .await;

        let client = mk_client(&server.base_url());
        let bytes = client
            .fetch_asset(&server.url("/upgcxcode/a.m4s"))
            .await
            .unwrap();
        assert_eq!(bytes, b"\x00\x01m4a-bytes");
        asset.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_metadata_timeout_does_not_cut_off_slow_assets() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/upgcxcode/long.m4s");
                then.status(200)
                    .delay(Duration::from_millis(1500))
                    .body(b"slow-bytes".as_slice());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/x/player/pagelist");
                then.status(200)
                    .delay(Duration::from_millis(1500))
                    .json_body(json!({ "code": 0, "data": [] }));
            })
            .await;

        let client = mk_client_with_timeout(&server.base_url(), 1);
        let bytes = client
            .fetch_asset(&server.url("/upgcxcode/long.m4s"))
            .await
            .unwrap();
        assert_eq!(bytes, b"slow-bytes");

        let err = client.fetch_page_list(&id()).await.unwrap_err();
        assert!(matches!(err, MetadataError::Network(_)), "{err:?}");
    }
}
