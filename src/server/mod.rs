//! HTTP surface: download, play-info diagnostics and lossless extraction.

mod handlers;

use crate::bili::api::BiliClient;
use crate::bili::resolve::{ApiResolver, AudioResolver, YtDlpResolver};
use crate::bili::PageIndex;
use crate::config::{Config, ResolverBackend};
use crate::error::{Error, Result};
use crate::transcode::{
    AutoBitrate, Encoder, FfmpegEncoder, SOURCE_FORMAT, TranscodeSpec, estimate_bitrate,
};
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Shared, read-only per-process state. Everything request-specific lives
/// on the handler's stack.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<dyn AudioResolver>,
    /// Always the API pipeline; the diagnostics endpoint reports its URLs.
    pub api: Arc<ApiResolver<BiliClient>>,
    pub client: BiliClient,
    pub encoder: Arc<dyn Encoder>,
    pub auto_bitrate: Option<AutoBitrate>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let client = BiliClient::new(&cfg.upstream)?;
        let api = Arc::new(ApiResolver::new(client.clone()));
        let resolver: Arc<dyn AudioResolver> = match cfg.resolver.backend {
            ResolverBackend::Api => api.clone(),
            ResolverBackend::YtDlp => Arc::new(YtDlpResolver::new(
                cfg.resolver.ytdlp_path.clone(),
                &cfg.upstream.referer,
            )),
        };
        Ok(Self {
            resolver,
            api,
            client,
            encoder: Arc::new(FfmpegEncoder::new(cfg.transcode.ffmpeg_path.clone())),
            auto_bitrate: cfg.transcode.auto_policy()?,
            request_timeout: Duration::from_secs(cfg.server.request_timeout_secs),
        })
    }

    /// Resolve, fetch and encode one segment.
    pub async fn transcode(
        &self,
        raw_id: &str,
        page: PageIndex,
        spec: TranscodeSpec,
    ) -> Result<Vec<u8>> {
        let asset = self.resolver.resolve(raw_id, page).await?;
        let input = self.client.fetch_asset(&asset.url).await?;

        let spec = match self.auto_bitrate {
            Some(policy) if spec.wants_estimate() => {
                let kbps = estimate_bitrate(input.len(), asset.duration_secs, policy);
                tracing::debug!(kbps, duration = ?asset.duration_secs, "estimated bitrate");
                spec.with_bitrate(kbps)
            }
            _ => spec,
        };

        self.encoder.encode(input, SOURCE_FORMAT, &spec).await
    }

    /// Run `fut` under the per-request deadline.
    pub async fn with_deadline<T>(
        &self,
        what: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{what} exceeded {:?}", self.request_timeout)))?
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::download))
        .route("/playurl", get(handlers::play_url))
        .route("/lossless", post(handlers::lossless))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(cfg: &Config, bind: SocketAddr) -> anyhow::Result<()> {
    let state = AppState::from_config(cfg)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(backend = ?cfg.resolver.backend, "listening on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutting down");
    }
}
