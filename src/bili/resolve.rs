use crate::bili::models::PageListDocument;
use crate::bili::{MetadataSource, PageIndex, VideoId, select};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::process::Command;

/// A concrete audio asset location, ready for the byte fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAsset {
    pub url: String,
    /// Segment duration, when the resolver learned it.
    pub duration_secs: Option<u32>,
}

impl ResolvedAsset {
    pub fn new(url: String) -> Self {
        Self {
            url,
            duration_secs: None,
        }
    }
}

/// Anything that can turn a raw `bv` + page into an audio asset.
///
/// Implementations validate `raw_id` with [`VideoId::parse`] before doing
/// any I/O.
#[async_trait]
pub trait AudioResolver: Send + Sync {
    async fn resolve(&self, raw_id: &str, page: PageIndex) -> Result<ResolvedAsset>;
}

/// Default pipeline: page list -> segment -> play info -> best audio.
#[derive(Debug, Clone)]
pub struct ApiResolver<S> {
    source: S,
}

struct SelectedSegment {
    id: VideoId,
    cid: u64,
    duration_secs: Option<u32>,
}

impl<S: MetadataSource> ApiResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Play-info URL the pipeline would request, without requesting it.
    pub async fn play_info_url(&self, raw_id: &str, page: PageIndex) -> Result<String> {
        let seg = self.locate(raw_id, page).await?;
        Ok(self.source.play_info_url(&seg.id, seg.cid))
    }

    async fn locate(&self, raw_id: &str, page: PageIndex) -> Result<SelectedSegment> {
        let id = VideoId::parse(raw_id)?;
        let pages = self.source.fetch_page_list(&id).await?;
        let (cid, duration_secs) = select_segment(&pages, page)?;
        Ok(SelectedSegment {
            id,
            cid,
            duration_secs,
        })
    }
}

#[async_trait]
impl<S: MetadataSource> AudioResolver for ApiResolver<S> {
    async fn resolve(&self, raw_id: &str, page: PageIndex) -> Result<ResolvedAsset> {
        let seg = self.locate(raw_id, page).await?;
        let info = self.source.fetch_play_info(&seg.id, seg.cid).await?;
        let asset = select::pick_best(&info)?;
        tracing::debug!(
            bv = %seg.id,
            %page,
            cid = seg.cid,
            candidates = info.audio.len(),
            "resolved audio"
        );
        Ok(ResolvedAsset {
            duration_secs: seg.duration_secs,
            ..asset
        })
    }
}

/// `cid` and duration of the requested 1-based page.
pub fn select_segment(doc: &PageListDocument, page: PageIndex) -> Result<(u64, Option<u32>)> {
    let idx = page.get() as usize - 1;
    let seg = doc.segments.get(idx).ok_or_else(|| {
        Error::NotFound(format!(
            "page {page} out of range ({} segments)",
            doc.segments.len()
        ))
    })?;
    let cid = seg
        .usable_cid()
        .ok_or_else(|| Error::NotFound(format!("page {page} has no cid")))?;
    Ok((cid, seg.duration))
}

/// Fallback resolver that scrapes the watch page through `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: PathBuf,
    www_base: String,
}

impl YtDlpResolver {
    pub fn new(program: PathBuf, www_base: &str) -> Self {
        Self {
            program,
            www_base: www_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl AudioResolver for YtDlpResolver {
    async fn resolve(&self, raw_id: &str, page: PageIndex) -> Result<ResolvedAsset> {
        let id = VideoId::parse(raw_id)?;

        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-f",
            "bestaudio",
            "--get-url",
            "--get-duration",
            "--no-playlist",
        ]);
        cmd.arg(format!("{}/video/{id}?p={page}", self.www_base));
        cmd.kill_on_drop(true);

        let out = cmd
            .output()
            .await
            .map_err(|e| Error::Upstream(format!("run yt-dlp: {e}")))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::Upstream(format!("yt-dlp failed: {}", stderr.trim())));
        }

        let stdout = String::from_utf8(out.stdout)
            .map_err(|e| Error::Upstream(format!("decode yt-dlp stdout: {e}")))?;
        parse_ytdlp_output(&stdout)
    }
}

/// First non-empty line is the url, the next one (if any) the duration.
fn parse_ytdlp_output(stdout: &str) -> Result<ResolvedAsset> {
    let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
    let url = lines
        .next()
        .ok_or_else(|| Error::NotFound("yt-dlp returned empty url".to_string()))?;
    Ok(ResolvedAsset {
        url: url.to_string(),
        duration_secs: lines.next().and_then(parse_duration_text),
    })
}

/// Parse duration text like "45", "3:45" or "1:23:45" into seconds.
/// Anything that does not fit in `u32` is treated as unknown.
fn parse_duration_text(text: &str) -> Option<u32> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    parts.iter().try_fold(0u32, |total, part| {
        let n: u32 = part.parse().ok()?;
        total.checked_mul(60)?.checked_add(n)
    })
}
