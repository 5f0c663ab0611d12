//! bilibili metadata access and audio resolution.
//!
//! - [`api::BiliClient`]: the two metadata calls plus the raw asset fetch
//! - [`select`]: picking an audio candidate out of a play-info document
//! - [`resolve`]: the "video id + page -> asset url" resolvers

pub mod api;
pub mod models;
pub mod resolve;
pub mod select;

use crate::error::{Error, Result};
use async_trait::async_trait;
use models::{PageListDocument, PlayInfoDocument};
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("api error: code={code}: {message}")]
    Api { code: i64, message: String },
}

impl From<reqwest::Error> for MetadataError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// The two upstream metadata lookups the resolution pipeline depends on.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Play-info request URL for a segment. Built locally, never fetched here.
    fn play_info_url(&self, id: &VideoId, cid: u64) -> String;

    async fn fetch_page_list(
        &self,
        id: &VideoId,
    ) -> std::result::Result<PageListDocument, MetadataError>;

    async fn fetch_play_info(
        &self,
        id: &VideoId,
        cid: u64,
    ) -> std::result::Result<PlayInfoDocument, MetadataError>;
}

/// A validated `BV` identifier: `BV` followed by ten ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    const PREFIX: &'static str = "BV";
    const LEN: usize = 12;

    pub fn parse(raw: &str) -> Result<Self> {
        let valid = raw.len() == Self::LEN
            && raw.starts_with(Self::PREFIX)
            && raw[Self::PREFIX.len()..]
                .bytes()
                .all(|b| b.is_ascii_alphanumeric());
        if !valid {
            return Err(Error::BadRequest(format!("invalid BV id: {raw:?}")));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1-based segment index of a multi-part video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageIndex(u32);

impl PageIndex {
    pub const FIRST: PageIndex = PageIndex(1);

    /// Absent, unparsable or zero input falls back to the first page.
    pub fn from_query(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<u32>().ok())
            .and_then(Self::new)
            .unwrap_or(Self::FIRST)
    }

    pub fn new(n: u32) -> Option<Self> {
        (n >= 1).then_some(Self(n))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PageIndex {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
