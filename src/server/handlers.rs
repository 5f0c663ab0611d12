use crate::bili::models::PlayInfoDocument;
use crate::bili::{MetadataError, PageIndex, select};
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::transcode::negotiate;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    bv: Option<String>,
    p: Option<String>,
    bitrate: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    bv: Option<String>,
    p: Option<String>,
}

pub async fn download(
    State(state): State<AppState>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response> {
    // Negotiate first: a bad format/bitrate must not cost an upstream call.
    let spec = negotiate(
        q.bitrate.as_deref().unwrap_or_default(),
        q.format.as_deref().unwrap_or_default(),
    )?;
    let raw_id = q.bv.as_deref().unwrap_or_default();
    let page = PageIndex::from_query(q.p.as_deref());

    let audio = state
        .with_deadline("download", state.transcode(raw_id, page, spec))
        .await?;
    tracing::info!(bv = raw_id, %page, ?spec, bytes = audio.len(), "audio served");

    let disposition = format!("attachment; filename=audio.{}", spec.container.extension());
    Ok((
        [
            (CONTENT_TYPE, "audio/mpeg".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        audio,
    )
        .into_response())
}

pub async fn play_url(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Value>> {
    let raw_id = q.bv.as_deref().unwrap_or_default();
    let page = PageIndex::from_query(q.p.as_deref());
    let url = state
        .with_deadline("playurl", state.api.play_info_url(raw_id, page))
        .await?;
    Ok(Json(json!({ "url": url })))
}

/// Lossless-tier url from a play-info document the caller fetched with its
/// own session.
pub async fn lossless(body: Bytes) -> Result<Json<Value>> {
    let doc = PlayInfoDocument::from_json(&body).map_err(|e| match e {
        MetadataError::Api { code, message } => {
            Error::BadRequest(format!("document carries error code {code}: {message}"))
        }
        other => Error::BadRequest(format!("unreadable play info document: {other}")),
    })?;
    let asset = select::pick_lossless(&doc)?;
    Ok(Json(json!({ "url": asset.url })))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
