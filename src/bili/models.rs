use super::MetadataError;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};

/// One part of a multi-part video.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default)]
    pub cid: Option<u64>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub part: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
}

impl Segment {
    /// `cid` 0 is what the platform sends for a segment it cannot play.
    pub fn usable_cid(&self) -> Option<u64> {
        self.cid.filter(|&c| c != 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageListDocument {
    pub segments: Vec<Segment>,
}

impl PageListDocument {
    pub fn from_json(body: &[u8]) -> Result<Self, MetadataError> {
        let segments: Vec<Segment> = parse_envelope(body)?;
        Ok(Self { segments })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCandidate")]
pub struct AudioCandidate {
    pub bandwidth: u64,
    pub url: String,
}

/// The platform sends both spellings of the url field on the same entry.
#[derive(Deserialize)]
struct RawCandidate {
    bandwidth: u64,
    #[serde(rename = "baseUrl", default)]
    base_url_camel: Option<String>,
    #[serde(rename = "base_url", default)]
    base_url_snake: Option<String>,
}

impl TryFrom<RawCandidate> for AudioCandidate {
    type Error = String;

    fn try_from(raw: RawCandidate) -> Result<Self, Self::Error> {
        let url = raw
            .base_url_camel
            .or(raw.base_url_snake)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| "audio entry without baseUrl".to_string())?;
        Ok(Self {
            bandwidth: raw.bandwidth,
            url,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlayInfoDocument {
    /// Regular DASH audio tier, in document order.
    pub audio: Vec<AudioCandidate>,
    /// Lossless (`flac`) tier, when the document carries one.
    pub lossless: Option<AudioCandidate>,
}

impl PlayInfoDocument {
    pub fn from_json(body: &[u8]) -> Result<Self, MetadataError> {
        let data: PlayInfoData = parse_envelope(body)?;
        let dash = data.dash.unwrap_or_default();
        Ok(Self {
            audio: dash.audio,
            lossless: dash.flac.and_then(|f| f.audio),
        })
    }
}

#[derive(Deserialize)]
struct PlayInfoData {
    #[serde(default)]
    dash: Option<Dash>,
}

#[derive(Deserialize, Default)]
struct Dash {
    #[serde(default, deserialize_with = "lenient_list")]
    audio: Vec<AudioCandidate>,
    #[serde(default)]
    flac: Option<Flac>,
}

#[derive(Deserialize)]
struct Flac {
    #[serde(default, deserialize_with = "lenient_one")]
    audio: Option<AudioCandidate>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Valid(T),
    Malformed(IgnoredAny),
}

impl<T> Lenient<T> {
    fn into_valid(self) -> Option<T> {
        match self {
            Lenient::Valid(v) => Some(v),
            Lenient::Malformed(_) => None,
        }
    }
}

fn lenient_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw = Option::<Vec<Lenient<T>>>::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(Lenient::into_valid)
        .collect())
}

fn lenient_one<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Lenient<T>>::deserialize(d)?.and_then(Lenient::into_valid))
}

#[derive(Deserialize)]
struct Head {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Checks the `code` field first so an error envelope is not reported as a
/// shape mismatch on `data`.
fn parse_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T, MetadataError> {
    let head: Head =
        serde_json::from_slice(body).map_err(|e| MetadataError::Parse(e.to_string()))?;
    if head.code != 0 {
        return Err(MetadataError::Api {
            code: head.code,
            message: head.message,
        });
    }
    let env: Envelope<T> =
        serde_json::from_slice(body).map_err(|e| MetadataError::Parse(e.to_string()))?;
    Ok(env.data)
}
