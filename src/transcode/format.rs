use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::num::IntErrorKind;

/// Highest bitrate a caller may ask for, in kbps.
pub const MAX_BITRATE_KBPS: u32 = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Container {
    /// Stream copy into the platform's own container.
    Native,
    Mp3,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Container::Native => "m4a",
            Container::Mp3 => "mp3",
        }
    }

    pub fn reencodes(self) -> bool {
        matches!(self, Container::Mp3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TranscodeSpec {
    pub container: Container,
    pub bitrate_kbps: Option<u32>,
}

impl TranscodeSpec {
    pub const PASSTHROUGH: TranscodeSpec = TranscodeSpec {
        container: Container::Native,
        bitrate_kbps: None,
    };

    /// Re-encode with no caller bitrate: the only case an estimate can fill.
    pub fn wants_estimate(&self) -> bool {
        self.container.reencodes() && self.bitrate_kbps.is_none()
    }

    pub fn with_bitrate(self, kbps: u32) -> Self {
        Self {
            bitrate_kbps: Some(kbps),
            ..self
        }
    }
}

/// Map raw `bitrate`/`format` query strings onto a [`TranscodeSpec`].
///
/// Empty strings mean "absent". The bitrate ceiling is checked before the
/// format, so an oversized bitrate is `Forbidden` whatever the format.
pub fn negotiate(raw_bitrate: &str, raw_format: &str) -> Result<TranscodeSpec> {
    let raw_bitrate = raw_bitrate.trim();
    let bitrate_kbps = if raw_bitrate.is_empty() {
        None
    } else {
        let kbps = match raw_bitrate.parse::<u32>() {
            Ok(kbps) if kbps <= MAX_BITRATE_KBPS => kbps,
            Ok(_) => return Err(ceiling_exceeded(raw_bitrate)),
            // Too many digits for u32 is still just a large number.
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
                return Err(ceiling_exceeded(raw_bitrate));
            }
            Err(_) => {
                return Err(Error::BadRequest(format!(
                    "invalid bitrate: {raw_bitrate:?}"
                )));
            }
        };
        Some(kbps)
    };

    let raw_format = raw_format.trim();
    let container = if raw_format.is_empty() {
        Container::Native
    } else if raw_format.eq_ignore_ascii_case("mp3") {
        Container::Mp3
    } else {
        return Err(Error::BadRequest(format!(
            "unsupported format: {raw_format:?}"
        )));
    };

    Ok(match (container, bitrate_kbps) {
        (Container::Native, None) => TranscodeSpec::PASSTHROUGH,
        _ => TranscodeSpec {
            container,
            bitrate_kbps,
        },
    })
}

fn ceiling_exceeded(raw_bitrate: &str) -> Error {
    Error::Forbidden(format!(
        "bitrate {raw_bitrate} exceeds {MAX_BITRATE_KBPS} kbps"
    ))
}

/// Clamp bounds for the size/duration bitrate estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBitrate {
    pub min_kbps: u32,
    pub max_kbps: u32,
}

impl Default for AutoBitrate {
    fn default() -> Self {
        Self {
            min_kbps: 96,
            max_kbps: MAX_BITRATE_KBPS,
        }
    }
}

/// `size * 8 / 1024 / duration`, clamped to the policy. Unknown or zero
/// duration gives the policy maximum.
pub fn estimate_bitrate(size_bytes: usize, duration_secs: Option<u32>, policy: AutoBitrate) -> u32 {
    let Some(duration) = duration_secs.filter(|&d| d > 0) else {
        return policy.max_kbps;
    };
    let kbps = size_bytes as f64 * 8.0 / 1024.0 / duration as f64;
    (kbps as u64).clamp(policy.min_kbps as u64, policy.max_kbps as u64) as u32
}
