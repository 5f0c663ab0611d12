use crate::bili::models::{AudioCandidate, PlayInfoDocument};
use crate::bili::resolve::ResolvedAsset;
use crate::error::{Error, Result};

/// Highest-`bandwidth` audio candidate. Only a strictly greater bandwidth
/// replaces the running best, so ties go to the earliest entry.
pub fn pick_best(doc: &PlayInfoDocument) -> Result<ResolvedAsset> {
    best_by_bandwidth(&doc.audio)
        .map(|c| ResolvedAsset::new(c.url.clone()))
        .ok_or_else(|| Error::NotFound("no audio stream in play info".to_string()))
}

/// Lossless tier only. Never consulted by [`pick_best`].
pub fn pick_lossless(doc: &PlayInfoDocument) -> Result<ResolvedAsset> {
    doc.lossless
        .as_ref()
        .map(|c| ResolvedAsset::new(c.url.clone()))
        .ok_or_else(|| Error::NotFound("no lossless audio in document".to_string()))
}

fn best_by_bandwidth(candidates: &[AudioCandidate]) -> Option<&AudioCandidate> {
    let mut best: Option<&AudioCandidate> = None;
    for c in candidates {
        if best.map(|b| c.bandwidth > b.bandwidth).unwrap_or(true) {
            best = Some(c);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(bandwidth: u64, url: &str) -> AudioCandidate {
        AudioCandidate {
            bandwidth,
            url: url.to_string(),
        }
    }

    fn doc(audio: Vec<AudioCandidate>) -> PlayInfoDocument {
        PlayInfoDocument {
            audio,
            lossless: None,
        }
    }

    #[test]
    fn test_higher_bandwidth_wins() {
        let mut d = doc(vec![cand(100, "A")]);
        assert_eq!(pick_best(&d).unwrap().url, "A");

        d.audio.push(cand(50, "B"));
        assert_eq!(pick_best(&d).unwrap().url, "A");

        d.audio.push(cand(150, "C"));
        assert_eq!(pick_best(&d).unwrap().url, "C");
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let d = doc(vec![cand(10, "low"), cand(200, "first"), cand(200, "second")]);
        for _ in 0..3 {
            assert_eq!(pick_best(&d).unwrap().url, "first");
        }
    }

    #[test]
    fn test_zero_bandwidth_candidate_is_still_a_candidate() {
        let d = doc(vec![cand(0, "only")]);
        assert_eq!(pick_best(&d).unwrap().url, "only");
    }

    #[test]
    fn test_empty_is_not_found() {
        assert!(matches!(pick_best(&doc(vec![])), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_lossless_is_separate() {
        let mut d = doc(vec![cand(100, "lossy")]);
        assert!(matches!(pick_lossless(&d), Err(Error::NotFound(_))));

        d.lossless = Some(cand(900, "flac"));
        assert_eq!(pick_lossless(&d).unwrap().url, "flac");
        // The regular pick ignores the lossless tier even when it is richer.
        assert_eq!(pick_best(&d).unwrap().url, "lossy");
    }
}
