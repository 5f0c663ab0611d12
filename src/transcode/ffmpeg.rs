use crate::error::{Error, Result};
use crate::transcode::format::{Container, TranscodeSpec};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// External audio encoder: bytes in, encoded bytes out.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// `source_format` is the demuxer name of `input` (e.g. `mp4`).
    async fn encode(
        &self,
        input: Vec<u8>,
        source_format: &str,
        spec: &TranscodeSpec,
    ) -> Result<Vec<u8>>;
}

/// Runs one `ffmpeg` process per job over stdin/stdout pipes.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

/// ffmpeg arguments for one job, reading `pipe:0` and writing `pipe:1`.
pub fn ffmpeg_args(source_format: &str, spec: &TranscodeSpec) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-f", source_format]
        .into_iter()
        .map(String::from)
        .collect();
    args.extend(["-i", "pipe:0", "-vn"].map(String::from));

    match spec.container {
        Container::Native => {
            // mp4 needs a fragmented layout to be written to a pipe.
            args.extend(
                ["-c:a", "copy", "-f", "mp4", "-movflags", "frag_keyframe+empty_moov"]
                    .map(String::from),
            );
        }
        Container::Mp3 => {
            args.extend(["-c:a", "libmp3lame", "-f", "mp3"].map(String::from));
        }
    }
    if let Some(kbps) = spec.bitrate_kbps {
        args.push("-b:a".to_string());
        args.push(format!("{kbps}k"));
    }
    args.push("pipe:1".to_string());
    args
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        input: Vec<u8>,
        source_format: &str,
        spec: &TranscodeSpec,
    ) -> Result<Vec<u8>> {
        let args = ffmpeg_args(source_format, spec);
        tracing::debug!(
            program = %self.program.display(),
            ?args,
            input_bytes = input.len(),
            "spawn encoder"
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the job (client gone, deadline hit) must stop the process.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Encode(format!("spawn {}: {e}", self.program.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Encode("encoder stdin unavailable".to_string()))?;

        // Feed stdin while draining stdout, otherwise a full pipe deadlocks both sides.
        let feed = async move {
            let res = stdin.write_all(&input).await;
            drop(stdin);
            res
        };
        let (fed, out) = tokio::join!(feed, child.wait_with_output());

        let out = out.map_err(|e| Error::Encode(format!("wait for encoder: {e}")))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::Encode(format!(
                "encoder exited with {}: {}",
                out.status,
                stderr.trim()
            )));
        }
        fed.map_err(|e| Error::Encode(format!("write encoder input: {e}")))?;
        if out.stdout.is_empty() {
            return Err(Error::Encode("encoder produced no output".to_string()));
        }
        Ok(out.stdout)
    }
}
