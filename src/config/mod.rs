use crate::transcode::AutoBitrate;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub resolver: ResolverConfig,
    pub transcode: TranscodeConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Deadline for one download: resolve, fetch and encode together.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_base: String,
    /// Also the site root the scraping resolver opens watch pages under.
    pub referer: String,
    pub user_agent: String,
    /// Connect timeout, and the whole-request timeout for metadata lookups.
    /// Asset downloads are bounded by `server.request_timeout_secs` instead.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverBackend {
    /// Player API pipeline.
    #[default]
    Api,
    /// Watch-page scraping through yt-dlp.
    YtDlp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub backend: ResolverBackend,
    pub ytdlp_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub ffmpeg_path: PathBuf,
    /// Estimate a bitrate from asset size and duration when an mp3 request
    /// leaves it out.
    pub auto_bitrate: bool,
    pub auto_min_kbps: u32,
    pub auto_max_kbps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8081)),
            request_timeout_secs: 120,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.bilibili.com".to_string(),
            referer: "https://www.bilibili.com/".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            backend: ResolverBackend::Api,
            ytdlp_path: PathBuf::from("yt-dlp"),
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        let policy = AutoBitrate::default();
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            auto_bitrate: false,
            auto_min_kbps: policy.min_kbps,
            auto_max_kbps: policy.max_kbps,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TranscodeConfig {
    /// `None` when auto bitrate is off.
    pub fn auto_policy(&self) -> anyhow::Result<Option<AutoBitrate>> {
        if !self.auto_bitrate {
            return Ok(None);
        }
        anyhow::ensure!(
            self.auto_min_kbps <= self.auto_max_kbps,
            "transcode.auto_min_kbps ({}) is above transcode.auto_max_kbps ({})",
            self.auto_min_kbps,
            self.auto_max_kbps
        );
        Ok(Some(AutoBitrate {
            min_kbps: self.auto_min_kbps,
            max_kbps: self.auto_max_kbps,
        }))
    }
}

impl LogConfig {
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj =
        ProjectDirs::from("dev", "bilitone", "bilitone").context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let cfg = Config::default();
        let raw = toml::to_string_pretty(&cfg).context("serialize default config")?;
        fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
[server]
bind = "0.0.0.0:9000"

[resolver]
backend = "yt-dlp"

[transcode]
auto_bitrate = true
auto_min_kbps = 48
auto_max_kbps = 640
"#,
        )
        .unwrap();
        assert_eq!(cfg.server.bind.port(), 9000);
        assert_eq!(cfg.server.request_timeout_secs, 120);
        assert_eq!(cfg.resolver.backend, ResolverBackend::YtDlp);
        assert_eq!(cfg.upstream.api_base, "https://api.bilibili.com");
        assert_eq!(
            cfg.transcode.auto_policy().unwrap(),
            Some(AutoBitrate {
                min_kbps: 48,
                max_kbps: 640
            })
        );
    }

    #[test]
    fn test_load_writes_defaults_when_missing() {
        let dir = std::env::temp_dir().join(format!("bilitone-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");
        let _ = fs::remove_dir_all(&dir);

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.upstream.timeout_secs, 15);
        assert!(path.exists());

        let reloaded = load(Some(&path)).unwrap();
        assert_eq!(reloaded.server.bind, cfg.server.bind);
        assert_eq!(reloaded.resolver.backend, ResolverBackend::Api);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_auto_policy_off_by_default() {
        assert_eq!(Config::default().transcode.auto_policy().unwrap(), None);
    }

    #[test]
    fn test_auto_policy_rejects_inverted_bounds() {
        let t = TranscodeConfig {
            auto_bitrate: true,
            auto_min_kbps: 320,
            auto_max_kbps: 96,
            ..TranscodeConfig::default()
        };
        assert!(t.auto_policy().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut log = LogConfig::default();
        assert_eq!(log.max_level(), tracing::Level::INFO);
        log.level = "debug".into();
        assert_eq!(log.max_level(), tracing::Level::DEBUG);
        log.level = "loud".into();
        assert_eq!(log.max_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_load_creates_default_file() {
        let path = std::env::temp_dir()
            .join(format!("bilitone-config-{}", std::process::id()))
            .join("config.toml");
        let _ = fs::remove_file(&path);

        let cfg = load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.server.bind, ServerConfig::default().bind);

        let again = load(Some(&path)).unwrap();
        assert_eq!(again.upstream.referer, cfg.upstream.referer);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
