mod bili;
mod config;
mod error;
mod server;
mod transcode;

use anyhow::Context;
use bili::{MetadataSource, PageIndex, VideoId};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bilitone", version, about = "bilibili audio extraction service")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Override `server.bind`.
        #[arg(long)]
        bind: Option<std::net::SocketAddr>,
    },
    /// List the segments of a video (headless).
    Pages { bv: String },
    /// Print the resolved audio asset url (headless).
    Resolve {
        bv: String,
        #[arg(short, long)]
        page: Option<String>,
    },
    /// Print the play-info request url without fetching it (headless).
    PlayUrl {
        bv: String,
        #[arg(short, long)]
        page: Option<String>,
    },
    /// Print the lossless-tier url from a saved play-info document.
    Lossless { path: std::path::PathBuf },
    /// Download and encode one segment to a file (headless).
    Fetch {
        bv: String,
        #[arg(short, long)]
        page: Option<String>,
        #[arg(long, default_value = "")]
        bitrate: String,
        #[arg(long, default_value = "")]
        format: String,
        /// Output path; defaults to `<bv>.<ext>`.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(cfg.log.max_level())
        .init();

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            server::run(&cfg, bind.unwrap_or(cfg.server.bind)).await?;
        }
        Command::Pages { bv } => {
            let client = bili::api::BiliClient::new(&cfg.upstream)?;
            let id = VideoId::parse(&bv)?;
            let pages = client.fetch_page_list(&id).await?;
            for (i, seg) in pages.segments.iter().enumerate() {
                println!(
                    "{:02}. {}  (cid={}, {}s)",
                    seg.page.unwrap_or(i as u32 + 1),
                    seg.part.as_deref().unwrap_or("untitled"),
                    seg.cid.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                    seg.duration.unwrap_or(0)
                );
            }
        }
        Command::Resolve { bv, page } => {
            let state = server::AppState::from_config(&cfg)?;
            let asset = state
                .resolver
                .resolve(&bv, PageIndex::from_query(page.as_deref()))
                .await?;
            println!("{}", asset.url);
        }
        Command::PlayUrl { bv, page } => {
            let state = server::AppState::from_config(&cfg)?;
            let url = state
                .api
                .play_info_url(&bv, PageIndex::from_query(page.as_deref()))
                .await?;
            println!("{url}");
        }
        Command::Lossless { path } => {
            let raw = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let doc = bili::models::PlayInfoDocument::from_json(&raw)?;
            let asset = bili::select::pick_lossless(&doc)?;
            println!("{}", asset.url);
        }
        Command::Fetch {
            bv,
            page,
            bitrate,
            format,
            output,
        } => {
            let spec = transcode::negotiate(&bitrate, &format)?;
            let state = server::AppState::from_config(&cfg)?;
            let audio = state
                .with_deadline(
                    "fetch",
                    state.transcode(&bv, PageIndex::from_query(page.as_deref()), spec),
                )
                .await?;
            let path = output
                .unwrap_or_else(|| format!("{bv}.{}", spec.container.extension()).into());
            save_audio(&path, &audio).with_context(|| format!("write {}", path.display()))?;
            println!("Wrote {} bytes to {}", audio.len(), path.display());
        }
    }

    Ok(())
}

fn save_audio(path: &std::path::Path, audio: &[u8]) -> error::Result<()> {
    std::fs::write(path, audio)?;
    Ok(())
}
