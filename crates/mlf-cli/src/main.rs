// crates/mlf-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use std::io::{stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mlf_channel::{PainterConfig, SchedulerChoice as ChannelSchedulerChoice, VirtualFile};
use mlf_core::Transport;
use mlf_transport::HttpTransport;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "mlf-cli",
    about = "Merkle-verified lazy-materialization file CLI",
    long_about = "Open a Merkle-verified lazy-materialization virtual file against an \
                  HTTP-addressable origin, fetching and verifying only the chunks a \
                  command actually touches.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args, Debug)]
struct ChannelArgs {
    /// HTTP(S) URL of the origin content. The reference tree is fetched
    /// from this URL with `.mref` appended on first open.
    #[arg(long)]
    url: String,

    /// Path to the local `.cache` sibling file.
    #[arg(long)]
    cache: PathBuf,

    /// Path to the local `.mrkl` state sibling file.
    #[arg(long)]
    state: PathBuf,

    /// Scheduling strategy driving which nodes get fetched.
    #[arg(long, value_enum, default_value_t = SchedulerOpt::Balanced)]
    scheduler: SchedulerOpt,

    /// Maximum concurrent `fetch_range` calls.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Maximum attempts per node download before giving up.
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum SchedulerOpt {
    Conservative,
    Balanced,
    Aggressive,
    Adaptive,
}

impl From<SchedulerOpt> for ChannelSchedulerChoice {
    fn from(opt: SchedulerOpt) -> Self {
        match opt {
            SchedulerOpt::Conservative => Self::Conservative,
            SchedulerOpt::Balanced => Self::Balanced,
            SchedulerOpt::Aggressive => Self::Aggressive,
            SchedulerOpt::Adaptive => Self::Adaptive,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Open (or resume) a virtual file and report its size and verified
    /// chunk count, without reading any content bytes.
    Open {
        #[command(flatten)]
        channel: ChannelArgs,
    },

    /// Read `len` bytes starting at `offset` and write them to stdout,
    /// fetching and verifying whatever chunks are needed first.
    Cat {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Byte offset to start reading from.
        offset: u64,

        /// Number of bytes to read.
        len: u64,
    },

    /// Ensure `[offset, offset+len)` is fetched and verified without
    /// printing anything, warming the cache ahead of an anticipated read.
    Prebuffer {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Byte offset to start prebuffering from.
        offset: u64,

        /// Number of bytes to prebuffer.
        len: u64,
    },

    /// Print size, chunk size, leaf count, and verified-chunk progress.
    Stat {
        #[command(flatten)]
        channel: ChannelArgs,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(run(cli.cmd))
}

async fn run(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Open { channel } => open(channel).await,
        Cmd::Cat { channel, offset, len } => cat(channel, offset, len).await,
        Cmd::Prebuffer { channel, offset, len } => prebuffer(channel, offset, len).await,
        Cmd::Stat { channel } => stat(channel).await,
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Ensure the parent directory for a file exists.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", dir.display()))?;
        }
    }
    Ok(())
}

async fn open_channel(args: ChannelArgs) -> Result<VirtualFile> {
    if args.url.starts_with("file://") {
        bail!("file:// origins are rejected; open local files directly");
    }
    ensure_parent_dir(&args.cache)?;
    ensure_parent_dir(&args.state)?;

    let client = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;
    let content_transport = HttpTransport::new(client, args.url.as_str());
    let reference_transport = content_transport.for_reference();

    let config = PainterConfig {
        worker_count: args.workers,
        max_attempts: args.max_attempts,
        scheduler: args.scheduler.into(),
        ..PainterConfig::default()
    };

    info!(url = %args.url, cache = %args.cache.display(), state = %args.state.display(), "opening virtual file");
    let content: Arc<dyn Transport> = Arc::new(content_transport);
    let reference: Arc<dyn Transport> = Arc::new(reference_transport);
    VirtualFile::open(&args.cache, &args.state, &args.url, content, reference, config)
        .await
        .with_context(|| format!("opening virtual file for {}", args.url))
}

async fn open(args: ChannelArgs) -> Result<()> {
    let file = open_channel(args).await?;
    println!(
        "opened: size={} bytes, verified={} chunks",
        file.size(),
        file.valid_chunk_count()
    );
    file.close().await.context("closing virtual file")?;
    Ok(())
}

async fn cat(args: ChannelArgs, offset: u64, len: u64) -> Result<()> {
    let file = open_channel(args).await?;
    let mut remaining = len;
    let mut position = offset;
    let mut buf = vec![0u8; 1 << 20];
    let mut out = stdout().lock();

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = file
            .read(&mut buf[..want], position)
            .await
            .with_context(|| format!("reading {want} bytes at offset {position}"))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).context("writing to stdout")?;
        position += n as u64;
        remaining -= n as u64;
    }
    out.flush().context("flushing stdout")?;
    file.close().await.context("closing virtual file")?;
    Ok(())
}

async fn prebuffer(args: ChannelArgs, offset: u64, len: u64) -> Result<()> {
    let file = open_channel(args).await?;
    file.prebuffer(offset, len)
        .await
        .with_context(|| format!("prebuffering [{offset}, {})", offset + len))?;
    println!("prebuffered [{offset}, {})", offset + len);
    file.close().await.context("closing virtual file")?;
    Ok(())
}

async fn stat(args: ChannelArgs) -> Result<()> {
    let file = open_channel(args).await?;
    println!("size:     {} bytes", file.size());
    println!("verified: {} chunks", file.valid_chunk_count());
    println!("complete: {}", file.is_complete());
    file.close().await.context("closing virtual file")?;
    Ok(())
}
