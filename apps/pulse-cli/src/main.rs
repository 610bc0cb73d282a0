use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use device_transport::{DeviceClient, MockClient, MockDevice};
use playback::{
    load_config_file, DisplayValue, MessageId, PlaybackConfig, PresentationSink, RecordingSink,
    Session, SharedMessage, TracingSink,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "pulse",
    version,
    about = "Find device commands in chat text and play them back",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every command found in a text file as JSON, one per line
    Scan {
        file: PathBuf,
        /// Pretty-print each occurrence
        #[arg(long, action = ArgAction::SetTrue)]
        pretty: bool,
    },
    /// Stream a text file into a playback session driving a mock device
    Play {
        file: PathBuf,
        /// Characters per streamed chunk
        #[arg(long, default_value_t = 12)]
        chunk: usize,
        /// Delay between streamed chunks
        #[arg(long, default_value_t = 80)]
        chunk_interval_ms: u64,
        /// YAML playback configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Replay the message until interrupted
        #[arg(long, action = ArgAction::SetTrue)]
        loop_mode: bool,
        /// Reading speed override, characters per second
        #[arg(long)]
        speed: Option<f64>,
        /// Vibration motors on the mock device
        #[arg(long, default_value_t = 2)]
        motors: usize,
        /// Print Prometheus metrics when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
        /// Print every status line with its timestamp when done
        #[arg(long, action = ArgAction::SetTrue)]
        transcript: bool,
    },
    /// Print the effective playback configuration as YAML
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<PlaybackConfig> {
    match path {
        Some(p) => load_config_file(p),
        None => Ok(PlaybackConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { file, pretty } => scan_file(&file, pretty),
        Commands::Play {
            file,
            chunk,
            chunk_interval_ms,
            config,
            loop_mode,
            speed,
            motors,
            metrics,
            transcript,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(cps) = speed {
                cfg.reading_speed_cps = cps;
            }
            cfg.loop_enabled |= loop_mode;
            let opts = PlayOptions {
                chunk: chunk.max(1),
                chunk_interval: Duration::from_millis(chunk_interval_ms),
                motors,
                metrics,
                transcript,
            };
            play_file(&file, cfg, opts).await
        }
        Commands::Config { config } => {
            let cfg = load_config(config.as_deref())?;
            print!("{}", cfg.to_yaml()?);
            Ok(())
        }
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading text: {}", path.display()))
}

fn scan_file(path: &Path, pretty: bool) -> Result<()> {
    let text = read_text(path)?;
    let scanner = command_scanner::Scanner::new()?;
    for occ in scanner.scan(&text) {
        let line = if pretty {
            serde_json::to_string_pretty(&occ)?
        } else {
            serde_json::to_string(&occ)?
        };
        println!("{line}");
    }
    Ok(())
}

struct PlayOptions {
    chunk: usize,
    chunk_interval: Duration,
    motors: usize,
    metrics: bool,
    transcript: bool,
}

/// Logs presentation output and keeps the status lines for the transcript.
#[derive(Default)]
struct CliSink {
    log: TracingSink,
    record: RecordingSink,
}

impl PresentationSink for CliSink {
    fn status(&self, text: &str) {
        self.log.status(text);
        self.record.status(text);
    }

    fn display(&self, value: DisplayValue) {
        self.log.display(value);
    }

    fn highlight(&self, element: MessageId, start: usize, len: usize, color: &str) {
        self.log.highlight(element, start, len, color);
    }

    fn progress_frame(
        &self,
        element: MessageId,
        from: usize,
        current: usize,
        to: usize,
        color: &str,
    ) {
        self.log.progress_frame(element, from, current, to, color);
    }
}

async fn play_file(path: &Path, cfg: PlaybackConfig, opts: PlayOptions) -> Result<()> {
    let text = read_text(path)?;
    let loop_mode = cfg.loop_enabled;
    let settle = cfg.poll_interval() * 2;
    let sink = Arc::new(CliSink::default());
    let session = Session::new(cfg, sink.clone())?;

    let device = Arc::new(MockDevice::full(0, "mock", opts.motors));
    let client = Arc::new(MockClient::new(vec![device.clone()]));
    let stop = CancellationToken::new();

    let follower = {
        let session = session.clone();
        let client = client.clone();
        let stop = stop.clone();
        tokio::spawn(async move { session.follow_client(client.as_ref(), stop).await })
    };
    tokio::task::yield_now().await;
    client.connect().await?;
    client.start_scanning().await?;

    let source = Arc::new(SharedMessage::new());
    let poller = {
        let session = session.clone();
        let source = source.clone();
        let stop = stop.clone();
        tokio::spawn(async move { session.run_poller(source, stop).await })
    };

    info!(file = %path.display(), chars = text.chars().count(), "streaming message");
    source.begin(MessageId(1));
    let chars: Vec<char> = text.chars().collect();
    for piece in chars.chunks(opts.chunk) {
        source.push_str(&piece.iter().collect::<String>());
        tokio::time::sleep(opts.chunk_interval).await;
    }
    tokio::time::sleep(settle).await;

    if loop_mode {
        info!("loop mode on, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("waiting for Ctrl-C")?;
    } else {
        session.wait_idle().await;
    }

    if let Err(e) = session.stop_all().await {
        warn!(error = %e, "failed to stop device");
    }
    stop.cancel();
    poller.await?;
    follower.await?;
    client.disconnect().await?;

    println!(
        "played {} commands, {} device calls",
        session.seen_len(),
        device.calls().len()
    );
    if opts.transcript {
        for event in sink.record.status_events() {
            let at = event.at.format(&Rfc3339).unwrap_or_default();
            println!("{at} {}", event.text);
        }
    }
    if opts.metrics {
        print!("{}", session.metrics().encode_text());
    }
    Ok(())
}
