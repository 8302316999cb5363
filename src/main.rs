use anyhow::{Context, Result};
use board_relay::app::App;
use board_relay::config::Config;
use board_relay::models::{HostEvent, ImageReply, PostEvent, UploadEvent};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "board-relay")]
#[command(about = "Forward forum posts and uploads to Kafka and S3")]
struct CliArgs {
    /// Plugin settings file (JSON object); overrides environment variables.
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forward one "post created" event.
    Post {
        /// Event JSON file; stdin when omitted or "-".
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Relocate and forward one "image uploaded" event, printing the new reference.
    Upload {
        /// Event JSON file; stdin when omitted or "-".
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },
    /// Handle newline-delimited tagged events from stdin concurrently.
    Stream,
    /// Initialize connections and exit.
    Check,
}

async fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

async fn read_event<T: DeserializeOwned>(input: Option<&Path>) -> Result<T> {
    let json = read_input(input).await?;
    serde_json::from_str(&json).context("Invalid event payload")
}

/// Handle newline-delimited events from `input`, one task per event, writing
/// one reply line per event to `output`. Returns `output` once every task
/// has finished.
async fn run_stream<R, W>(app: Arc<App>, input: R, output: W) -> Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = rx.recv().await {
            if let Err(e) = output.write_all(format!("{}\n", line).as_bytes()).await {
                error!("Failed to write reply: {}", e);
                break;
            }
            if let Err(e) = output.flush().await {
                error!("Failed to flush reply: {}", e);
                break;
            }
        }
        output
    });

    let mut tasks = JoinSet::new();
    let mut reader = BufReader::new(input);
    let mut buf = Vec::new();
    let mut read_error = None;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Stopped reading events: {}", e);
                read_error = Some(e);
                break;
            }
        }

        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let event: HostEvent = match serde_json::from_slice(&buf) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event: {}", e);
                let reply = serde_json::json!({"error": format!("malformed event: {}", e)});
                let _ = tx.send(reply.to_string());
                continue;
            }
        };

        let app = Arc::clone(&app);
        let tx = tx.clone();
        tasks.spawn(async move {
            let reply = app.handle(event).await;
            match serde_json::to_string(&reply) {
                Ok(line) => {
                    let _ = tx.send(line);
                }
                Err(e) => error!("Failed to serialize reply: {}", e),
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Event task panicked: {}", e);
        }
    }

    drop(tx);
    let output = writer.await?;

    match read_error {
        Some(e) => Err(anyhow::Error::new(e).context("Failed to read events from stdin")),
        None => Ok(output),
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = Config::load(args.settings.as_deref())?;
    let app = App::new(&config).await?;

    match args.command {
        Command::Post { input } => {
            let event: PostEvent = read_event(input.as_deref()).await?;
            let key = app.handle_post(event).await?;
            info!("Post {} forwarded", key);
        }
        Command::Upload { input } => {
            let event: UploadEvent = read_event(input.as_deref()).await?;
            let report = app.handle_upload(event).await?;
            if let Some(e) = &report.publish_error {
                warn!("Upload kept remote but event not forwarded: {}", e);
            }
            let reply: &ImageReply = &report.reply;
            println!("{}", serde_json::to_string(reply)?);
        }
        Command::Stream => {
            run_stream(Arc::new(app), tokio::io::stdin(), tokio::io::stdout()).await?;
        }
        Command::Check => info!("Initialization succeeded"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "board_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
