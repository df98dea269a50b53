use clap::Parser;
use log_tail::{TailMessage, TailOptions, tail_file};
use std::path::PathBuf;
use std::process;
use tokio_stream::StreamExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "log-tail")]
#[command(about = "Print the last lines of a file, then follow it as it grows")]
#[command(version)]
struct Cli {
    /// File to follow
    path: PathBuf,

    /// Number of recent lines to show first
    #[arg(short = 'n', long = "lines", default_value_t = 10)]
    lines: usize,

    /// Window size in bytes for the backward scan
    #[arg(long, default_value_t = 512)]
    chunk_size: usize,

    /// Messages buffered before the oldest are dropped
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,

    /// Print every message as a JSON object
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("log_tail=info")))
        .init();

    let cli = Cli::parse();
    let options = TailOptions::default()
        .with_backlog_size(cli.lines)
        .with_chunk_size(cli.chunk_size)
        .with_queue_capacity(cli.queue_capacity);

    let mut observer = match tail_file(&cli.path, options).await {
        Ok(observer) => observer,
        Err(e) => {
            eprintln!("Error setting up file watcher: {}", e);
            process::exit(1);
        }
    };

    while let Some(message) = observer.next().await {
        if cli.json {
            match message.to_json() {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!(error = %e, "Failed to encode message"),
            }
            continue;
        }

        match message {
            TailMessage::Snapshot { lines } | TailMessage::Batch { lines } => {
                for line in lines {
                    println!("{}", line);
                }
            }
            TailMessage::Reset { lines } => {
                eprintln!("--- {} truncated ---", cli.path.display());
                for line in lines {
                    println!("{}", line);
                }
            }
            TailMessage::Gap { missed } => eprintln!("--- {} messages dropped ---", missed),
            TailMessage::Stalled { reason } => eprintln!("--- stalled: {} ---", reason),
            TailMessage::Resumed => eprintln!("--- resumed ---"),
        }
    }
}
