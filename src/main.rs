//! docmark - document to markdown conversion service
//!
//! CLI entry point

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docmark::{
    Coordinator, NullSink, PoolConfig, ServerConfig, ServiceConfig, WebServer, WorkerPool,
};

#[derive(Parser)]
#[command(name = "docmark", version, about = "Convert documents to markdown")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP conversion service
    Serve(ServeArgs),
    /// Convert a single file and print the markdown
    Convert(ConvertArgs),
    /// Internal: conversion worker child process
    #[command(hide = true)]
    Worker,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, short, default_value_t = 8000)]
    port: u16,

    /// Number of worker processes
    #[arg(long)]
    workers: Option<usize>,

    /// Maximum upload size in bytes
    #[arg(long)]
    max_file_size: Option<u64>,

    /// Per-conversion deadline in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct ConvertArgs {
    /// Input document
    input: PathBuf,

    /// Write markdown here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Preserve data: URIs in the output
    #[arg(long)]
    keep_data_uris: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The worker speaks the framed protocol on stdout, so it gets no
    // logging setup and no runtime.
    if matches!(cli.command, Commands::Worker) {
        return Ok(docmark::worker::child::run_worker()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Serve(args) => runtime.block_on(run_serve(args)),
        Commands::Convert(args) => runtime.block_on(run_convert(args)),
        Commands::Worker => unreachable!(),
    }
}

fn service_config(args: &ServeArgs) -> ServiceConfig {
    let mut config = ServiceConfig::from_env();
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
    }
    if let Some(limit) = args.max_file_size {
        config = config.with_max_file_size(limit);
    }
    if let Some(secs) = args.timeout {
        config = config.with_request_timeout(secs);
    }
    config.clamped()
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let listen = ServerConfig::default()
        .with_bind(args.bind.clone())
        .with_port(args.port);
    let server = WebServer::new(listen, service_config(&args))?;
    server.run().await
}

async fn run_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let content = std::fs::read(&args.input)?;
    let filename = args
        .input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let config = ServiceConfig::from_env().with_worker_count(1).clamped();
    let pool = Arc::new(WorkerPool::new(PoolConfig::from_current_exe(1)?));
    pool.start().await?;

    let coordinator = Coordinator::new(config.clone(), pool.clone(), Arc::new(NullSink));
    let result = coordinator
        .convert_file(content, &filename, docmark::ConvertOptions {
            keep_data_uris: args.keep_data_uris,
            ..Default::default()
        })
        .await;
    pool.shutdown(config.shutdown_grace()).await;
    let result = result?;

    match &args.output {
        Some(path) => std::fs::write(path, &result.markdown)?,
        None => println!("{}", result.markdown),
    }
    Ok(())
}
