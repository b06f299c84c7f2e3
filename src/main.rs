use anyhow::{Context, Result};
use clap::Parser;
use proxy_harvest::{
    logging,
    proxy::{
        status::StatusReceiver, status_channel, Protocol, ProxyFetcher, ProxyParser, ProxyRecord,
        ProxyValidator, Reporter, StatusUpdate, ValidationConfig,
    },
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

const DEBUG_LOG_FILE: &str = "debug.txt";

/// Collects public proxies and keeps the ones that actually work
#[derive(Parser)]
#[command(name = "proxy-harvest")]
#[command(about = "Collects public proxies and keeps the ones that actually work")]
struct Cli {
    /// Number of valid proxies to find (0 = no limit)
    #[arg(long = "proxy", default_value = "0")]
    limit: usize,

    /// Only check this proxy type: http, socks4, socks5
    #[arg(short = 't', long = "type")]
    proxy_type: Option<String>,

    /// Number of times to validate each proxy
    #[arg(long, default_value = "1")]
    validations: u32,

    /// Output file for valid proxies
    #[arg(short, long, default_value = "valid_proxies.txt")]
    file: PathBuf,

    /// Number of concurrent threads
    #[arg(short = 'n', long, default_value = "10")]
    threads: usize,

    /// Timeout in seconds for checking
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// URL to use for checking proxy connectivity
    #[arg(long, default_value = "https://www.google.com")]
    check_url: String,

    /// Enable debug logging to debug.txt
    #[arg(long)]
    debug: bool,

    /// Local proxy list files to check (can specify multiple)
    #[arg(short, long)]
    input: Vec<PathBuf>,

    /// Proxy type assumed for lines of --input files without a scheme
    #[arg(long, default_value = "http")]
    input_type: String,

    /// Skip the built-in remote proxy lists
    #[arg(long)]
    no_remote: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // held until main returns so the debug file is flushed on every path
    let _log_guard = logging::init(cli.debug.then(|| Path::new(DEBUG_LOG_FILE)))?;

    let config = ValidationConfig::new()
        .with_target_url(cli.check_url.clone())
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_rounds(cli.validations)
        .with_concurrency(cli.threads)
        .with_valid_limit(cli.limit)
        .with_protocol_filter(cli.proxy_type.clone());
    let validator = ProxyValidator::new(config)?;

    let mut output = File::create(&cli.file)
        .with_context(|| format!("failed to open output file {:?}", cli.file))?;

    let (status_tx, status_rx) = status_channel();
    let reporter = Reporter::new(Some(status_tx));
    let printer = tokio::spawn(print_status(status_rx));

    let (tx, rx) = mpsc::channel(64);
    let collector = tokio::spawn(collect_candidates(
        cli.input.clone(),
        Protocol::from_tag(&cli.input_type),
        !cli.no_remote,
        tx,
        reporter.clone(),
    ));

    let result = validator.run_stream(rx, &mut output, reporter).await;

    collector.await?;
    printer.await?;

    let summary = result?;
    println!(
        "\nChecked: {} | Valid: {} | Saved to {:?}",
        summary.checked, summary.valid, cli.file
    );

    Ok(())
}

/// Feed local files and remote lists into the dedup channel
async fn collect_candidates(
    inputs: Vec<PathBuf>,
    input_protocol: Protocol,
    remote: bool,
    tx: mpsc::Sender<Vec<ProxyRecord>>,
    reporter: Reporter,
) {
    for path in &inputs {
        let source = path.display().to_string();
        match ProxyParser::parse_file(path, &input_protocol, &source) {
            Ok(records) => {
                reporter.log(format!("Loaded {} proxies from {}", records.len(), source));
                if tx.send(records).await.is_err() {
                    return;
                }
            }
            Err(e) => reporter.log(format!("Error reading {source}: {e}")),
        }
    }

    if !remote {
        return;
    }

    match ProxyFetcher::new() {
        Ok(fetcher) => {
            let sources = ProxyFetcher::default_sources();
            fetcher.fetch_all(&sources, tx, &reporter).await;
        }
        Err(e) => reporter.log(format!("Error creating fetcher: {e}")),
    }
}

/// Console reporter: log lines as they come, progress in whole percents
async fn print_status(mut rx: StatusReceiver) {
    let mut last_percent = None;

    while let Some(update) = rx.recv().await {
        match update {
            StatusUpdate::Log(line) => println!("{line}"),
            StatusUpdate::Progress {
                checked,
                total,
                valid,
            } => {
                let percent = if total > 0 { checked * 100 / total } else { 0 };
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    println!(
                        "Checking... {}% | Valid: {} | Checked: {} / {}",
                        percent, valid, checked, total
                    );
                }
            }
            StatusUpdate::Finished(summary) => {
                let state = if summary.cancelled { "Stopped" } else { "Done" };
                println!(
                    "{}! Valid: {} | Checked: {} / {}",
                    state, summary.valid, summary.checked, summary.total
                );
            }
        }
    }
}
