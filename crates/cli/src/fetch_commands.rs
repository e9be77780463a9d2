//! `chainscope fetch`: resolve records through the scrape service.

use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use {
    anyhow::{Context, Result},
    chainscope_browser::{BrowserConfig, ChromiumFactory},
    chainscope_config::ChainscopeConfig,
    chainscope_metrics::{MetricsRecorderConfig, init_metrics},
    chainscope_scrape::{
        CacheEntry, Expiration, FailureKind, ScrapeFailure, ScrapeKey, ScrapeKind, ScrapeService,
    },
    clap::Args,
    futures::future::join_all,
    tracing::{info, warn},
};

use crate::render::{self, Format};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// What to fetch: quote, expirations or chain.
    #[arg(long, short, default_value = "chain")]
    kind: ScrapeKind,

    /// Ticker symbol (e.g. AAPL, $SPX). Repeat to fetch several at once.
    #[arg(long, short, required = true)]
    symbol: Vec<String>,

    /// Chain expiration, YYYY-MM-DD or YYYY-MM-DD-w for weekly series.
    #[arg(long, short)]
    expiration: Option<Expiration>,

    #[arg(long, short, value_enum, default_value = "json")]
    format: Format,

    /// Write to this file instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Give up waiting after this many seconds (the scrape itself is not cut short).
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Print collected metrics (Prometheus text format) to stderr on exit.
    #[arg(long)]
    print_metrics: bool,
}

/// Resolve every requested key and render the results. Returns the process
/// exit code: 0 when every key resolved, otherwise the code of the first
/// failure.
pub async fn handle_fetch(config: &ChainscopeConfig, args: FetchArgs) -> Result<u8> {
    if args.expiration.is_some() && args.kind != ScrapeKind::Chain {
        warn!(kind = %args.kind, "--expiration only applies to chains, ignoring it");
    }

    // Invalid symbols are reported before any browser is started.
    let mut keys = Vec::with_capacity(args.symbol.len());
    let mut rejected = Vec::new();
    for raw in &args.symbol {
        match ScrapeKey::new(args.kind, raw, args.expiration) {
            Ok(key) => keys.push(key),
            Err(e) => rejected.push((raw.clone(), ScrapeFailure::from(e))),
        }
    }

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled || args.print_metrics,
        global_labels: config
            .metrics
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })?;

    let mut outcomes = Vec::with_capacity(keys.len());
    if !keys.is_empty() {
        let factory = Arc::new(ChromiumFactory::new(BrowserConfig::from(&config.browser)));
        let service = ScrapeService::start(config, factory).await?;
        let deadline = args.deadline_secs.map(Duration::from_secs);

        let lookups = keys.iter().map(|key| {
            let scheduler = service.scheduler().clone();
            async move {
                let lookup = scheduler.resolve_entry(key);
                match deadline {
                    Some(deadline) => tokio::time::timeout(deadline, lookup)
                        .await
                        .unwrap_or_else(|_| {
                            Err(ScrapeFailure::timeout(format!(
                                "no result within {}s",
                                deadline.as_secs()
                            )))
                        }),
                    None => lookup.await,
                }
            }
        });
        outcomes = join_all(lookups).await;
        service.shutdown().await;
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    let mut first_failure: Option<FailureKind> = None;
    for (raw, failure) in &rejected {
        eprintln!("invalid symbol {raw:?}: {failure}");
        first_failure.get_or_insert(failure.kind);
    }

    for (key, outcome) in keys.iter().zip(&outcomes) {
        match outcome {
            Ok(entry) => {
                info!(key = %key, rows = entry.value.len(), "resolved");
                emit(&mut out, args.format, entry)?;
            },
            Err(failure) => {
                warn!(key = %key, kind = %failure.kind, detail = %failure.detail, "fetch failed");
                first_failure.get_or_insert(failure.kind);
                match args.format {
                    Format::Json => {
                        serde_json::to_writer_pretty(
                            &mut out,
                            &render::failure_envelope(key, failure),
                        )?;
                        writeln!(out)?;
                    },
                    Format::Csv => eprintln!("{key}: {failure}"),
                }
            },
        }
    }
    out.flush()?;

    if args.print_metrics {
        eprint!("{}", metrics.render());
    }

    Ok(first_failure.map_or(0, FailureKind::exit_code))
}

fn emit(out: &mut dyn Write, format: Format, entry: &CacheEntry) -> Result<()> {
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, &render::success_envelope(entry))?;
            writeln!(out)?;
        },
        Format::Csv => render::write_csv(&entry.value, &mut *out)?,
    }
    Ok(())
}
