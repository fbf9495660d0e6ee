use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kubedev_core::{normalize, NavTarget, SearchableRecord};
use kubedev_finder::{Finder, FinderConfig, ResultRow};
use kubedev_kubehub::{FileFetcher, KubeFetcher, ResourceFetcher};
use kubedev_search::{Field, Hit, Index};
use kubedev_store::{refresh_once, spawn_refresh, StoreHandle};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kdctl", version, about = "KubeDev workload search")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Only fetch this namespace (default: all namespaces)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    /// Read the search payload from a JSON file instead of the cluster
    #[arg(long = "file", global = true, env = "KUBEDEV_PAYLOAD")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank pods, services, deployments, jobs and cron jobs against a query
    Search {
        /// Free text plus optional `ns:NAME` / `k:TYPE` filters
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Limit results
        #[arg(long = "limit", default_value_t = 10, env = "KUBEDEV_SEARCH_LIMIT")]
        limit: usize,
        /// Explain filter stages and counts
        #[arg(long = "explain", action = ArgAction::SetTrue)]
        explain: bool,
    },
    /// Print the normalized records the index is built from
    Records,
    /// Line-driven search box: type to search, `:N` to pick a row
    Interactive {
        /// Payload refresh interval
        #[arg(long = "refresh-secs", default_value_t = 30, env = "KUBEDEV_REFRESH_SECS")]
        refresh_secs: u64,
    },
    /// Validate a detail-view path like /kube-system/pods/coredns-1/info
    Route { path: String },
}

fn init_tracing() {
    let env = std::env::var("KUBEDEV_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KUBEDEV_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KUBEDEV_METRICS_ADDR; expected host:port");
        }
    }
}

async fn fetcher_for(cli: &Cli) -> Result<Arc<dyn ResourceFetcher>> {
    Ok(match &cli.file {
        Some(path) => Arc::new(FileFetcher::new(path.clone())),
        None => Arc::new(KubeFetcher::try_default(cli.namespace.clone()).await?),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Search { query, limit, explain } => {
            let query = query.join(" ");
            info!(query = %query, limit, "search invoked");
            let fetcher = fetcher_for(&cli).await?;
            let store = StoreHandle::new();
            refresh_once(fetcher.as_ref(), &store).await.context("fetching search payload")?;
            let index = Index::from_set(&store.current())?;
            let (hits, dbg) = index.search_with_debug(&query, *limit);

            match cli.output {
                Output::Human => {
                    println!("{:<20} {:<12} {:<32} {:>7}  PATH", "NAMESPACE", "TYPE", "NAME", "SCORE");
                    for h in hits.iter() {
                        if let Some(r) = index.record(h.doc) {
                            println!("{:<20} {:<12} {:<32} {:>7.0}  {}", r.namespace, r.kind, mark(&r.name, h), h.score, r.nav_target().path());
                        }
                    }
                }
                Output::Json => {
                    let rows: Vec<_> = hits.iter().filter_map(|h| index.record(h.doc).map(|r| HitRow::new(r, h))).collect();
                    if *explain {
                        #[derive(serde::Serialize)]
                        struct Explain<'a, T> { hits: T, debug: &'a kubedev_search::SearchDebugInfo }
                        println!("{}", serde_json::to_string_pretty(&Explain { hits: rows, debug: &dbg })?);
                    } else {
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                }
            }
            if *explain && matches!(cli.output, Output::Human) {
                eprintln!("debug: total={} after_ns={} after_kind={} matched={}", dbg.total, dbg.after_ns, dbg.after_kind, dbg.matched);
            }
        }
        Commands::Records => {
            let fetcher = fetcher_for(&cli).await?;
            let set = fetcher.fetch().await.context("fetching search payload")?;
            let records = normalize(&set)?;
            match cli.output {
                Output::Human => {
                    println!("{:<20} {:<12} NAME", "NAMESPACE", "TYPE");
                    for r in records.iter() {
                        println!("{:<20} {:<12} {}", r.namespace, r.kind, r.name);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&records)?),
            }
        }
        Commands::Interactive { refresh_secs } => {
            let fetcher = fetcher_for(&cli).await?;
            let store = StoreHandle::new();
            let refresh = spawn_refresh(fetcher, store.clone(), Duration::from_secs((*refresh_secs).max(1)));

            // Wait for first payload (configurable)
            let wait_secs = std::env::var("KUBEDEV_WAIT_SECS").ok().and_then(|s| s.parse::<u64>().ok()).unwrap_or(8);
            let mut rx = store.subscribe_epoch();
            let deadline = Instant::now() + Duration::from_secs(wait_secs);
            while *rx.borrow() == 0 {
                let now = Instant::now();
                if now >= deadline { warn!("no search payload yet; starting with an empty index"); break; }
                let rem = deadline.duration_since(now).min(Duration::from_secs(2));
                if tokio::time::timeout(rem, rx.changed()).await.is_err() { continue; }
            }

            let config = FinderConfig::from_env();
            let finder = Finder::spawn(store.clone(), config);
            let output = cli.output;
            let res = tokio::task::spawn_blocking(move || run_repl(finder, config, output)).await;
            refresh.abort();
            res.context("interactive loop panicked")??;
        }
        Commands::Route { path } => {
            let target = NavTarget::parse_path(path)?;
            match cli.output {
                Output::Human => println!("namespace={} type={} name={}", target.namespace, target.kind, target.name),
                Output::Json => println!("{}", serde_json::to_string_pretty(&target)?),
            }
        }
    }

    Ok(())
}

const REPL_WAIT: Duration = Duration::from_secs(10);

/// Runs on a blocking thread: this is the interactive side of the finder.
fn run_repl(mut finder: Finder, config: FinderConfig, output: Output) -> Result<()> {
    eprintln!("type to search; ENTER picks the highlighted row, :N picks row N, :n/:p move, :r refreshes, :q quits");
    finder.focus();
    finder.wait(REPL_WAIT);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let cmd = line.trim();
        match cmd {
            ":q" | ":quit" => break,
            ":n" => finder.highlight_next(),
            ":p" => finder.highlight_prev(),
            ":r" => {
                // blur + focus rebuilds from the latest payload
                finder.blur();
                finder.focus();
                finder.wait(REPL_WAIT);
            }
            "" => {
                if let Some(target) = finder.select_highlighted() {
                    print_target(&target, output)?;
                    continue;
                }
            }
            _ => {
                if let Some(n) = cmd.strip_prefix(':').and_then(|s| s.parse::<usize>().ok()) {
                    match n.checked_sub(1).and_then(|i| finder.select(i)) {
                        Some(target) => print_target(&target, output)?,
                        None => eprintln!("no row {}", n),
                    }
                    continue;
                }
                finder.set_input(cmd);
                if !config.debounce.is_zero() {
                    std::thread::sleep(config.debounce);
                }
                finder.poll();
            }
        }
        print_rows(&finder, output)?;
    }
    Ok(())
}

fn print_rows(finder: &Finder, output: Output) -> Result<()> {
    if let Some(e) = finder.last_error() {
        eprintln!("search unavailable: {}", e);
        return Ok(());
    }
    if !finder.is_open() {
        eprintln!("(no results)");
        return Ok(());
    }
    match output {
        Output::Human => {
            for (i, row) in finder.results().iter().enumerate() {
                let cursor = if finder.highlighted() == Some(i) { '>' } else { ' ' };
                println!("{} {:>2}. {:<32} {} - {}", cursor, i + 1, mark(&row.record.name, &row.hit), row.record.namespace, row.record.kind);
            }
        }
        Output::Json => {
            let rows: Vec<_> = finder.results().iter().map(|ResultRow { record, hit }| HitRow::new(record, hit)).collect();
            println!("{}", serde_json::to_string(&rows)?);
        }
    }
    Ok(())
}

fn print_target(target: &NavTarget, output: Output) -> Result<()> {
    match output {
        Output::Human => println!("-> {}", target.path()),
        Output::Json => println!("{}", serde_json::to_string(target)?),
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct HitRow<'a> {
    namespace: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    score: f32,
    path: String,
}

impl<'a> HitRow<'a> {
    fn new(r: &'a SearchableRecord, h: &Hit) -> Self {
        Self { namespace: &r.namespace, kind: r.kind.tag(), name: &r.name, score: h.score, path: r.nav_target().path() }
    }
}

/// Wrap matched runs of `name` in brackets.
fn mark(name: &str, hit: &Hit) -> String {
    let mut pos: Vec<usize> = hit.positions(Field::Name).collect();
    pos.sort_unstable();
    let mut out = String::with_capacity(name.len() + 8);
    let mut open = false;
    for (i, ch) in name.chars().enumerate() {
        let hl = pos.binary_search(&i).is_ok();
        if hl && !open { out.push('['); open = true; }
        if !hl && open { out.push(']'); open = false; }
        out.push(ch);
    }
    if open { out.push(']'); }
    out
}
