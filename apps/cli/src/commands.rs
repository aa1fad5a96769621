//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use wgdigest_core::{
    Collaborators, CollectReport, MarkdownSitePublisher, ProgressReporter, PublishReport,
    collect, is_fatal, publish,
};
use wgdigest_crawler::TranscriptFetcher;
use wgdigest_discovery::SessionListingSource;
use wgdigest_generator::ChatGenerator;
use wgdigest_shared::{
    AppConfig, CollectionId, init_config, init_config_at, load_config, load_config_from,
    validate_api_key,
};
use wgdigest_storage::{ArtifactCache, ManifestStore, Store, open_store};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Summarise IETF working-group sessions into a Markdown site.
#[derive(Parser)]
#[command(
    name = "wgdigest",
    version,
    about = "Summarise IETF working-group session transcripts into a Markdown site.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file to use instead of ~/.wgdigest/wgdigest.toml.
    #[arg(long, global = true, env = "WGDIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch and summarise new sessions for one or more meetings.
    Collect {
        /// Meeting numbers, e.g. `121` or `IETF121`.
        #[arg(required = true)]
        collections: Vec<CollectionId>,
    },

    /// Rebuild the Markdown site from the cache. No network or model calls.
    Publish,

    /// Collect the given meetings, then publish.
    Run {
        /// Meeting numbers, e.g. `121` or `IETF121`.
        #[arg(required = true)]
        collections: Vec<CollectionId>,
    },

    /// Inspect the artifact cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// List cached meetings, or the cached item ids of one meeting.
    List {
        collection: Option<CollectionId>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "wgdigest=info",
        1 => "wgdigest=debug",
        _ => "wgdigest=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let progress = CliProgress::new(matches!(cli.log_format, LogFormat::Text));

    match cli.command {
        Command::Collect { collections } => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_collect(&config, &collections, &progress).await
        }
        Command::Publish => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_publish(&config, &progress).await
        }
        Command::Run { collections } => {
            let config = resolve_config(cli.config.as_deref())?;
            cmd_run(&config, &collections, &progress).await
        }
        Command::Cache { action } => match action {
            CacheAction::List { collection } => {
                let config = resolve_config(cli.config.as_deref())?;
                cmd_cache_list(&config, collection).await
            }
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
            ConfigAction::Show => {
                let config = resolve_config(cli.config.as_deref())?;
                cmd_config_show(&config)
            }
        },
    }
}

fn resolve_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

/// Live HTTP collaborators built from config.
struct LiveCollaborators {
    source: SessionListingSource,
    fetcher: TranscriptFetcher,
    generator: ChatGenerator,
}

impl LiveCollaborators {
    fn new(config: &AppConfig) -> Result<Self> {
        // Fail before any network traffic if the key is missing.
        validate_api_key(&config.generator)?;
        Ok(Self {
            source: SessionListingSource::new(&config.source)?,
            fetcher: TranscriptFetcher::new(&config.source)?,
            generator: ChatGenerator::new()?,
        })
    }

    fn with_store<'a>(&'a self, store: &'a dyn Store) -> Collaborators<'a> {
        Collaborators {
            source: &self.source,
            fetcher: &self.fetcher,
            generator: &self.generator,
            store,
        }
    }
}

async fn cmd_collect(
    config: &AppConfig,
    collections: &[CollectionId],
    progress: &CliProgress,
) -> Result<()> {
    let live = LiveCollaborators::new(config)?;
    let store = open_store(config.storage.backend, &config.cache_dir(), false).await?;
    let deps = live.with_store(store.as_ref());

    info!(
        collections = collections.len(),
        backend = config.generator.backend.as_str(),
        model = %config.generator.model,
        "collecting"
    );

    let mut skipped = 0;
    for &collection in collections {
        match collect(collection, deps, &config.generator, progress).await {
            Ok(report) => print_collect(&report),
            Err(e) if is_fatal(&e) => {
                progress.clear();
                return Err(Report::new(e).wrap_err(format!("collect aborted for IETF {collection}")));
            }
            Err(e) => {
                warn!(%collection, error = %e, "collect failed, skipping collection");
                println!("  IETF {collection}: skipped ({e})");
                skipped += 1;
            }
        }
    }
    progress.clear();

    if skipped > 0 {
        println!("  {skipped} collection(s) skipped; rerun to retry.");
    }
    Ok(())
}

async fn cmd_publish(config: &AppConfig, progress: &CliProgress) -> Result<()> {
    let store = open_store(config.storage.backend, &config.cache_dir(), true).await?;
    let publisher = MarkdownSitePublisher::new(config.site_dir());

    progress.phase("Publishing site");
    let report = publish(store.as_ref(), &publisher).await;
    progress.clear();

    print_publish(&report?, &publisher);
    Ok(())
}

async fn cmd_run(
    config: &AppConfig,
    collections: &[CollectionId],
    progress: &CliProgress,
) -> Result<()> {
    let live = LiveCollaborators::new(config)?;
    let store = open_store(config.storage.backend, &config.cache_dir(), false).await?;
    let publisher = MarkdownSitePublisher::new(config.site_dir());

    let report = wgdigest_core::run(
        collections,
        live.with_store(store.as_ref()),
        &config.generator,
        &publisher,
        progress,
    )
    .await;
    progress.clear();

    let report = report?;
    for collect in &report.collects {
        print_collect(collect);
    }
    for (collection, reason) in &report.skipped {
        println!("  IETF {collection}: skipped ({reason})");
    }
    print_publish(&report.publish, &publisher);
    Ok(())
}

async fn cmd_cache_list(config: &AppConfig, collection: Option<CollectionId>) -> Result<()> {
    let store = open_store(config.storage.backend, &config.cache_dir(), true).await?;

    match collection {
        Some(collection) => {
            let keys = store.list_keys(collection).await?;
            if keys.is_empty() {
                println!("No cached summaries for IETF {collection}.");
            }
            for key in keys {
                println!("{key}");
            }
        }
        None => {
            let collections = store.list_collections().await?;
            if collections.is_empty() {
                println!("Cache at {} is empty.", config.cache_dir().display());
                return Ok(());
            }
            println!("  {:<10} {:>8} {:>8}  manifest", "meeting", "items", "groups");
            for collection in collections {
                let items = store.list_keys(collection).await?.len();
                let (groups, manifest) = match store.load_optional(collection).await? {
                    Some(m) => (
                        m.groups.len().to_string(),
                        m.generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                    ),
                    None => ("-".to_string(), "none".to_string()),
                };
                println!(
                    "  {:<10} {items:>8} {groups:>8}  {manifest}",
                    format!("IETF {collection}")
                );
            }
        }
    }
    Ok(())
}

fn cmd_config_init(path: Option<&std::path::Path>) -> Result<()> {
    let path = match path {
        Some(p) => init_config_at(p)?,
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| eyre!("failed to render config: {e}"))?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_collect(report: &CollectReport) {
    let totals = report.totals();
    println!();
    println!("  IETF {}", report.collection);
    for group in &report.groups {
        println!(
            "    {:<24} cached {:>3}  generated {:>3}  unavailable {:>3}  failed {:>3}",
            group.display_name, group.cached, group.generated, group.unavailable, group.failed
        );
    }
    println!(
        "    {:<24} cached {:>3}  generated {:>3}  unavailable {:>3}  failed {:>3}",
        "total", totals.cached, totals.generated, totals.unavailable, totals.failed
    );
    println!(
        "    Groups: {}  Manifest: {}  Time: {:.1}s",
        report.retained_groups,
        if report.manifest_written {
            "written"
        } else {
            "unchanged"
        },
        report.elapsed.as_secs_f64()
    );
}

fn print_publish(report: &PublishReport, publisher: &MarkdownSitePublisher) {
    println!();
    println!("  Site published!");
    println!("  Meetings:  {}", report.collections);
    println!("  Groups:    {}", report.groups);
    println!("  Written:   {}", report.pages_written);
    println!("  Unchanged: {}", report.pages_unchanged);
    println!("  Removed:   {}", report.pages_removed);
    println!("  Path:      {}", publisher.site_dir().display());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_started(&self, item_id: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Summarising [{current}/{total}] {item_id}"));
    }

    fn collect_done(&self, report: &CollectReport) {
        self.spinner.set_message(format!(
            "IETF {} done ({} groups)",
            report.collection, report.retained_groups
        ));
    }
}
