//! Incident harvester CLI
//!
//! Local execution entry point, usually run from cron.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use incident_harvester::{
    error::Result,
    models::{AuthSetting, Config},
    pipeline,
    services::{AuthMode, Credentials, Lexicon, auth::USER_AGENT_ENV},
    storage::{CsvStore, PostStore},
};

/// Harvest local community posts and score them for emergency relevance
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about = "Community incident harvester")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, score and store recent posts
    Harvest(HarvestArgs),

    /// Validate the configuration and the output file
    Validate,

    /// Show record counts of the output file
    Info {
        /// Output file (default: output.path from the config)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct HarvestArgs {
    /// Recency window in hours
    #[arg(long)]
    hours: Option<u32>,

    /// Maximum posts taken from each community
    #[arg(long)]
    max_per_source: Option<usize>,

    /// Output CSV file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Also search top-level comments
    #[arg(long)]
    include_comments: bool,

    /// Comments read per post with --include-comments
    #[arg(long)]
    comments_limit: Option<usize>,

    /// Comma-separated communities, replacing the configured list
    #[arg(long, value_delimiter = ',')]
    communities: Vec<String>,

    /// Use the public endpoints even when credentials are set
    #[arg(long)]
    public: bool,

    /// Write every scanned post, not only keyword matches
    #[arg(long)]
    all_posts: bool,
}

impl HarvestArgs {
    fn apply(self, config: &mut Config) {
        let harvest = &mut config.harvest;
        if let Some(hours) = self.hours {
            harvest.hours = hours;
        }
        if let Some(max) = self.max_per_source {
            harvest.max_per_source = max;
        }
        if let Some(limit) = self.comments_limit {
            harvest.comments_limit = limit;
        }
        if !self.communities.is_empty() {
            harvest.communities = self.communities;
        }
        harvest.include_comments |= self.include_comments;
        if self.all_posts {
            harvest.matched_only = false;
        }
        if self.public {
            config.fetcher.auth = AuthSetting::Public;
        }
        if let Some(out) = self.out {
            config.output.path = out;
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let config = Config::load(path)?;
        log::info!("Loaded configuration from {}", path.display());
        config
    } else {
        log::info!("No config at {}, using defaults", path.display());
        Config::default()
    };

    if let Ok(agent) = std::env::var(USER_AGENT_ENV) {
        if !agent.trim().is_empty() {
            config.fetcher.user_agent = agent.trim().to_string();
        }
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Harvest(args) => {
            let mut config = load_config(&cli.config)?;
            args.apply(&mut config);

            let mode = AuthMode::resolve(config.fetcher.auth, Credentials::from_env())?;
            log::info!("Using {} mode", mode.label());

            let summary = pipeline::run_harvest(&config, mode).await?;
            if summary.sources.has_failures() {
                log::warn!(
                    "Completed with {} failed communities",
                    summary.sources.failed.len()
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            let config = load_config(&cli.config)?;

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            let lexicon = Lexicon::compile(&config.lexicon)?;
            log::info!(
                "✓ Config OK ({} communities, {} lexicon entries)",
                config.harvest.communities.len(),
                lexicon.len()
            );

            let mode = AuthMode::resolve(config.fetcher.auth, Credentials::from_env())?;
            log::info!("✓ Auth: {} mode", mode.label());

            if config.output.path.exists() {
                let store = CsvStore::open(&config.output.path).await?;
                log::info!(
                    "✓ Output {} matches the record layout ({} records)",
                    store.path().display(),
                    store.len()
                );
            }

            log::info!("All validations passed!");
        }

        Command::Info { out } => {
            let path = match out {
                Some(path) => path,
                None => Config::load_or_default(&cli.config).output.path,
            };
            log::info!("Output file: {}", path.display());

            if path.exists() {
                let stats = CsvStore::open(&path).await?.stats();
                log::info!("Records: {}", stats.records);
                log::info!("High priority: {}", stats.high_priority);
            } else {
                log::info!("No output written yet.");
            }
        }
    }

    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();
    init_logging(cli.verbose);

    if let Ok(path) = dotenv {
        log::debug!("Loaded environment from {}", path.display());
    }
    log::info!("Incident harvester starting...");

    match run(cli).await {
        Ok(()) => {
            log::info!("Done!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
