use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use need_image_tagger::config::AppConfig;
use need_image_tagger::job::ScanJobs;
use need_image_tagger::query::QUERY_HELP;
use need_image_tagger::settings::{save_overrides, text_to_keywords, SettingsForm, TaggerSettings};
use need_image_tagger::store::NoteStore;
use need_image_tagger::stores::open_store;
use need_image_tagger::sync::{SyncPlan, NO_KEYWORDS_NOTICE};
use need_image_tagger::web_server;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "need-image-tagger",
    about = "Tags notes that mention imaging studies but carry no picture"
)]
struct Cli {
    /// Directory holding default.toml, local.toml and settings.json
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the selected notes and add or remove the need-image tag
    Scan {
        #[arg(short, long, default_value = "", long_help = QUERY_HELP)]
        query: String,
    },
    /// Serve the HTTP API for scans and settings
    Serve,
    /// Count the notes a query selects
    Search {
        #[arg(default_value = "", long_help = QUERY_HELP)]
        query: String,
    },
    /// Show the effective tagger settings, or change them
    Settings {
        /// Replace the keyword list with the lines of this file
        #[arg(long)]
        keywords_file: Option<PathBuf>,
        /// Restore the packaged defaults
        #[arg(long, conflicts_with = "keywords_file")]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)?;

    // Initialize env_logger based on config.log_level
    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting need-image-tagger");

    match cli.command {
        Command::Scan { query } => run_scan(&config, &query).await?,
        Command::Serve => {
            let jobs = ScanJobs::new(open_store(&config)?, config.progress_interval);
            if let Err(e) = web_server::start_web_server(Arc::new(config), jobs).await {
                log::error!("Web server error: {}", e);
            }
        }
        Command::Search { query } => {
            let store = open_store(&config)?;
            let ids = if query.trim().is_empty() {
                store.all_note_ids().await?
            } else {
                store.find_notes(&query).await?
            };
            println!("{} notes selected", ids.len());
        }
        Command::Settings {
            keywords_file,
            reset,
        } => {
            let mut settings = config.tagger_settings();
            if reset {
                settings = TaggerSettings::packaged_defaults();
                save_overrides(&config.config_dir, &settings)?;
            } else if let Some(path) = keywords_file {
                settings.keywords = text_to_keywords(&std::fs::read_to_string(path)?);
                save_overrides(&config.config_dir, &settings)?;
            }
            println!("{}", serde_json::to_string_pretty(&SettingsForm::from(&settings))?);
        }
    }

    info!("need-image-tagger finished");

    Ok(())
}

async fn run_scan(config: &AppConfig, query: &str) -> Result<()> {
    let settings = config.tagger_settings();
    let plan = SyncPlan::new(query, &settings, config.num_workers)?;
    if plan.matcher.is_empty() {
        println!("{}", NO_KEYWORDS_NOTICE);
        return Ok(());
    }

    let jobs = ScanJobs::new(open_store(config)?, config.progress_interval);
    let handle = jobs.start(plan)?;
    let policy = handle.policy.clone();
    let outcome = handle.wait().await?;

    println!("{}", outcome.summary(&policy));
    Ok(())
}
