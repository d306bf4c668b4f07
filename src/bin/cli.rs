//! Catalog Notifier CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use catalog_notifier::{
    config::{config_path, load_config, write_default_config},
    error::Result,
    models::{Config, Genre, SectionCatalog},
    pipeline::{self, ChangeDetector, NotificationDispatcher, Scheduler},
    services::{ReleaseFetcher, TelegramSender},
    storage::{LocalStorage, LocalSubscriberRegistry, ReleaseStore},
    utils::http,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// Catalog Notifier - new release alerts for catalog sections
#[derive(Parser, Debug)]
#[command(
    name = "catalog-notifier",
    version,
    about = "Watches catalog sections and notifies subscribers of new releases"
)]
struct Cli {
    /// Path to storage directory holding config and state files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed every section with its current listing without notifying
    Init {
        /// Re-seed sections that already have history
        #[arg(long)]
        force: bool,
    },

    /// Seed unseeded sections, then poll until interrupted
    Run,

    /// Run a single polling cycle
    Check,

    /// Send a stored release to its subscribers
    Notify {
        /// Section key, e.g. techno_electro_new
        #[arg(long)]
        section: String,

        /// Release id within the section
        #[arg(long)]
        id: u64,
    },

    /// List the watched sections
    Sections,

    /// Validate the configuration file
    Validate,

    /// Register a chat, re-activating it with no subscriptions
    Register {
        #[arg(long, allow_hyphen_values = true)]
        chat_id: i64,
    },

    /// Subscribe a chat to a genre
    Subscribe {
        #[arg(long, allow_hyphen_values = true)]
        chat_id: i64,

        /// Genre id, e.g. house_disco
        #[arg(long)]
        genre: String,
    },

    /// Clear every subscription of a chat
    Unsubscribe {
        #[arg(long, allow_hyphen_values = true)]
        chat_id: i64,
    },

    /// Show subscriber counts
    Stats,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel `shutdown` on Ctrl-C.
fn watch_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received, shutting down...");
            shutdown.cancel();
        }
    });
}

/// Services shared by the pipeline commands.
struct App {
    storage: Arc<LocalStorage>,
    dispatcher: NotificationDispatcher,
    scheduler: Scheduler,
}

impl App {
    async fn build(
        config: Arc<Config>,
        storage: Arc<LocalStorage>,
        registry: Arc<LocalSubscriberRegistry>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let catalog = SectionCatalog::discover(&config.catalog);
        storage.save_catalog(&catalog).await?;

        let client = http::create_async_client(&config.crawler)?;
        let fetcher = ReleaseFetcher::new(Arc::clone(&config), client.clone(), shutdown.clone())?;
        let sender = TelegramSender::new(&config.telegram, client)?;

        let dispatcher = NotificationDispatcher::new(
            registry,
            Arc::new(sender),
            config.telegram.send_concurrency,
        );
        let scheduler = Scheduler::new(
            &config,
            catalog,
            Arc::new(fetcher),
            ChangeDetector::new(storage.clone()),
            dispatcher.clone(),
            shutdown,
        );

        Ok(Self {
            storage,
            dispatcher,
            scheduler,
        })
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Catalog notifier starting...");

    let config_file = config_path(&cli.storage_dir);
    let mut config = match cli.command {
        Command::Validate => Config::load_or_default(&config_file)?,
        _ => load_config(&config_file)?,
    };
    config.storage.root_dir = cli.storage_dir.clone();
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let config = Arc::new(config);
    let storage = Arc::new(LocalStorage::from_config(&config.storage));
    let registry = Arc::new(LocalSubscriberRegistry::from_config(&config.storage));

    let shutdown = CancellationToken::new();
    watch_ctrl_c(shutdown.clone());

    match cli.command {
        Command::Init { force } => {
            if write_default_config(&config_file)? {
                log::info!("Default config written to {}", config_file.display());
            }
            let app = App::build(config, storage, registry, shutdown).await?;
            let stats = app.scheduler.bootstrap(force).await?;
            log::info!(
                "Seeded {} sections ({} skipped, {} failed)",
                stats.seeded,
                stats.skipped,
                stats.failed
            );
        }

        Command::Run => {
            let app = App::build(config, storage, registry, shutdown).await?;
            app.scheduler.run().await?;
        }

        Command::Check => {
            let app = App::build(config, storage, registry, shutdown).await?;
            let stats = app.scheduler.run_cycle().await?;
            println!("{stats:#?}");
        }

        Command::Notify { section, id } => {
            let app = App::build(config, storage, registry, shutdown).await?;
            let outcome = pipeline::notify_new_item(
                app.storage.as_ref(),
                &app.dispatcher,
                &section,
                id,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Command::Sections => {
            let catalog = match storage.load_catalog().await? {
                Some(catalog) => catalog,
                None => SectionCatalog::discover(&config.catalog),
            };
            for section in &catalog.sections {
                println!(
                    "{:<45} {:<35} {}",
                    section.section_key.to_string(),
                    format!("{} / {}", section.group.label(), section.display_label),
                    section.source_url
                );
            }
            log::info!("{} sections", catalog.len());
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} genres × {} listings)",
                config.catalog.genres.len(),
                config.catalog.listings.len()
            );
            if config.telegram.bot_token.is_none() {
                log::warn!("No bot token configured; delivery commands will fail");
            }

            log::info!("All validations passed!");
        }

        Command::Register { chat_id } => {
            if registry.register(chat_id).await? {
                log::info!("Registered chat {chat_id}");
            } else {
                log::info!("Chat {chat_id} re-activated, subscriptions cleared");
            }
        }

        Command::Subscribe { chat_id, genre } => {
            let genre: Genre = genre.parse()?;
            registry.subscribe(chat_id, genre).await?;
            let genres = registry.subscriptions(chat_id).await?.unwrap_or_default();
            log::info!(
                "Chat {} now follows: {}",
                chat_id,
                genres
                    .iter()
                    .map(|g| g.label())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Command::Unsubscribe { chat_id } => {
            registry.unsubscribe_all(chat_id).await?;
            log::info!("Chat {chat_id} unsubscribed from every genre");
        }

        Command::Stats => {
            let stats = registry.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    log::info!("Done!");

    Ok(())
}
