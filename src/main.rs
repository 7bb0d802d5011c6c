//! castsync: offline mirror of a remote character catalogue.
//!
//! Pulls the character list from a Firestore collection, downloads one image
//! per character into a local directory and keeps both in a SQLite cache so
//! the list can be shown without a network connection.

#![warn(clippy::all)]

mod cli;
mod config;
mod connectivity;
mod mirror;
mod model;
mod presenter;
mod remote;
mod shutdown;
mod store;
mod sync;
mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::Config;
use connectivity::{Connectivity, StaticConnectivity, TcpProbe};
use mirror::{HttpImageFetcher, ImageMirror};
use presenter::{CharacterListPresenter, UiState};
use remote::{FirestoreSource, RemoteSource, UnconfiguredSource};
use store::{CharacterStore, SqliteCharacterStore};
use sync::{SyncOptions, Synchronizer};

/// Store plus the presenter built on top of it.
struct App {
    store: Arc<SqliteCharacterStore>,
    presenter: CharacterListPresenter,
}

impl App {
    async fn build(config: &Config) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(config.data_dir()).await?;
        let store = Arc::new(SqliteCharacterStore::open(&config.db_path()).await?);
        tracing::debug!(path = %config.db_path().display(), "Character store opened");

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("castsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let remote: Arc<dyn RemoteSource> = match config.firestore_options() {
            Some(options) => Arc::new(FirestoreSource::new(client.clone(), options)?),
            None => {
                if !config.offline {
                    tracing::warn!("No project id configured, only cached characters are available");
                }
                Arc::new(UnconfiguredSource)
            }
        };
        let fetcher = Arc::new(HttpImageFetcher::new(client));
        let synchronizer = Arc::new(Synchronizer::new(
            remote,
            fetcher,
            store.clone(),
            ImageMirror::new(config.data_dir()),
            SyncOptions {
                show_progress: !config.no_progress_bar,
            },
        ));

        let connectivity: Arc<dyn Connectivity> = if config.offline {
            Arc::new(StaticConnectivity(false))
        } else {
            Arc::new(TcpProbe::new(config.probe_addr.clone(), config.probe_timeout))
        };

        let presenter = CharacterListPresenter::new(synchronizer, store.clone(), connectivity);
        Ok(Self { store, presenter })
    }

    /// Tear down the presenter and close the store.
    fn close(self) -> anyhow::Result<()> {
        let Self { store, presenter } = self;
        drop(presenter);
        match Arc::try_unwrap(store) {
            Ok(store) => store.close()?,
            Err(_) => tracing::warn!("Character store still shared at exit, skipping close"),
        }
        Ok(())
    }
}

fn print_characters(persons: &[model::CachedCharacter]) {
    for person in persons {
        let image = if person.is_loading {
            "loading"
        } else if Path::new(&person.file_path).exists() {
            person.file_path.as_str()
        } else {
            "missing"
        };
        println!(
            "  {:<28} {:<8} {:<22} {}",
            person.name,
            person.status.label(),
            person.species.label(),
            image
        );
    }
}

fn print_state(state: &UiState) {
    if let Some(error) = &state.error {
        println!("{}", error);
    }
    if !state.persons.is_empty() {
        println!("Characters ({}):", state.persons.len());
        print_characters(&state.persons);
    }
}

/// Run the sync command.
async fn run_sync(config: Config) -> anyhow::Result<()> {
    let app = App::build(&config).await?;

    if let Some(report) = app.presenter.load_data().await {
        if !report.failed_ids.is_empty() {
            tracing::warn!(
                failed = report.failed_ids.len(),
                ids = ?report.failed_ids,
                "Some images could not be downloaded"
            );
        }
    }
    print_state(&app.presenter.state());

    app.close()
}

/// Run the watch command.
async fn run_watch(config: Config, args: cli::WatchArgs) -> anyhow::Result<()> {
    let app = App::build(&config).await?;
    let shutdown_token = shutdown::install_signal_handler()?;
    let interval = Duration::from_secs(args.interval);
    let state = app.presenter.subscribe();

    loop {
        if shutdown_token.is_cancelled() {
            tracing::info!("Shutdown requested, exiting...");
            break;
        }

        app.presenter.load_data().await;
        print_state(&state.borrow());

        tracing::info!(interval_secs = args.interval, "Waiting for next refresh");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_token.cancelled() => {
                tracing::info!("Shutdown during wait, exiting...");
                break;
            }
        }
    }

    app.close()
}

/// Open the existing store without creating one.
async fn open_existing_store(config: &Config) -> anyhow::Result<Option<SqliteCharacterStore>> {
    let db_path = config.db_path();
    if !db_path.exists() {
        println!("No cache database found at {}", db_path.display());
        println!("Run a sync first to create the database.");
        return Ok(None);
    }
    Ok(Some(SqliteCharacterStore::open(&db_path).await?))
}

/// Run the list command.
async fn run_list(config: Config) -> anyhow::Result<()> {
    let Some(store) = open_existing_store(&config).await? else {
        return Ok(());
    };

    let persons = store.get_all().await?;
    if persons.is_empty() {
        println!("{}", presenter::EMPTY_MESSAGE);
    } else {
        println!("Characters ({}):", persons.len());
        print_characters(&persons);
    }

    store.close()?;
    Ok(())
}

/// Run the status command.
async fn run_status(config: Config) -> anyhow::Result<()> {
    let Some(store) = open_existing_store(&config).await? else {
        return Ok(());
    };

    let summary = store.summary().await?;
    let mut images_present = 0u64;
    for person in store.get_all().await? {
        if tokio::fs::try_exists(&person.file_path).await.unwrap_or(false) {
            images_present += 1;
        }
    }

    println!("Cache database: {}", config.db_path().display());
    println!();
    println!("Characters:");
    println!("  Total:          {}", summary.total);
    println!("  Images present: {}", images_present);
    println!("  Loading:        {}", summary.loading);
    println!();

    if let Some(updated) = &summary.last_updated {
        println!(
            "Last updated: {}",
            updated.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    store.close()?;
    Ok(())
}

/// Run the reset-state command.
async fn run_reset_state(config: Config, args: cli::ResetStateArgs) -> anyhow::Result<()> {
    let files: Vec<_> = config
        .db_files()
        .into_iter()
        .filter(|p| p.exists())
        .collect();
    let dirs: Vec<_> = config
        .image_dirs()
        .into_iter()
        .filter(|p| p.exists())
        .collect();

    if files.is_empty() && dirs.is_empty() {
        println!("No cached state found in {}", config.data_dir().display());
        return Ok(());
    }

    if !args.yes {
        println!("This will delete:");
        for path in files.iter().chain(dirs.iter()) {
            println!("  {}", path.display());
        }
        println!();
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    for path in &files {
        tokio::fs::remove_file(path).await?;
    }
    for path in &dirs {
        tokio::fs::remove_dir_all(path).await?;
    }
    println!("Cached state deleted.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.global.log_level.as_filter())),
        )
        .init();

    let command = cli.effective_command();
    let config = Config::from_cli(cli.global)?;
    tracing::debug!(?config, "Resolved configuration");

    match command {
        Command::Sync => run_sync(config).await,
        Command::Watch(args) => run_watch(config, args).await,
        Command::List => run_list(config).await,
        Command::Status => run_status(config).await,
        Command::ResetState(args) => run_reset_state(config, args).await,
    }
}
