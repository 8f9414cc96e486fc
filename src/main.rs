use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tymax::config::{config_base_dir, Config};
use tymax::feed::{
    DetailError, DetailLoader, FeedLoader, FeedPageState, FeedStatus, HomeLoader,
};
use tymax::model::Region;
use tymax::render::{self, FeedView};
use tymax::store::{DatabaseError, FirestoreStore, LocalStore, SharedStore};

/// Get the config directory path (~/.config/tymax/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("tymax"))
}

/// Create the config directory if needed, user-only on Unix.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "tymax", about = "Browse a streaming channel guide from the terminal")]
struct Args {
    /// Read from the local mirror instead of Firestore
    #[arg(long, global = true)]
    offline: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ~/.config/tymax/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the home feed: a few channels from every category
    Home,
    /// List categories
    Categories,
    /// Page through the channels of one category
    Category {
        /// Category key
        id: String,
        /// Only show channels from this region (e.g. europe, north-america)
        #[arg(long)]
        region: Option<Region>,
        /// Number of pages to load
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Show one channel with its schedule and related channels
    Channel {
        /// Channel key
        id: String,
    },
    /// Mirror the remote collections into the local database
    Sync,
}

fn open_remote(config: &Config) -> Result<FirestoreStore> {
    let options = config
        .firestore_options()
        .context("Firestore is not configured")?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("tymax/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    Ok(FirestoreStore::new(client, options))
}

async fn open_local(config: &Config, base_dir: &Path) -> Result<LocalStore> {
    let db_path = config.database_path(base_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match LocalStore::open(db_path_str).await {
        Ok(store) => Ok(store),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of tymax appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open local mirror: {}", e)),
    }
}

/// The store the browsing commands read from.
async fn open_backend(config: &Config, base_dir: &Path) -> Result<SharedStore> {
    if !config.offline {
        return Ok(Arc::new(open_remote(config)?));
    }
    let store = open_local(config, base_dir).await?;
    match store.last_synced(&config.channels_collection).await {
        Ok(Some(at)) => tracing::debug!(synced_at = %at, "Using local mirror"),
        Ok(None) => eprintln!("Warning: local mirror is empty. Run `tymax sync` first."),
        Err(e) => tracing::warn!(error = %e, "Failed to read mirror sync state"),
    }
    Ok(Arc::new(store))
}

async fn run_category(
    backend: SharedStore,
    config: &Config,
    id: String,
    region: Option<Region>,
    pages: usize,
    json: bool,
) -> Result<()> {
    let loader = FeedLoader::new(backend, config.feed_settings());
    let mut state = FeedPageState::new(id);
    state.set_region_filter(region.unwrap_or_default());

    loader
        .load_initial(&mut state)
        .await
        .context("Invalid category request")?;
    if state.status() == FeedStatus::Error {
        anyhow::bail!("Failed to load category '{}'", state.category_id());
    }

    for _ in 1..pages.max(1) {
        if state.cursor_key().is_none() || !state.can_load_more() {
            break;
        }
        loader
            .load_more(&mut state)
            .await
            .context("Invalid continuation request")?;
    }

    let mut out = std::io::stdout().lock();
    if json {
        let visible = state.visible_items();
        render::write_json(&mut out, &FeedView::new(&state, &visible))?;
    } else {
        render::render_feed(&mut out, &state)?;
    }
    Ok(())
}

async fn run_channel(backend: SharedStore, config: &Config, id: &str, json: bool) -> Result<()> {
    let loader = DetailLoader::new(backend, config.channels_collection.clone())
        .with_related_limit(config.related_limit);
    let detail = match loader.load(id).await {
        Ok(detail) => detail,
        Err(DetailError::NotFound { id }) => {
            eprintln!("Channel not found: {id}");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to load channel"),
    };

    let mut out = std::io::stdout().lock();
    if json {
        render::write_json(&mut out, &detail)?;
    } else {
        render::render_channel(&mut out, &detail)?;
    }
    Ok(())
}

async fn run_sync(config: &Config, base_dir: &Path) -> Result<()> {
    let remote = open_remote(config)?;
    let local = open_local(config, base_dir).await?;

    for collection in [&config.categories_collection, &config.channels_collection] {
        let count = local.mirror_collection(&remote, collection).await?;
        println!("Synced {count} documents from '{collection}'");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if args.offline {
        config.offline = true;
    }
    tracing::debug!(?config, "Effective configuration");
    let base_dir = config_base_dir(&config_path);

    match args.command {
        Command::Sync => run_sync(&config, &base_dir).await?,
        Command::Home => {
            let backend = open_backend(&config, &base_dir).await?;
            let home = HomeLoader::new(backend, config.home_settings());
            let sections = home
                .load_sections()
                .await
                .context("Failed to load categories")?;
            let mut out = std::io::stdout().lock();
            if args.json {
                render::write_json(&mut out, &sections)?;
            } else {
                render::render_home(&mut out, &sections)?;
            }
        }
        Command::Categories => {
            let backend = open_backend(&config, &base_dir).await?;
            let home = HomeLoader::new(backend, config.home_settings());
            let categories = home
                .load_categories()
                .await
                .context("Failed to load categories")?;
            let mut out = std::io::stdout().lock();
            if args.json {
                render::write_json(&mut out, &categories)?;
            } else {
                render::render_categories(&mut out, &categories)?;
            }
        }
        Command::Category { id, region, pages } => {
            let backend = open_backend(&config, &base_dir).await?;
            run_category(backend, &config, id, region, pages, args.json).await?;
        }
        Command::Channel { id } => {
            let backend = open_backend(&config, &base_dir).await?;
            run_channel(backend, &config, &id, args.json).await?;
        }
    }

    std::io::stdout().flush().ok();
    Ok(())
}
