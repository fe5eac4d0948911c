//! Travel guide - headless driver for the service-resolution core
//!
//! Every capability can be exercised from the command line; results are
//! printed as JSON on stdout, logs go to stderr.
//!
//! Module structure:
//! - `domain/` - Landmark types and fallback data
//! - `io/` - Provider HTTP clients, speech output
//! - `services/` - Fallback orchestration, narration, geolocation, history
//! - `infra/` - Config, credential store, notifications, metrics

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use travel_guide::domain::{Coordinates, ImageInput, Landmark};
use travel_guide::infra::{
    seed_from_env, Config, CredentialKey, JsonFileStore, KeyValueStore, MemoryStore, Notifier,
};
use travel_guide::io::{NoopUnlock, TranscriptSpeech};
use travel_guide::services::{
    DeviceLocation, GeolocationResolver, GuideService, HistoryLog, NarrationController,
};

/// Travel guide - landmark discovery, narration and identification
#[derive(Parser, Debug)]
#[command(name = "travel-guide", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the current location and scan nearby landmarks
    Locate {
        /// Device latitude (raw GPS), if known
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,
        /// Device longitude (raw GPS), if known
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
    },
    /// Landmarks around a position
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },
    /// Keyword landmark search
    Search { query: String },
    /// Find a single place to relocate to
    FindPlace { query: String },
    /// Points of interest inside a landmark
    Subs { name: String },
    /// Generate and play narration for a landmark
    Narrate {
        name: String,
        /// Stored description, spoken when no provider is configured
        #[arg(long)]
        description: Option<String>,
    },
    /// Identify a landmark from position, photo and/or question
    Identify {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Image file, or a file holding a data URL
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        query: Option<String>,
    },
    /// Manage provider credentials
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Show (or clear) narration history
    History {
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand, Debug)]
enum KeysAction {
    /// Show which credentials are configured
    List,
    Set { name: CredentialKey, value: String },
    Get { name: CredentialKey },
    Clear { name: CredentialKey },
}

#[derive(Serialize)]
struct KeyStatus {
    name: &'static str,
    configured: bool,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_store(config: &Config) -> Arc<dyn KeyValueStore> {
    match JsonFileStore::open(config.storage_file()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %format!("{:#}", e), "store_unavailable_using_memory");
            Arc::new(MemoryStore::new())
        }
    }
}

fn read_image(path: &Path) -> anyhow::Result<ImageInput> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    if bytes.starts_with(b"data:") {
        let url = String::from_utf8_lossy(&bytes);
        return ImageInput::from_data_url(&url)
            .with_context(|| format!("Invalid data URL in {}", path.display()));
    }
    let mime_type = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        Some(ext) if ext.eq_ignore_ascii_case("webp") => "image/webp",
        _ => "image/jpeg",
    };
    Ok(ImageInput { mime_type: mime_type.to_string(), bytes })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging on stderr, level via RUST_LOG (default: INFO)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        "travel_guide_starting"
    );

    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);
    info!(
        config_file = %config.config_file(),
        map_base_url = %config.map_base_url(),
        domestic_llm_model = %config.domestic_llm_model(),
        multimodal_model = %config.multimodal_model(),
        storage_file = %config.storage_file(),
        "config_loaded"
    );

    let store = open_store(&config);
    let seeded = seed_from_env(store.as_ref());
    if seeded > 0 {
        info!(seeded, "credentials_seeded");
    }

    let notifier = Notifier::default();
    let mut notifications = notifier.subscribe();
    let guide =
        Arc::new(GuideService::from_config(config.clone(), store.clone(), notifier.clone())?);
    let history = Arc::new(HistoryLog::new(store.clone(), config.history_capacity()));
    let controller = NarrationController::new(
        &config,
        Arc::new(TranscriptSpeech::new(Duration::from_millis(250))),
        Arc::new(NoopUnlock),
        guide.clone(),
        history.clone(),
        notifier,
    );

    match args.command {
        Command::Locate { lat, lng } => {
            let device =
                DeviceLocation::new(lat.zip(lng).map(|(lat, lng)| Coordinates::new(lat, lng)));
            let resolver = GeolocationResolver::with_device(guide.clone(), device);
            print_json(&resolver.refresh().await)?;
        }
        Command::Nearby { lat, lng } => {
            print_json(&guide.nearby_landmarks(Coordinates::new(lat, lng)).await)?;
        }
        Command::Search { query } => {
            print_json(&guide.search_landmarks(&query).await)?;
        }
        Command::FindPlace { query } => {
            print_json(&guide.search_location(&query).await)?;
        }
        Command::Subs { name } => {
            let mut landmark = Landmark::new("cli", name, "");
            guide.ensure_sub_attractions(&mut landmark).await;
            print_json(&landmark)?;
        }
        Command::Narrate { name, description } => {
            let landmark = Landmark::new("cli", name.as_str(), description.unwrap_or_default());
            print_json(&controller.play(&name, Some(&landmark)).await)?;
        }
        Command::Identify { lat, lng, image, query } => {
            let image = image.as_deref().map(read_image).transpose()?;
            controller.prime();
            let identification =
                guide.identify(Coordinates::new(lat, lng), image, query.as_deref()).await;
            controller.present_identification(&identification);
            print_json(&identification)?;
        }
        Command::Keys { action } => match action {
            KeysAction::List => {
                let status: Vec<KeyStatus> = CredentialKey::ALL
                    .iter()
                    .map(|k| KeyStatus {
                        name: k.as_str(),
                        configured: store.get(k.as_str()).is_some_and(|v| !v.trim().is_empty()),
                    })
                    .collect();
                print_json(&status)?;
            }
            KeysAction::Set { name, value } => {
                store.set(name.as_str(), value.trim());
                info!(key = name.as_str(), "credential_set");
            }
            KeysAction::Get { name } => {
                print_json(&store.get(name.as_str()))?;
            }
            KeysAction::Clear { name } => {
                store.remove(name.as_str());
                info!(key = name.as_str(), "credential_cleared");
            }
        },
        Command::History { clear } => {
            if clear {
                history.clear();
            }
            print_json(&history.items())?;
        }
    }

    while let Ok(notification) = notifications.try_recv() {
        let payload = serde_json::to_string(&notification).unwrap_or_default();
        info!(event = notification.name(), payload = %payload, "notification");
    }
    guide.metrics().log();

    Ok(())
}
