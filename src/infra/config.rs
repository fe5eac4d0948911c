//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::domain::types::Coordinates;

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_map_base_url")]
    pub base_url: String,
    #[serde(default = "default_map_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_nearby_radius_m")]
    pub nearby_radius_m: u32,
    /// Category filter for nearby search, `|`-separated
    #[serde(default = "default_nearby_types")]
    pub nearby_types: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            base_url: default_map_base_url(),
            timeout_ms: default_map_timeout_ms(),
            nearby_radius_m: default_nearby_radius_m(),
            nearby_types: default_nearby_types(),
            page_size: default_page_size(),
        }
    }
}

fn default_map_base_url() -> String {
    "https://restapi.amap.com".to_string()
}

fn default_map_timeout_ms() -> u64 {
    10_000
}

fn default_nearby_radius_m() -> u32 {
    3000
}

fn default_nearby_types() -> String {
    "风景名胜|公园广场|文物古迹".to_string()
}

fn default_page_size() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_llm_timeout_ms() -> u64 {
    30_000
}

fn default_domestic_llm() -> LlmConfig {
    LlmConfig {
        base_url: "https://api.deepseek.com".to_string(),
        model: "deepseek-chat".to_string(),
        timeout_ms: default_llm_timeout_ms(),
    }
}

fn default_multimodal() -> LlmConfig {
    LlmConfig {
        base_url: "https://generativelanguage.googleapis.com".to_string(),
        model: "gemini-2.5-flash".to_string(),
        timeout_ms: default_llm_timeout_ms(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NarrationConfig {
    /// How often the speech engine is polled for completion
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms(), language: default_language() }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_language() -> String {
    "zh-CN".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    #[serde(default = "default_demo_latitude")]
    pub demo_latitude: f64,
    #[serde(default = "default_demo_longitude")]
    pub demo_longitude: f64,
    #[serde(default = "default_demo_label")]
    pub demo_label: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            demo_latitude: default_demo_latitude(),
            demo_longitude: default_demo_longitude(),
            demo_label: default_demo_label(),
        }
    }
}

fn default_demo_latitude() -> f64 {
    39.9042
}

fn default_demo_longitude() -> f64 {
    116.4074
}

fn default_demo_label() -> String {
    "北京 (演示)".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: default_history_capacity() }
    }
}

fn default_history_capacity() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON file backing the key-value store (credentials, history)
    #[serde(default = "default_storage_file")]
    pub file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { file: default_storage_file() }
    }
}

fn default_storage_file() -> String {
    "data/store.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default = "default_domestic_llm")]
    pub domestic_llm: LlmConfig,
    #[serde(default = "default_multimodal")]
    pub multimodal: LlmConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    map_base_url: String,
    map_timeout_ms: u64,
    nearby_radius_m: u32,
    nearby_types: String,
    page_size: u32,
    domestic_llm_base_url: String,
    domestic_llm_model: String,
    domestic_llm_timeout_ms: u64,
    multimodal_base_url: String,
    multimodal_model: String,
    multimodal_timeout_ms: u64,
    poll_interval_ms: u64,
    language: String,
    demo_coords: Coordinates,
    demo_label: String,
    history_capacity: usize,
    storage_file: String,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let map = MapConfig::default();
        let domestic = default_domestic_llm();
        let multimodal = default_multimodal();
        Self {
            map_base_url: map.base_url,
            map_timeout_ms: map.timeout_ms,
            nearby_radius_m: map.nearby_radius_m,
            nearby_types: map.nearby_types,
            page_size: map.page_size,
            domestic_llm_base_url: domestic.base_url,
            domestic_llm_model: domestic.model,
            domestic_llm_timeout_ms: domestic.timeout_ms,
            multimodal_base_url: multimodal.base_url,
            multimodal_model: multimodal.model,
            multimodal_timeout_ms: multimodal.timeout_ms,
            poll_interval_ms: default_poll_interval_ms(),
            language: default_language(),
            demo_coords: Coordinates::new(default_demo_latitude(), default_demo_longitude()),
            demo_label: default_demo_label(),
            history_capacity: default_history_capacity(),
            storage_file: default_storage_file(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            map_base_url: toml_config.map.base_url,
            map_timeout_ms: toml_config.map.timeout_ms,
            nearby_radius_m: toml_config.map.nearby_radius_m,
            nearby_types: toml_config.map.nearby_types,
            page_size: toml_config.map.page_size,
            domestic_llm_base_url: toml_config.domestic_llm.base_url,
            domestic_llm_model: toml_config.domestic_llm.model,
            domestic_llm_timeout_ms: toml_config.domestic_llm.timeout_ms,
            multimodal_base_url: toml_config.multimodal.base_url,
            multimodal_model: toml_config.multimodal.model,
            multimodal_timeout_ms: toml_config.multimodal.timeout_ms,
            poll_interval_ms: toml_config.narration.poll_interval_ms,
            language: toml_config.narration.language,
            demo_coords: Coordinates::new(
                toml_config.location.demo_latitude,
                toml_config.location.demo_longitude,
            ),
            demo_label: toml_config.location.demo_label,
            history_capacity: toml_config.history.capacity,
            storage_file: toml_config.storage.file,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn map_base_url(&self) -> &str {
        &self.map_base_url
    }

    pub fn map_timeout(&self) -> Duration {
        Duration::from_millis(self.map_timeout_ms)
    }

    pub fn nearby_radius_m(&self) -> u32 {
        self.nearby_radius_m
    }

    pub fn nearby_types(&self) -> &str {
        &self.nearby_types
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn domestic_llm_base_url(&self) -> &str {
        &self.domestic_llm_base_url
    }

    pub fn domestic_llm_model(&self) -> &str {
        &self.domestic_llm_model
    }

    pub fn domestic_llm_timeout(&self) -> Duration {
        Duration::from_millis(self.domestic_llm_timeout_ms)
    }

    pub fn multimodal_base_url(&self) -> &str {
        &self.multimodal_base_url
    }

    pub fn multimodal_model(&self) -> &str {
        &self.multimodal_model
    }

    pub fn multimodal_timeout(&self) -> Duration {
        Duration::from_millis(self.multimodal_timeout_ms)
    }

    /// Never zero; a zero period would stop the completion watch
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn demo_coords(&self) -> Coordinates {
        self.demo_coords
    }

    pub fn demo_label(&self) -> &str {
        &self.demo_label
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity.max(1)
    }

    pub fn storage_file(&self) -> &str {
        &self.storage_file
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override endpoint base URLs (tests point these at local servers)
    pub fn with_base_urls(mut self, map: &str, domestic_llm: &str, multimodal: &str) -> Self {
        self.map_base_url = map.to_string();
        self.domestic_llm_base_url = domestic_llm.to_string();
        self.multimodal_base_url = multimodal.to_string();
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}
