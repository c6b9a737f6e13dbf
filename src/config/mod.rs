use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// Bucket locations. Each bucket is a directory tree addressed by `/` keys.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,

    #[serde(default = "default_target_root")]
    pub target_root: PathBuf,
}

/// Source table layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Earliest date to produce reports for, `YYYY-MM-DD`.
    #[serde(default = "default_first_extract_date")]
    pub first_extract_date: String,

    /// Columns kept from the raw files; rows with a gap in any of them are dropped.
    #[serde(default = "default_source_columns")]
    pub columns: Vec<String>,

    #[serde(default = "default_src_isin")]
    pub col_isin: String,
    #[serde(default = "default_src_date")]
    pub col_date: String,
    #[serde(default = "default_src_time")]
    pub col_time: String,
    #[serde(default = "default_src_start_price")]
    pub col_start_price: String,
    #[serde(default = "default_src_min_price")]
    pub col_min_price: String,
    #[serde(default = "default_src_max_price")]
    pub col_max_price: String,
    #[serde(default = "default_src_traded_volume")]
    pub col_traded_volume: String,
}

/// Report layout and output location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    #[serde(default = "default_trg_isin")]
    pub col_isin: String,
    #[serde(default = "default_trg_date")]
    pub col_date: String,
    #[serde(default = "default_trg_opening_price")]
    pub col_opening_price: String,
    #[serde(default = "default_trg_closing_price")]
    pub col_closing_price: String,
    #[serde(default = "default_trg_min_price")]
    pub col_min_price: String,
    #[serde(default = "default_trg_max_price")]
    pub col_max_price: String,
    #[serde(default = "default_trg_daily_volume")]
    pub col_daily_traded_volume: String,
    #[serde(default = "default_trg_change")]
    pub col_change_prev_closing: String,

    /// Key prefix of the report object; a timestamp and extension are appended.
    #[serde(default = "default_trg_key")]
    pub key: String,

    /// strftime pattern for the timestamp suffix.
    #[serde(default = "default_trg_key_date_format")]
    pub key_date_format: String,

    /// `csv` or `parquet`. Checked when the report is written.
    #[serde(default = "default_trg_format")]
    pub format: String,
}

/// Checkpoint ("meta") file location and column names
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_key")]
    pub key: String,

    #[serde(default = "default_checkpoint_date_col")]
    pub source_date_col: String,

    #[serde(default = "default_checkpoint_processed_col")]
    pub processed_at_col: String,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_source_root() -> PathBuf {
    PathBuf::from("data/source")
}
fn default_target_root() -> PathBuf {
    PathBuf::from("data/target")
}
fn default_first_extract_date() -> String {
    "2021-04-14".to_string()
}
fn default_source_columns() -> Vec<String> {
    [
        "ISIN",
        "Date",
        "Time",
        "StartPrice",
        "MaxPrice",
        "MinPrice",
        "TradedVolume",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_src_isin() -> String {
    "ISIN".to_string()
}
fn default_src_date() -> String {
    "Date".to_string()
}
fn default_src_time() -> String {
    "Time".to_string()
}
fn default_src_start_price() -> String {
    "StartPrice".to_string()
}
fn default_src_min_price() -> String {
    "MinPrice".to_string()
}
fn default_src_max_price() -> String {
    "MaxPrice".to_string()
}
fn default_src_traded_volume() -> String {
    "TradedVolume".to_string()
}
fn default_trg_isin() -> String {
    "isin".to_string()
}
fn default_trg_date() -> String {
    "date".to_string()
}
fn default_trg_opening_price() -> String {
    "opening_price_eur".to_string()
}
fn default_trg_closing_price() -> String {
    "closing_price_eur".to_string()
}
fn default_trg_min_price() -> String {
    "minimum_price_eur".to_string()
}
fn default_trg_max_price() -> String {
    "maximum_price_eur".to_string()
}
fn default_trg_daily_volume() -> String {
    "daily_traded_volume".to_string()
}
fn default_trg_change() -> String {
    "change_prev_closing_%".to_string()
}
fn default_trg_key() -> String {
    "report1/xetra_daily_report1_".to_string()
}
fn default_trg_key_date_format() -> String {
    "%Y%m%d_%H%M%S".to_string()
}
fn default_trg_format() -> String {
    "parquet".to_string()
}
fn default_checkpoint_key() -> String {
    "meta/report1/xetra_report1_meta_file.csv".to_string()
}
fn default_checkpoint_date_col() -> String {
    "source_file_date".to_string()
}
fn default_checkpoint_processed_col() -> String {
    "datetime_of_processing".to_string()
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default files, an optional explicit file
    /// (TOML or YAML, picked by extension) and `XETRA__` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            );

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let cfg = builder
            .add_source(config::Environment::with_prefix("XETRA").separator("__"))
            .build()
            .context("Failed to assemble configuration")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Configuration does not match the expected layout")?;
        Ok(app_cfg)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            target_root: default_target_root(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            first_extract_date: default_first_extract_date(),
            columns: default_source_columns(),
            col_isin: default_src_isin(),
            col_date: default_src_date(),
            col_time: default_src_time(),
            col_start_price: default_src_start_price(),
            col_min_price: default_src_min_price(),
            col_max_price: default_src_max_price(),
            col_traded_volume: default_src_traded_volume(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            col_isin: default_trg_isin(),
            col_date: default_trg_date(),
            col_opening_price: default_trg_opening_price(),
            col_closing_price: default_trg_closing_price(),
            col_min_price: default_trg_min_price(),
            col_max_price: default_trg_max_price(),
            col_daily_traded_volume: default_trg_daily_volume(),
            col_change_prev_closing: default_trg_change(),
            key: default_trg_key(),
            key_date_format: default_trg_key_date_format(),
            format: default_trg_format(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            key: default_checkpoint_key(),
            source_date_col: default_checkpoint_date_col(),
            processed_at_col: default_checkpoint_processed_col(),
        }
    }
}
