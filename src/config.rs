//! Runtime configuration loaded from TOML.
//!
//! Every section falls back to the layout of the purchase-order sheet the
//! tool was built for, so an empty or missing file is a working setup apart
//! from paths and credentials.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const OPERATOR_CODE_ENV: &str = "PORTAL_OPERATOR_CODE";
pub const PASSWORD_ENV: &str = "PORTAL_PASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watch: WatchConfig,
    pub paths: PathsConfig,
    pub layout: LayoutConfig,
    pub upload: UploadConfig,
    pub merge: MergeConfig,
    pub portal: PortalConfig,
    pub output: OutputConfig,
    pub policies: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub dir: PathBuf,
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: home().join("order-drop"),
            interval_secs: 20,
        }
    }
}

impl WatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Workbook listing deliverable dates per id (header row = ids)
    pub reference_workbook: PathBuf,
    /// Where the browser drops portal exports
    pub downloads_dir: PathBuf,
    pub audit_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reference_workbook: home().join("NPFKB.xlsx"),
            downloads_dir: dirs::download_dir().unwrap_or_else(|| home().join("Downloads")),
            audit_log: home().join("order-drop").join("log.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub title_columns: Vec<String>,
    pub expected_titles: Vec<String>,
    pub mandatory_cells: Vec<String>,
    /// Rows with this column blank are dropped before checking
    pub mandatory_column: String,
    pub region_column: String,
    pub region_keyword: String,
    pub id_column: String,
    pub date_column: String,
    pub empty_scan_min_col: u32,
    pub empty_scan_max_col: u32,
    /// Cells joined into the audit `Name` field
    pub name_cells: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            title_columns: strings(&["C", "D", "E", "F", "G", "H", "I", "J", "K"]),
            expected_titles: strings(&[
                "仕入先コード",
                "入荷倉庫コード",
                "商品コード",
                "商品名（伝票用）",
                "発注数量",
                "納期",
                "発注単価",
                "発注金額",
                "伝票摘要",
            ]),
            mandatory_cells: strings(&["L6"]),
            mandatory_column: "G".into(),
            region_column: "G".into(),
            region_keyword: "発注数量".into(),
            id_column: "D".into(),
            date_column: "H".into(),
            empty_scan_min_col: 3,
            empty_scan_max_col: 11,
            name_cells: strings(&["L6"]),
        }
    }
}

/// Upload column fed from a source sheet column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSource {
    pub column: u32,
    pub source: String,
}

/// Upload column stamped with a constant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillValue {
    pub column: u32,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub column_map: Vec<ColumnSource>,
    pub fill_values: Vec<FillValue>,
    pub date_column: u32,
    pub text_columns: Vec<u32>,
    pub quantity_column: u32,
    pub file_name: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let map = |column: u32, source: &str| ColumnSource {
            column,
            source: source.to_string(),
        };
        let fill = |column: u32, value: &str| FillValue {
            column,
            value: value.to_string(),
        };

        Self {
            column_map: vec![map(2, "C"), map(3, "D"), map(4, "H"), map(9, "E"), map(10, "G"), map(15, "K")],
            fill_values: vec![fill(1, "D"), fill(5, ""), fill(6, "2"), fill(7, "9"), fill(8, "99")],
            date_column: 4,
            text_columns: vec![2, 3, 9, 10, 15],
            quantity_column: 10,
            file_name: "nagashikomi.xlsx".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub csv_key_columns: Vec<String>,
    pub value_column: String,
    pub sheet_key_columns: Vec<String>,
    pub target_column: String,
    pub date_column: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            csv_key_columns: strings(&["仕入先コード", "センターコード", "商品コード", "発注数量", "指定納期", "伝票備考"]),
            value_column: "発注番号".into(),
            sheet_key_columns: strings(&["C", "D", "E", "G", "H", "K"]),
            target_column: "M".into(),
            date_column: "H".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub login_url: String,
    pub chrome_binary: Option<PathBuf>,
    pub chromedriver_path: PathBuf,
    pub chromedriver_port: u16,
    pub headless: bool,
    pub operator_code: String,
    pub password: String,
    pub wait_timeout_secs: u64,
    pub result_timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: String::new(),
            chrome_binary: None,
            chromedriver_path: PathBuf::from("chromedriver"),
            chromedriver_port: 9515,
            headless: true,
            operator_code: String::new(),
            password: String::new(),
            wait_timeout_secs: 10,
            result_timeout_secs: 15,
        }
    }
}

impl PortalConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Save merged workbooks over the moved source instead of `NEW_<name>`
    pub overwrite_source: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub skip_unparseable_dates: bool,
    pub strict_header_lengths: bool,
    pub warn_unmatched_keys: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            skip_unparseable_dates: true,
            strict_header_lengths: false,
            warn_unmatched_keys: true,
        }
    }
}

impl AppConfig {
    /// `<config dir>/order-uploader/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("order-uploader").join("config.toml"))
    }

    /// Load from `path`, or the default location when `None`. A missing
    /// default file yields the built-in defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    info!("no config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config");
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(code) = lookup(OPERATOR_CODE_ENV) {
            self.portal.operator_code = code;
        }
        if let Some(password) = lookup(PASSWORD_ENV) {
            self.portal.password = password;
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
