use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub boundaries: BoundaryConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.niid.go.jp/niid/images/idwr/sokuho".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BoundaryConfig {
    /// URL or local path (.json, .geojson or .shp)
    pub source: String,
    pub join_property: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            source: "https://raw.githubusercontent.com/smartnews-smri/japan-topography/main/data/municipality/geojson/s0010/prefectures.json".to_string(),
            join_property: "N03_001".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    /// Floor for the shared colour scale when the fixed ceiling is selected.
    pub fixed_max: f64,
    pub width: u32,
    pub height: u32,
    pub fill_opacity: f64,
    pub line_weight: f64,
    pub legend_width: u32,
    pub no_data_color: String, // Hex code
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fixed_max: 40.0,
            width: 640,
            height: 720,
            fill_opacity: 0.8,
            line_weight: 1.0,
            legend_width: 200,
            no_data_color: "#e0e0e0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub open_browser: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            open_browser: true,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Falls back to built-in defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}
