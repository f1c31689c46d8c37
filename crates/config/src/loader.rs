use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::RelayConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "chatrelay.toml",
    "chatrelay.yaml",
    "chatrelay.yml",
    "chatrelay.json",
];

/// Config file format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    /// Format for `path`; files without an extension are read as TOML.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).unwrap_or("toml") {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(Error::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }

    /// Parse `raw` into a format-independent value tree.
    pub fn parse_value(self, raw: &str) -> Result<serde_json::Value> {
        match self {
            Self::Toml => {
                let v: toml::Value = toml::from_str(raw)?;
                serde_json::to_value(v).context("converting TOML document")
            },
            Self::Yaml => {
                let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
                // An empty YAML document is null.
                if v.is_null() {
                    return Ok(serde_json::Value::Object(Default::default()));
                }
                serde_json::to_value(v).context("converting YAML document")
            },
            Self::Json => Ok(serde_json::from_str(raw)?),
        }
    }

    pub fn parse(self, raw: &str) -> Result<RelayConfig> {
        match self {
            Self::Toml => Ok(toml::from_str(raw)?),
            Self::Yaml => Ok(serde_json::from_value(self.parse_value(raw)?)?),
            Self::Json => Ok(serde_json::from_str(raw)?),
        }
    }
}

/// Load config from `path` (any supported format), substituting env vars.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    Format::from_path(path)?
        .parse(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./chatrelay.{toml,yaml,yml,json}`
/// 2. `<user config dir>/chatrelay.{toml,yaml,yml,json}`
///
/// Returns defaults (and no path) when no file exists. A file that exists
/// but does not load is an error.
pub fn discover_and_load() -> Result<(RelayConfig, Option<PathBuf>)> {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return Ok((RelayConfig::default(), None));
    };
    debug!(path = %path.display(), "loading config");
    let config = load_config(&path)?;
    Ok((config, Some(path)))
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new("."))
        .or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// The user-global config directory (`~/.config/chatrelay/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "chatrelay").map(|d| d.config_dir().to_path_buf())
}
