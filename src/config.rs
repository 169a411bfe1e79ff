//! Optional config file loading. Search order: ./serialscrape.toml, then
//! $XDG_CONFIG_HOME/serialscrape/config.toml (or ~/.config/serialscrape/config.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when --output-dir is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Maximum number of requests in flight per stage.
    pub concurrency: Option<usize>,
    /// Charset of fetched pages when the recipe does not name one.
    pub charset: Option<String>,
    /// Also write markdown files (summary plus one file per chapter).
    pub markdown: Option<bool>,
    /// Prefix the markdown summary with YAML front matter.
    pub front_matter: Option<bool>,
    /// Include toc.ncx in the EPUB for legacy readers.
    pub ncx: Option<bool>,
}

fn candidate_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths = vec![cwd.join("serialscrape.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("serialscrape").join("config.toml"));
    }
    paths
}

/// Load the first config file found in `paths`.
fn load_from(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    for path in paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok(Some(config));
        }
    }
    Ok(None)
}

/// Search order: (1) ./serialscrape.toml, (2) $XDG_CONFIG_HOME/serialscrape/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    load_from(&candidate_paths(&cwd))
}
