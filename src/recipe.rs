//! Recipe files: book metadata, listing URLs and CSS extraction rules for one site, in TOML.
//!
//! ```toml
//! title = "Journey to the West"
//! author = "Wu Cheng'en"
//! charset = "gbk"
//! urls = ["https://novels.example/book/"]
//!
//! [[toc]]
//! selector = "#list dd a"
//!
//! [content]
//! selector = "#content"
//! format = "text"
//! strip_title = true
//! remove = [".ad"]
//! ```

use crate::crawler::{ContentRule, ExtractError, SelectorExtractor, TocRule};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Cannot read recipe {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid recipe {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid extraction rules: {0}")]
    Rules(#[from] ExtractError),
}

/// Parsed recipe. Metadata fields are optional so the CLI can supply or override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover: Option<String>,
    pub charset: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
    pub toc: Vec<TocRule>,
    pub content: ContentRule,
}

impl Recipe {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Compile the rules into an extractor. Fails on an invalid selector.
    pub fn extractor(&self) -> Result<SelectorExtractor, RecipeError> {
        Ok(SelectorExtractor::new(&self.toc, &self.content)?)
    }
}

pub fn load_recipe(path: &Path) -> Result<Recipe, RecipeError> {
    let s = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Recipe::from_toml(&s).map_err(|source| RecipeError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
