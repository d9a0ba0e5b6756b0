use std::fs;
use std::path::Path;

use include_dir::{include_dir, Dir};
use itertools::Itertools;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

static TEXTS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/texts");

/// Category name that selects from every text
pub const RANDOM_CATEGORY: &str = "random";

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no texts found in {0}")]
    Empty(String),
}

/// One passage to type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextItem {
    #[serde(default)]
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub attribution: String,
}

impl TextItem {
    pub fn new(category: &str, content: &str, attribution: &str) -> Self {
        Self {
            category: category.to_string(),
            content: content.to_string(),
            attribution: attribution.to_string(),
        }
    }

    /// Used when nothing else is available
    pub fn fallback() -> Self {
        Self::new(
            "general",
            "The quick brown fox jumps over the lazy dog.",
            "Traditional pangram",
        )
    }

    /// A user-supplied prompt
    pub fn custom(content: &str) -> Self {
        Self::new("custom", content.trim(), "")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    items: Vec<TextItem>,
}

impl Corpus {
    pub fn new(items: Vec<TextItem>) -> Self {
        let items = items
            .into_iter()
            .filter(|t| !t.content.trim().is_empty())
            .collect();
        Self { items }
    }

    /// Texts compiled into the binary. Files that fail to parse are skipped.
    pub fn embedded() -> Self {
        let items = TEXTS_DIR
            .files()
            .filter(|f| f.path().extension().is_some_and(|ext| ext == "json"))
            .sorted_by(|a, b| a.path().cmp(b.path()))
            .filter_map(|f| {
                let name = f.path().display().to_string();
                let parsed = f
                    .contents_utf8()
                    .map(|data| serde_json::from_str::<Vec<TextItem>>(data));
                match parsed {
                    Some(Ok(items)) => Some(items),
                    Some(Err(e)) => {
                        warn!(file = %name, error = %e, "skipping malformed text pack");
                        None
                    }
                    None => {
                        warn!(file = %name, "skipping non utf-8 text pack");
                        None
                    }
                }
            })
            .flatten()
            .collect();

        let corpus = Self::new(items);
        debug!(texts = corpus.len(), "loaded embedded corpus");
        corpus
    }

    /// Load a JSON array of text items from `path`
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let data = fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path_str.clone(),
            source,
        })?;
        let items: Vec<TextItem> =
            serde_json::from_str(&data).map_err(|source| CorpusError::Parse {
                path: path_str.clone(),
                source,
            })?;

        let corpus = Self::new(items);
        if corpus.is_empty() {
            return Err(CorpusError::Empty(path_str));
        }
        debug!(path = %path_str, texts = corpus.len(), "loaded corpus");
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[TextItem] {
        &self.items
    }

    pub fn categories(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|t| t.category.clone())
            .filter(|c| !c.is_empty())
            .unique()
            .sorted()
            .collect()
    }

    /// Random text from `category`. [`RANDOM_CATEGORY`] or a category with no
    /// texts picks from the whole pool.
    pub fn pick(&self, category: &str) -> TextItem {
        let mut rng = rand::thread_rng();
        let in_category: Vec<&TextItem> = self
            .items
            .iter()
            .filter(|t| t.category == category)
            .collect();

        let choice = if category == RANDOM_CATEGORY || in_category.is_empty() {
            self.items.choose(&mut rng)
        } else {
            in_category.choose(&mut rng).copied()
        };
        choice.cloned().unwrap_or_else(TextItem::fallback)
    }
}
