//! Layered configuration: built-in defaults, then `studybot.toml` in the working
//! directory, then an explicit `--config` file, then `STUDYBOT_*` environment
//! variables.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const LOCAL_CONFIG_FILE: &str = "studybot.toml";
pub const ENV_PREFIX: &str = "STUDYBOT_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StudyConfig {
    /// Holds the SQLite store (unless `db_path` is set) and the index artifacts.
    pub data_dir: PathBuf,
    pub db_path: Option<PathBuf>,
    pub ollama_base_url: String,
    pub embed_model: String,
    /// Generated answers are used only when this is set.
    pub llm_model: Option<String>,
    pub chunk_window: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub num_mcq: usize,
    pub num_tf: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: None,
            ollama_base_url: "http://127.0.0.1:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            llm_model: None,
            chunk_window: sb_ai::ingest::DEFAULT_CHUNK_WINDOW,
            chunk_overlap: sb_ai::ingest::DEFAULT_CHUNK_OVERLAP,
            top_k: 5,
            num_mcq: 7,
            num_tf: 3,
        }
    }
}

impl StudyConfig {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("studybot.sqlite"))
    }

    pub fn store_dir(&self) -> &Path {
        &self.data_dir
    }
}

pub fn load_config(explicit: Option<&Path>) -> Result<StudyConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(StudyConfig::default()));

    let local = Path::new(LOCAL_CONFIG_FILE);
    if local.exists() {
        figment = figment.merge(Toml::file(local));
    }
    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // STUDYBOT_EMBED_MODEL, STUDYBOT_DATA_DIR, ...
    figment = figment.merge(Env::prefixed(ENV_PREFIX));

    figment.extract().map_err(Box::new)
}
