//! File to persisted, searchable index.
//!
//! extract -> normalize -> document id -> chunk -> reuse the stored index if it
//! loads, otherwise embed, build and save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sb_core::error::AppError;
use sb_core::extract::extract_file;
use sb_core::normalize::{chunk_words, normalize_text, WordChunk};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::embeddings::{encode_normalized, Embedder};
use crate::index::{ChunkMeta, VectorIndex};

pub const DEFAULT_CHUNK_WINDOW: usize = 450;
pub const DEFAULT_CHUNK_OVERLAP: usize = 120;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Directory holding `<document_id>.index.json` and its metadata file.
    pub store_dir: PathBuf,
    pub model: String,
    pub window: usize,
    pub overlap: usize,
}

impl IngestOptions {
    pub fn new(store_dir: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            store_dir: store_dir.into(),
            model: model.into(),
            window: DEFAULT_CHUNK_WINDOW,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestResult {
    pub index: VectorIndex,
    pub document_id: String,
    pub chunk_count: usize,
    /// True when an existing index was loaded instead of embedding again.
    pub reused: bool,
    pub skipped_units: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub document_id: String,
    pub chunk_count: usize,
    pub reused: bool,
    pub skipped_units: usize,
    pub index_path: String,
}

impl IngestResult {
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            document_id: self.document_id.clone(),
            chunk_count: self.chunk_count,
            reused: self.reused,
            skipped_units: self.skipped_units,
            index_path: self.index.index_path().display().to_string(),
        }
    }
}

/// First 16 hex chars of SHA-256 over the file name followed by the decimal
/// character count of the normalized text.
///
/// Two different documents with the same name and length collide; that is
/// accepted.
pub fn document_id(file_name: &str, normalized_text: &str) -> String {
    let mut h = Sha256::new();
    h.update(file_name.as_bytes());
    h.update(normalized_text.chars().count().to_string().as_bytes());
    let digest = hex::encode(h.finalize());
    digest[..16].to_string()
}

pub fn index_path_for(store_dir: &Path, document_id: &str) -> PathBuf {
    store_dir.join(format!("{document_id}.index.json"))
}

struct Prepared {
    document_id: String,
    source_path: String,
    chunks: Vec<WordChunk>,
    skipped_units: usize,
}

fn prepare(path: &Path, options: &IngestOptions) -> Result<Prepared, AppError> {
    let extracted = extract_file(path)?;
    let text = normalize_text(&extracted.text());
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let document_id = document_id(&file_name, &text);
    let chunks = chunk_words(&text, options.window, options.overlap);
    Ok(Prepared {
        document_id,
        source_path: path.display().to_string(),
        chunks,
        skipped_units: extracted.skipped_units(),
    })
}

fn materialize(
    prepared: Prepared,
    embedder: &dyn Embedder,
    options: &IngestOptions,
) -> Result<IngestResult, AppError> {
    let Prepared {
        document_id,
        source_path,
        chunks,
        skipped_units,
    } = prepared;

    let mut index = VectorIndex::open(index_path_for(&options.store_dir, &document_id));
    if index.load()? {
        if index.model() != Some(options.model.as_str()) {
            tracing::warn!(
                document_id = %document_id,
                stored_model = index.model().unwrap_or(""),
                requested_model = %options.model,
                "reusing index built with a different encoder; queries will be rejected"
            );
        }
        tracing::info!(
            document_id = %document_id,
            chunks = index.len(),
            "reusing existing index"
        );
        return Ok(IngestResult {
            chunk_count: index.len(),
            index,
            document_id,
            reused: true,
            skipped_units,
        });
    }

    if chunks.is_empty() {
        tracing::warn!(
            document_id = %document_id,
            source = %source_path,
            "document has no text to index"
        );
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = encode_normalized(embedder, &options.model, &texts)?;
    let metadata: Vec<ChunkMeta> = chunks
        .into_iter()
        .map(|c| ChunkMeta {
            document_id: document_id.clone(),
            source_path: source_path.clone(),
            chunk_position: c.ordinal,
            text: c.text,
        })
        .collect();

    index.build(&options.model, vectors, metadata)?;
    index.save()?;
    tracing::info!(
        document_id = %document_id,
        chunks = index.len(),
        model = %options.model,
        "indexed document"
    );

    Ok(IngestResult {
        chunk_count: index.len(),
        index,
        document_id,
        reused: false,
        skipped_units,
    })
}

pub fn ingest(
    path: &Path,
    embedder: &dyn Embedder,
    options: &IngestOptions,
) -> Result<IngestResult, AppError> {
    let prepared = prepare(path, options)?;
    materialize(prepared, embedder, options)
}

/// Per-document mutual exclusion for ingestion inside one process.
///
/// An entry lives only while some caller holds or waits on that document.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, document_id: &str) -> Result<Arc<Mutex<()>>, AppError> {
        let mut map = self.locks.lock().map_err(|_| {
            AppError::new("AI_INGEST_LOCK_FAILED", "Document lock table is poisoned")
        })?;
        Ok(map
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Forget `document_id` unless another caller still holds its lock.
    fn release(&self, document_id: &str, lock: &Arc<Mutex<()>>) {
        let Ok(mut map) = self.locks.lock() else {
            return;
        };
        // Clones are only handed out under the map lock, so the count is stable here.
        if Arc::strong_count(lock) == 2 {
            map.remove(document_id);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// Like [`ingest`], but concurrent calls for the same document id run one at a time.
pub fn ingest_guarded(
    path: &Path,
    embedder: &dyn Embedder,
    options: &IngestOptions,
    locks: &DocumentLocks,
) -> Result<IngestResult, AppError> {
    let prepared = prepare(path, options)?;
    let document_id = prepared.document_id.clone();
    let lock = locks.lock_for(&document_id)?;
    let result = {
        let _guard = lock.lock().map_err(|_| {
            AppError::new("AI_INGEST_LOCK_FAILED", "Document lock is poisoned")
                .with_details(format!("document_id={document_id}"))
        })?;
        materialize(prepared, embedder, options)
    };
    locks.release(&document_id, &lock);
    result
}
