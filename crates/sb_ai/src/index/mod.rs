//! Flat inner-product index over unit vectors, persisted as two JSON artifacts.
//!
//! `<name>.index.json` holds the encoder identity, dimension and vectors;
//! `<name>.index.json.meta.json` holds the chunk metadata list. Position `i` in
//! the vector list maps to `metadata[i]`, and the two files are always written
//! and read together.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use sb_core::error::AppError;
use serde::{Deserialize, Serialize};

mod persist;
pub mod similarity;

pub const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMeta {
    pub document_id: String,
    pub source_path: String,
    pub chunk_position: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Inner product with the query; cosine similarity for unit vectors.
    pub score: f32,
    pub meta: ChunkMeta,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    model: String,
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    index_path: PathBuf,
    meta_path: PathBuf,
    model: Option<String>,
    dims: Option<usize>,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMeta>,
}

fn meta_path_for(index_path: &Path) -> PathBuf {
    let mut s = OsString::from(index_path.as_os_str());
    s.push(".meta.json");
    PathBuf::from(s)
}

fn check_batch(
    dims: Option<usize>,
    vectors: &[Vec<f32>],
    metadata: &[ChunkMeta],
) -> Result<(), AppError> {
    if vectors.len() != metadata.len() {
        return Err(AppError::new(
            "AI_INDEX_INVALID",
            "Vector and metadata counts differ",
        )
        .with_details(format!("vectors={}; metadata={}", vectors.len(), metadata.len())));
    }
    let expected = dims.or_else(|| vectors.first().map(Vec::len));
    if let Some(expected) = expected {
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != expected) {
            return Err(AppError::new(
                "AI_DIMENSION_MISMATCH",
                "Vector dimension does not match the index",
            )
            .with_details(format!("expected={expected}; got={}; vector={i}", v.len())));
        }
    }
    Ok(())
}

impl VectorIndex {
    /// An empty, unloaded handle bound to `index_path`.
    pub fn open(index_path: impl Into<PathBuf>) -> Self {
        let index_path = index_path.into();
        let meta_path = meta_path_for(&index_path);
        Self {
            index_path,
            meta_path,
            model: None,
            dims: None,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn metadata(&self) -> &[ChunkMeta] {
        &self.metadata
    }

    pub fn chunk_text(&self, position: u32) -> Option<&str> {
        self.metadata.get(position as usize).map(|m| m.text.as_str())
    }

    /// Replace the contents. Vectors are stored as given (expected unit length).
    pub fn build(
        &mut self,
        model: &str,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<ChunkMeta>,
    ) -> Result<(), AppError> {
        check_batch(None, &vectors, &metadata)?;
        self.model = Some(model.to_string());
        self.dims = vectors.first().map(Vec::len);
        self.vectors = vectors;
        self.metadata = metadata;
        Ok(())
    }

    /// Append entries; nothing is added if any entry is rejected.
    pub fn add(
        &mut self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<ChunkMeta>,
    ) -> Result<(), AppError> {
        check_batch(self.dims, &vectors, &metadata)?;
        if self.dims.is_none() {
            self.dims = vectors.first().map(Vec::len);
        }
        self.vectors.extend(vectors);
        self.metadata.extend(metadata);
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, AppError> {
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        let dims = self.dims.unwrap_or(0);
        if query.len() != dims {
            return Err(AppError::new(
                "AI_DIMENSION_MISMATCH",
                "Query dimension does not match the index",
            )
            .with_details(format!("index_dims={dims}; query_dims={}", query.len())));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, similarity::dot(query, v)))
            .collect();
        similarity::rank(&mut scored);
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                score,
                meta: self.metadata[i].clone(),
            })
            .collect())
    }

    /// Write both artifacts, metadata first.
    pub fn save(&self) -> Result<(), AppError> {
        let model = self.model.clone().ok_or_else(|| {
            AppError::new("AI_INDEX_INVALID", "Cannot save an index without an encoder identity")
                .with_details(format!("path={}", self.index_path.display()))
        })?;
        persist::write_json_atomic(&self.meta_path, &self.metadata, "index metadata")?;
        let file = IndexFile {
            version: INDEX_FORMAT_VERSION,
            model,
            dims: self.dims.unwrap_or(0),
            vectors: self.vectors.clone(),
        };
        persist::write_json_atomic(&self.index_path, &file, "index vectors")?;
        tracing::debug!(
            path = %self.index_path.display(),
            entries = self.len(),
            "saved vector index"
        );
        Ok(())
    }

    /// Load both artifacts. `Ok(false)` when neither exists.
    pub fn load(&mut self) -> Result<bool, AppError> {
        let has_index = self.index_path.is_file();
        let has_meta = self.meta_path.is_file();
        match (has_index, has_meta) {
            (false, false) => return Ok(false),
            (true, true) => {}
            _ => {
                return Err(AppError::new(
                    "AI_INDEX_INCOMPLETE",
                    "Only one of the two index artifacts exists",
                )
                .with_details(format!(
                    "index={} ({}); meta={} ({})",
                    self.index_path.display(),
                    if has_index { "present" } else { "missing" },
                    self.meta_path.display(),
                    if has_meta { "present" } else { "missing" },
                )));
            }
        }

        let file: IndexFile = persist::read_json(&self.index_path, "index vectors")?;
        let metadata: Vec<ChunkMeta> = persist::read_json(&self.meta_path, "index metadata")?;

        let corrupt = |msg: &str, details: String| {
            AppError::new("AI_INDEX_CORRUPT", msg.to_string()).with_details(details)
        };
        if file.version != INDEX_FORMAT_VERSION {
            return Err(corrupt(
                "Unsupported index format version",
                format!("path={}; version={}", self.index_path.display(), file.version),
            ));
        }
        if file.vectors.len() != metadata.len() {
            return Err(corrupt(
                "Index artifacts disagree on entry count",
                format!("vectors={}; metadata={}", file.vectors.len(), metadata.len()),
            ));
        }
        if let Some((i, v)) = file.vectors.iter().enumerate().find(|(_, v)| v.len() != file.dims) {
            return Err(corrupt(
                "Index vector dimension disagrees with the recorded dimension",
                format!("dims={}; got={}; vector={i}", file.dims, v.len()),
            ));
        }

        self.model = Some(file.model);
        self.dims = if file.vectors.is_empty() { None } else { Some(file.dims) };
        self.vectors = file.vectors;
        self.metadata = metadata;
        tracing::debug!(
            path = %self.index_path.display(),
            entries = self.len(),
            "loaded vector index"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn meta(i: u32) -> ChunkMeta {
        ChunkMeta {
            document_id: "doc".to_string(),
            source_path: "notes.txt".to_string(),
            chunk_position: i,
            text: format!("chunk {i}"),
        }
    }

    #[test]
    fn meta_path_appends_suffix() {
        let idx = VectorIndex::open("/tmp/abc.index.json");
        assert_eq!(idx.meta_path(), Path::new("/tmp/abc.index.json.meta.json"));
    }

    #[test]
    fn search_orders_by_score_then_position() {
        let mut idx = VectorIndex::open("unused.index.json");
        idx.build(
            "m",
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]],
            vec![meta(0), meta(1), meta(2)],
        )
        .expect("build");

        let hits = idx.search(&[1.0, 0.0], 10).expect("search");
        let order: Vec<u32> = hits.iter().map(|h| h.meta.chunk_position).collect();
        assert_eq!(order, vec![0, 2, 1]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        assert_eq!(idx.search(&[1.0, 0.0], 1).unwrap().len(), 1);
        assert!(idx.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_index_returns_nothing_for_any_query() {
        let idx = VectorIndex::open("unused.index.json");
        assert!(idx.search(&[1.0, 2.0, 3.0], 5).unwrap().is_empty());
    }

    #[test]
    fn query_dimension_must_match() {
        let mut idx = VectorIndex::open("unused.index.json");
        idx.build("m", vec![vec![1.0, 0.0]], vec![meta(0)]).unwrap();
        assert_eq!(idx.search(&[1.0], 1).unwrap_err().code, "AI_DIMENSION_MISMATCH");
    }

    #[test]
    fn add_validates_before_mutating() {
        let mut idx = VectorIndex::open("unused.index.json");
        idx.build("m", vec![vec![1.0, 0.0]], vec![meta(0)]).unwrap();

        let err = idx.add(vec![vec![0.0, 1.0], vec![1.0]], vec![meta(1), meta(2)]).unwrap_err();
        assert_eq!(err.code, "AI_DIMENSION_MISMATCH");
        let err = idx.add(vec![vec![0.0, 1.0]], vec![]).unwrap_err();
        assert_eq!(err.code, "AI_INDEX_INVALID");
        assert_eq!(idx.len(), 1);

        idx.add(vec![vec![0.0, 1.0]], vec![meta(1)]).expect("add");
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.chunk_text(1), Some("chunk 1"));
    }

    #[test]
    fn save_then_load_restores_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store").join("doc.index.json");
        let mut idx = VectorIndex::open(&path);
        idx.build("nomic", vec![vec![0.6, 0.8], vec![1.0, 0.0]], vec![meta(0), meta(1)]).unwrap();
        idx.save().expect("save");

        let mut again = VectorIndex::open(&path);
        assert!(again.load().expect("load"));
        assert_eq!(again.len(), 2);
        assert_eq!(again.dims(), Some(2));
        assert_eq!(again.model(), Some("nomic"));
        assert_eq!(again.metadata(), idx.metadata());
    }

    #[test]
    fn load_reports_missing_and_partial_artifacts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.index.json");
        let mut idx = VectorIndex::open(&path);
        assert!(!idx.load().expect("absent"));

        idx.build("m", vec![vec![1.0]], vec![meta(0)]).unwrap();
        idx.save().unwrap();
        std::fs::remove_file(idx.meta_path()).unwrap();
        let err = VectorIndex::open(&path).load().unwrap_err();
        assert_eq!(err.code, "AI_INDEX_INCOMPLETE");
    }

    #[test]
    fn load_rejects_disagreeing_artifacts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.index.json");
        let mut idx = VectorIndex::open(&path);
        idx.build("m", vec![vec![1.0], vec![0.5]], vec![meta(0), meta(1)]).unwrap();
        idx.save().unwrap();
        std::fs::write(idx.meta_path(), serde_json::to_vec(&vec![meta(0)]).unwrap()).unwrap();

        let err = VectorIndex::open(&path).load().unwrap_err();
        assert_eq!(err.code, "AI_INDEX_CORRUPT");
    }
}
