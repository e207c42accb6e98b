use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::error::IndexError;
use crate::norm::{l2_normalize, l2_normalize_batch};
use crate::persist::Persistence;
use crate::search::{self, SearchResult};
use crate::store::IndexStore;

/// Controls index behavior and file locations.
pub struct Config {
    /// Embedding dimension (512 for the face model).
    pub dim: usize,

    /// Path of the binary vector file.
    pub vector_path: PathBuf,

    /// Path of the JSON identity file.
    pub identity_path: PathBuf,
}

impl Config {
    fn with_defaults(mut self) -> Self {
        if self.dim == 0 {
            self.dim = 512;
        }
        if self.vector_path.as_os_str().is_empty() {
            self.vector_path = PathBuf::from("face_index.bin");
        }
        if self.identity_path.as_os_str().is_empty() {
            self.identity_path = PathBuf::from("face_metadata.json");
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: 0,
            vector_path: PathBuf::new(),
            identity_path: PathBuf::new(),
        }
        .with_defaults()
    }
}

/// Outcome of one item in a batch registration.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Identity key the item was submitted under.
    pub person_id: String,

    /// Assigned ordinal position, or why the item was rejected.
    pub outcome: Result<usize, IndexError>,
}

/// Per-item report for [`FaceIndex::add_batch`]. Partial failures are
/// visible here instead of being logged and dropped.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    /// Number of items that were appended.
    pub fn added(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_ok()).count()
    }

    /// Number of items that were rejected.
    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.added()
    }
}

/// Durable face-embedding index.
///
/// Holds normalized embeddings and their identity keys in parallel
/// append-only sequences, searched by exhaustive cosine scan. Every
/// mutation is persisted to the two companion files before returning,
/// so a caller that sees `Ok` can assume the row survives a restart.
///
/// Thread-safe: mutations serialize on a write lock held across
/// mutate-then-save; searches take the read lock and run concurrently
/// with each other.
#[derive(Debug)]
pub struct FaceIndex {
    /// `None` until a build or a successful load: registration must not
    /// run against an index that was never bootstrapped.
    inner: RwLock<Option<IndexStore>>,
    persist: Persistence,
    dim: usize,
}

impl FaceIndex {
    /// Opens the index at the configured paths.
    ///
    /// Loads the on-disk pair when both files are present; otherwise
    /// the index starts uninitialized and awaits an external
    /// [`build`](Self::build) from the source-of-truth store.
    pub fn open(cfg: Config) -> Result<Self, IndexError> {
        let cfg = cfg.with_defaults();
        let persist = Persistence::new(cfg.vector_path, cfg.identity_path, cfg.dim);

        let state = if persist.exists() {
            let store = persist.load()?;
            info!(rows = store.len(), "loaded face index");
            Some(store)
        } else {
            info!("no face index on disk, awaiting external build");
            None
        };

        Ok(Self {
            inner: RwLock::new(state),
            persist,
            dim: cfg.dim,
        })
    }

    /// True iff both companion files are present on disk.
    pub fn exists(&self) -> bool {
        self.persist.exists()
    }

    /// True once the index has been built, loaded, or reset.
    pub fn is_ready(&self) -> bool {
        self.inner.read().unwrap().is_some()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().as_ref().map_or(0, IndexStore::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the index wholesale from a bootstrap set and persists
    /// it. Fails with [`IndexError::Validation`] on empty or
    /// length-mismatched input; on failure neither memory nor disk
    /// changes.
    pub fn build(
        &self,
        mut embeddings: Vec<Vec<f32>>,
        identities: Vec<String>,
    ) -> Result<usize, IndexError> {
        for emb in &embeddings {
            self.check_dim(emb)?;
        }
        l2_normalize_batch(&mut embeddings);

        let mut store = IndexStore::new();
        store.replace_all(embeddings, identities)?;

        let mut guard = self.inner.write().unwrap();
        self.persist.save(&store)?;
        let rows = store.len();
        *guard = Some(store);
        info!(rows, "built face index");
        Ok(rows)
    }

    /// Appends one embedding and persists before returning.
    ///
    /// Returns the assigned ordinal position. Fails with
    /// [`IndexError::NotInitialized`] until the index has been built or
    /// loaded. A failed save is surfaced, never retried.
    pub fn add(&self, embedding: &[f32], person_id: &str) -> Result<usize, IndexError> {
        self.check_dim(embedding)?;

        let mut guard = self.inner.write().unwrap();
        let store = guard.as_mut().ok_or(IndexError::NotInitialized)?;

        let mut vector = embedding.to_vec();
        l2_normalize(&mut vector);
        let pos = store.append(vector, person_id.to_string());
        self.persist.save(store)?;
        debug!(person_id, rows = store.len(), "added face embedding");
        Ok(pos)
    }

    /// Appends a batch of embeddings with per-item outcomes.
    ///
    /// Invalid items are reported in the [`BatchReport`] rather than
    /// aborting the batch; accepted items are covered by a single save.
    pub fn add_batch(
        &self,
        items: Vec<(Vec<f32>, String)>,
    ) -> Result<BatchReport, IndexError> {
        let mut guard = self.inner.write().unwrap();
        let store = guard.as_mut().ok_or(IndexError::NotInitialized)?;

        let mut report = BatchReport::default();
        for (embedding, person_id) in items {
            let outcome = match self.check_dim(&embedding) {
                Ok(()) => {
                    let mut vector = embedding;
                    l2_normalize(&mut vector);
                    Ok(store.append(vector, person_id.clone()))
                }
                Err(e) => Err(e),
            };
            report.outcomes.push(BatchOutcome { person_id, outcome });
        }

        if report.added() > 0 {
            self.persist.save(store)?;
        }
        debug!(
            added = report.added(),
            rejected = report.rejected(),
            rows = store.len(),
            "added face embedding batch"
        );
        Ok(report)
    }

    /// Top-k cosine search. Read-only; an uninitialized or empty index
    /// yields an empty result, not an error. Only a query of the wrong
    /// dimension fails.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<SearchResult, IndexError> {
        self.check_dim(query)?;

        let guard = self.inner.read().unwrap();
        match guard.as_ref() {
            Some(store) => Ok(search::run(store, query, top_k, threshold)),
            None => Ok(search::run(&IndexStore::new(), query, top_k, threshold)),
        }
    }

    /// Empties the index and persists the empty state, forcing the next
    /// bootstrap to rebuild from the source of truth. The index stays
    /// ready: registration may resume immediately.
    pub fn reset(&self) -> Result<(), IndexError> {
        let mut guard = self.inner.write().unwrap();
        let store = IndexStore::new();
        self.persist.save(&store)?;
        *guard = Some(store);
        info!("face index reset");
        Ok(())
    }

    fn check_dim(&self, v: &[f32]) -> Result<(), IndexError> {
        if v.len() != self.dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim,
                got: v.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path, dim: usize) -> Config {
        Config {
            dim,
            vector_path: dir.join("face_index.bin"),
            identity_path: dir.join("face_metadata.json"),
        }
    }

    #[test]
    fn config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.dim, 512);
        assert_eq!(cfg.vector_path, PathBuf::from("face_index.bin"));
        assert_eq!(cfg.identity_path, PathBuf::from("face_metadata.json"));
    }

    #[test]
    fn open_without_files_is_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        assert!(!index.is_ready());
        assert!(!index.exists());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn add_before_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let err = index.add(&[1.0, 0.0, 0.0], "alice").unwrap_err();
        assert!(matches!(err, IndexError::NotInitialized));
    }

    #[test]
    fn search_before_build_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let result = index.search(&[0.1, 0.2, 0.3], 5, 0.6).unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.entries_searched, 0);
    }

    #[test]
    fn build_then_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();

        let rows = index
            .build(
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
                vec!["alice".into(), "bob".into()],
            )
            .unwrap();
        assert_eq!(rows, 2);
        assert!(index.is_ready());
        assert!(index.exists());

        let result = index.search(&[1.0, 0.1, 0.0], 5, 0.6).unwrap();
        assert_eq!(result.matches[0].person_id, "alice");
        assert_eq!(result.entries_searched, 2);
    }

    #[test]
    fn build_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let err = index.build(vec![], vec![]).unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
        assert!(!index.is_ready());
        assert!(!index.exists());
    }

    #[test]
    fn build_rejects_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let err = index
            .build(vec![vec![1.0, 0.0, 0.0]], vec!["a".into(), "b".into()])
            .unwrap_err();
        assert!(matches!(err, IndexError::Validation(_)));
    }

    #[test]
    fn build_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let err = index
            .build(vec![vec![1.0, 0.0]], vec!["a".into()])
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn add_is_durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
            index
                .build(vec![vec![1.0, 0.0, 0.0]], vec!["alice".into()])
                .unwrap();
            let pos = index.add(&[0.0, 1.0, 0.0], "bob").unwrap();
            assert_eq!(pos, 1);
        }

        let reopened = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        assert!(reopened.is_ready());
        assert_eq!(reopened.len(), 2);

        let result = reopened.search(&[0.0, 1.0, 0.0], 1, 0.9).unwrap();
        assert_eq!(result.matches[0].person_id, "bob");
        assert!((result.matches[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reopened_index_searches_identically() {
        let dir = tempfile::tempdir().unwrap();
        let query = [0.4, 0.8, 0.1];

        let before = {
            let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
            index
                .build(
                    vec![
                        vec![0.5, 0.7, 0.0],
                        vec![0.1, 0.9, 0.2],
                        vec![0.9, 0.1, 0.1],
                    ],
                    vec!["a".into(), "b".into(), "c".into()],
                )
                .unwrap();
            index.search(&query, 3, 0.0).unwrap()
        };

        let reopened = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let after = reopened.search(&query, 3, 0.0).unwrap();

        assert_eq!(before.matches.len(), after.matches.len());
        for (x, y) in before.matches.iter().zip(after.matches.iter()) {
            assert_eq!(x.person_id, y.person_id);
            assert_eq!(x.similarity, y.similarity);
            assert_eq!(x.rank, y.rank);
        }
    }

    #[test]
    fn self_similarity_after_add() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 4)).unwrap();
        index
            .build(vec![vec![1.0, 0.0, 0.0, 0.0]], vec!["seed".into()])
            .unwrap();

        let emb = [0.3, -0.4, 0.7, 0.2];
        index.add(&emb, "carol").unwrap();

        let result = index.search(&emb, 1, 1.0).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].person_id, "carol");
        assert!((result.matches[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reset_empties_and_stays_ready() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        index
            .build(vec![vec![1.0, 0.0, 0.0]], vec!["alice".into()])
            .unwrap();

        index.reset().unwrap();
        assert!(index.is_ready());
        assert!(index.is_empty());
        assert!(index.exists());

        // Registration may resume without another build.
        index.add(&[0.0, 1.0, 0.0], "bob").unwrap();
        assert_eq!(index.len(), 1);

        // The empty state was persisted, so a reopen before the add
        // would have seen zero rows; after it, exactly one.
        let reopened = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn add_batch_reports_per_item_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        index
            .build(vec![vec![1.0, 0.0, 0.0]], vec!["seed".into()])
            .unwrap();

        let report = index
            .add_batch(vec![
                (vec![0.0, 1.0, 0.0], "alice".to_string()),
                (vec![0.0, 1.0], "short".to_string()),
                (vec![0.0, 0.0, 1.0], "bob".to_string()),
            ])
            .unwrap();

        assert_eq!(report.added(), 2);
        assert_eq!(report.rejected(), 1);
        assert_eq!(report.outcomes[0].outcome.as_ref().unwrap(), &1);
        assert!(matches!(
            report.outcomes[1].outcome,
            Err(IndexError::DimensionMismatch { .. })
        ));
        assert_eq!(report.outcomes[2].outcome.as_ref().unwrap(), &2);

        // Accepted items are durable.
        let reopened = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn add_batch_before_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let err = index
            .add_batch(vec![(vec![1.0, 0.0, 0.0], "a".to_string())])
            .unwrap_err();
        assert!(matches!(err, IndexError::NotInitialized));
    }

    #[test]
    fn search_rejects_wrong_query_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        let err = index.search(&[1.0, 0.0], 5, 0.6).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn open_rejects_desynchronized_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        index
            .build(
                vec![
                    vec![1.0, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0],
                    vec![0.0, 0.0, 1.0],
                ],
                vec!["a".into(), "b".into(), "c".into()],
            )
            .unwrap();
        drop(index);

        // Strip one identity record so the counts disagree.
        std::fs::write(
            dir.path().join("face_metadata.json"),
            r#"[{"person_id":"a"},{"person_id":"b"}]"#,
        )
        .unwrap();

        let err = FaceIndex::open(config_in(dir.path(), 3)).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt(_)), "{err}");
    }

    #[test]
    fn half_present_pair_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let index = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        index
            .build(vec![vec![1.0, 0.0, 0.0]], vec!["a".into()])
            .unwrap();
        drop(index);

        std::fs::remove_file(dir.path().join("face_metadata.json")).unwrap();

        // Not corrupt: the pair reads as "does not exist", forcing a
        // rebuild path instead of a partial load.
        let reopened = FaceIndex::open(config_in(dir.path(), 3)).unwrap();
        assert!(!reopened.is_ready());
        assert!(!reopened.exists());
    }
}
