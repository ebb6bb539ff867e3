//! Metadata cache
//!
//! Resolving a directory's metadata walks its include chain and scans
//! its thumbnails, so the result is cached per directory path. The cache
//! is explicitly constructed and passed to whatever needs it; entries
//! are `Arc`-shared, so replacing or invalidating one never invalidates
//! a reader mid-flight: holders of the old instance keep it alive until
//! they drop it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::app::metadata::resolve::Metadata;
use crate::errors::MetadataResult;

/// Shared per-directory metadata cache
#[derive(Debug)]
pub struct MetadataCache {
    /// Application display language fed into language-group selection
    language: Option<String>,
    entries: Mutex<HashMap<PathBuf, Arc<Metadata>>>,
}

impl MetadataCache {
    pub fn new(language: Option<String>) -> Self {
        Self {
            language,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Resolve a directory's metadata, loading on first reference.
    ///
    /// Load failures are absorbed here: the directory resolves to an
    /// empty overlay and the failure is logged, so one bad store never
    /// breaks browsing.
    pub async fn resolve(&self, dir: &Path) -> Arc<Metadata> {
        if let Some(hit) = self.entries.lock().await.get(dir) {
            return Arc::clone(hit);
        }
        let loaded = match Metadata::load(dir, self.language.as_deref()).await {
            Ok(meta) => Arc::new(meta),
            Err(e) => {
                warn!(
                    "Metadata load failed for {}, treating as empty: {}",
                    dir.display(),
                    e
                );
                Arc::new(Metadata::empty(dir.to_path_buf()))
            }
        };
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::clone(&loaded));
        Arc::clone(entry)
    }

    /// Reload a directory's metadata from disk and replace the cached
    /// entry. Errors propagate; the previous entry stays in place on
    /// failure.
    pub async fn load(&self, dir: &Path) -> MetadataResult<Arc<Metadata>> {
        let fresh = Arc::new(Metadata::load(dir, self.language.as_deref()).await?);
        self.entries
            .lock()
            .await
            .insert(dir.to_path_buf(), Arc::clone(&fresh));
        debug!("Replaced cached metadata for {}", dir.display());
        Ok(fresh)
    }

    /// Drop one directory's entry; the next resolve re-reads from disk
    pub async fn invalidate(&self, dir: &Path) {
        self.entries.lock().await.remove(dir);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Remove a part's parameter group from the directory's local store,
    /// rewrite the store file and refresh the cached entry. Includes are
    /// never touched. Returns how many entries were removed.
    pub async fn delete_part(&self, dir: &Path, base_name: &str) -> MetadataResult<usize> {
        let current = self.resolve(dir).await;
        let (store, removed) = current.store_without_part(base_name);
        if removed == 0 {
            return Ok(0);
        }
        store.save(&current.store_path()).await?;
        self.load(dir).await?;
        Ok(removed)
    }

    // Path-keyed delegates for callers that do not hold the Arc.

    pub async fn label(&self, dir: &Path) -> Option<String> {
        self.resolve(dir).await.label()
    }

    pub async fn column_labels(&self, dir: &Path) -> Vec<String> {
        self.resolve(dir).await.column_labels().to_vec()
    }

    pub async fn part_param(&self, dir: &Path, base_name: &str, column: usize) -> Option<String> {
        self.resolve(dir).await.part_param(base_name, column)
    }

    pub async fn part_thumbnail_paths(&self, dir: &Path) -> HashMap<String, PathBuf> {
        self.resolve(dir).await.part_thumbnail_paths().clone()
    }

    pub async fn part_versions(&self, dir: &Path) -> HashMap<String, Vec<String>> {
        self.resolve(dir).await.part_versions().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::metadata::resolve::store_path;
    use tempfile::TempDir;

    async fn write_store(dir: &Path, text: &str) {
        let path = store_path(dir);
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, text).await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_caches_instance() {
        let root = TempDir::new().unwrap();
        write_store(root.path(), "[params]\nen/label=Parts\n").await;
        let cache = MetadataCache::new(Some("en".into()));

        let first = cache.resolve(root.path()).await;
        let second = cache.resolve(root.path()).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.label().as_deref(), Some("Parts"));
    }

    #[tokio::test]
    async fn test_load_replaces_but_old_readers_keep_instance() {
        let root = TempDir::new().unwrap();
        write_store(root.path(), "[params]\nen/label=Old\n").await;
        let cache = MetadataCache::new(Some("en".into()));

        let old = cache.resolve(root.path()).await;
        write_store(root.path(), "[params]\nen/label=New\n").await;
        let new = cache.load(root.path()).await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(old.label().as_deref(), Some("Old"));
        assert_eq!(new.label().as_deref(), Some("New"));
        assert_eq!(cache.label(root.path()).await.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reread() {
        let root = TempDir::new().unwrap();
        write_store(root.path(), "[params]\nen/label=Old\n").await;
        let cache = MetadataCache::new(Some("en".into()));
        assert_eq!(cache.label(root.path()).await.as_deref(), Some("Old"));

        write_store(root.path(), "[params]\nen/label=New\n").await;
        // Cached entry still answers with the snapshot.
        assert_eq!(cache.label(root.path()).await.as_deref(), Some("Old"));

        cache.invalidate(root.path()).await;
        assert_eq!(cache.label(root.path()).await.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn test_broken_store_absorbed_as_empty() {
        let root = TempDir::new().unwrap();
        write_store(root.path(), "[params]\nnot a key value line\n").await;
        let cache = MetadataCache::new(Some("en".into()));

        let meta = cache.resolve(root.path()).await;
        assert_eq!(meta.label(), None);
        assert!(cache.column_labels(root.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_part_rewrites_local_store_only() {
        let root = TempDir::new().unwrap();
        let shared = root.path().join("shared");
        let main = root.path().join("main");
        write_store(&shared, "[bracket]\nen/1=FromInclude\n").await;
        write_store(
            &main,
            "[bracket]\nen/1=Steel\n\n[shaft]\nen/1=Alloy\n\n[include]\ndata/1=../shared\n",
        )
        .await;
        let cache = MetadataCache::new(Some("en".into()));

        let removed = cache.delete_part(&main, "bracket.prt").await.unwrap();
        assert_eq!(removed, 1);

        // Local value is gone, the include now answers, siblings survive.
        assert_eq!(
            cache.part_param(&main, "bracket.prt", 1).await.as_deref(),
            Some("FromInclude")
        );
        assert_eq!(
            cache.part_param(&main, "shaft.prt", 1).await.as_deref(),
            Some("Alloy")
        );

        // Deleting something unknown is a no-op.
        assert_eq!(cache.delete_part(&main, "ghost.prt").await.unwrap(), 0);
    }
}
