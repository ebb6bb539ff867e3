//! Virtual catalog tree
//!
//! An in-memory hierarchical index of directories and files rooted at each
//! data source. Nodes load lazily: expanding a directory asks the owning
//! backend to list its children exactly once, concurrent expansion requests
//! for the same node coalesce onto a single listing, and listing failures
//! are absorbed at the node boundary so one bad directory never corrupts
//! the rest of the tree.
//!
//! Ownership is arena style: the tree owns nodes in a generational slab
//! and hands out copyable [`ItemId`] handles; parents are referenced by id,
//! never by owning pointer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::app::classify::{classify, Classification, FileKind};
use crate::app::metadata::Metadata;
use crate::app::source::{join_rel, DataSource, DirEntry};
use crate::app::transfer::TransferRequest;
use crate::constants::metadata as meta_consts;

/// Handle to a node in the catalog tree.
///
/// Generational: a handle left over from before a reload or source removal
/// is detected as stale rather than aliasing a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId {
    index: usize,
    generation: u32,
}

/// Lazy-load state of a directory node
#[derive(Debug, Clone)]
enum LoadState {
    Unloaded,
    /// A listing is in flight; waiters subscribe to the channel
    Loading(watch::Receiver<bool>),
    Loaded,
}

impl LoadState {
    fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded)
    }
}

/// Classified file leaf under a directory node
#[derive(Debug, Clone)]
pub struct PartFile {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Classification computed once at discovery and cached
    classification: Classification,
    /// Metadata-provided base-name override
    base_override: Option<String>,
    pub checked: bool,
}

impl PartFile {
    fn from_entry(entry: &DirEntry, checked: bool) -> Self {
        Self {
            name: entry.name.clone(),
            size: entry.size,
            modified: entry.modified,
            classification: classify(&entry.name),
            base_override: None,
            checked,
        }
    }

    pub fn kind(&self) -> FileKind {
        self.classification.kind
    }

    /// Version captured by a versioned pattern; 0 otherwise
    pub fn version(&self) -> u32 {
        self.classification.version
    }

    /// Base name: metadata override, else the pattern-captured base, else
    /// the plain name
    pub fn base_name(&self) -> &str {
        if let Some(over) = &self.base_override {
            return over;
        }
        self.classification.base_name.as_deref().unwrap_or(&self.name)
    }

    pub fn set_base_override(&mut self, base: Option<String>) {
        self.base_override = base;
    }
}

/// One directory (or data-source root) in the tree
#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
    files: Vec<PartFile>,
    source: Arc<dyn DataSource>,
    rel_path: String,
    is_root: bool,
    checked: bool,
    /// True until something of interest is proven to exist beneath it
    is_empty: bool,
    state: LoadState,
    metadata: Option<Arc<Metadata>>,
}

/// Generational slab slot
#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Default)]
struct TreeState {
    slots: Vec<Slot>,
    free: Vec<usize>,
    roots: Vec<ItemId>,
}

impl TreeState {
    fn insert(&mut self, node: Node) -> ItemId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            ItemId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            ItemId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    fn get(&self, id: ItemId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: ItemId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Free a node and its whole subtree
    fn free_subtree(&mut self, id: ItemId) {
        let children = match self.get(id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
        if let Some(slot) = self.slots.get_mut(id.index) {
            if slot.generation == id.generation && slot.node.is_some() {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
            }
        }
    }

    /// Monotone not-empty marking, propagated to every ancestor
    fn set_not_empty(&mut self, id: ItemId) {
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.get_mut(node_id) {
                Some(node) if node.is_empty => {
                    node.is_empty = false;
                    current = node.parent;
                }
                _ => break,
            }
        }
    }

    fn set_checked_recursive(&mut self, id: ItemId, checked: bool) {
        let children = {
            let node = match self.get_mut(id) {
                Some(node) => node,
                None => return,
            };
            node.checked = checked;
            for file in &mut node.files {
                file.checked = checked;
            }
            node.children.clone()
        };
        for child in children {
            self.set_checked_recursive(child, checked);
        }
    }

    /// Build children from a completed listing and mark the node loaded
    fn apply_listing(&mut self, id: ItemId, entries: Vec<DirEntry>) {
        let (checked, source, rel_path) = match self.get(id) {
            Some(node) => (node.checked, Arc::clone(&node.source), node.rel_path.clone()),
            None => return,
        };

        let mut interesting = false;
        let mut child_ids = Vec::new();
        let mut files = Vec::new();

        for entry in &entries {
            if entry.is_dir {
                // The metadata overlay directory is not part of the
                // browsable catalog.
                if entry.name == meta_consts::INDEX_DIR {
                    continue;
                }
                let child = Node {
                    name: entry.name.clone(),
                    parent: Some(id),
                    children: Vec::new(),
                    files: Vec::new(),
                    source: Arc::clone(&source),
                    rel_path: join_rel(&rel_path, &entry.name),
                    is_root: false,
                    checked,
                    is_empty: true,
                    state: LoadState::Unloaded,
                    metadata: None,
                };
                child_ids.push(self.insert(child));
            } else {
                let file = PartFile::from_entry(entry, checked);
                if file.kind() != FileKind::Undefined {
                    interesting = true;
                }
                files.push(file);
            }
        }

        if let Some(node) = self.get_mut(id) {
            node.children = child_ids;
            node.files = files;
            node.state = LoadState::Loaded;
        }
        if interesting {
            self.set_not_empty(id);
        }
    }
}

/// The virtual catalog tree.
///
/// All operations take `&self`; shared state lives behind an async mutex
/// so concurrent expansion of different branches is safe and expansion of
/// the same node coalesces.
#[derive(Debug, Default)]
pub struct CatalogTree {
    state: Arc<Mutex<TreeState>>,
}

impl CatalogTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a data source as a new root item
    pub async fn attach_source(&self, source: Arc<dyn DataSource>) -> ItemId {
        let mut state = self.state.lock().await;
        let root = Node {
            name: source.label().to_string(),
            parent: None,
            children: Vec::new(),
            files: Vec::new(),
            source,
            rel_path: String::new(),
            is_root: true,
            checked: false,
            is_empty: true,
            state: LoadState::Unloaded,
            metadata: None,
        };
        let id = state.insert(root);
        state.roots.push(id);
        debug!("Attached data source root {:?}", id);
        id
    }

    /// Detach a data source root and destroy its subtree
    pub async fn remove_source(&self, id: ItemId) {
        let mut state = self.state.lock().await;
        state.roots.retain(|root| *root != id);
        state.free_subtree(id);
    }

    /// Root items in attach order
    pub async fn roots(&self) -> Vec<ItemId> {
        self.state.lock().await.roots.clone()
    }

    /// Materialize the children of a node.
    ///
    /// At most one backend listing runs per node between reloads: repeat
    /// calls on a loaded node return immediately, and calls racing an
    /// in-flight listing wait for it instead of issuing a second one.
    /// Listing errors are absorbed: the node comes back loaded and empty,
    /// with the failure logged.
    pub async fn expand(&self, id: ItemId) {
        let (source, rel_path, done_tx) = {
            let mut state = self.state.lock().await;
            let node = match state.get_mut(id) {
                Some(node) => node,
                None => return,
            };
            match &node.state {
                LoadState::Loaded => return,
                LoadState::Loading(done_rx) => {
                    let mut done_rx = done_rx.clone();
                    drop(state);
                    while !*done_rx.borrow() {
                        if done_rx.changed().await.is_err() {
                            break;
                        }
                    }
                    return;
                }
                LoadState::Unloaded => {
                    let (tx, rx) = watch::channel(false);
                    node.state = LoadState::Loading(rx);
                    (Arc::clone(&node.source), node.rel_path.clone(), tx)
                }
            }
        };

        // The listing runs in its own task so a caller abandoning this
        // future cannot strand the node in `Loading`.
        let shared = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            let listing = source.list_children(&rel_path).await;
            let mut state = shared.lock().await;
            match listing {
                Ok(entries) => state.apply_listing(id, entries),
                Err(e) => {
                    warn!("Listing failed for {:?}, treating as empty: {}", id, e);
                    if let Some(node) = state.get_mut(id) {
                        node.state = LoadState::Loaded;
                    }
                }
            }
            drop(state);
            let _ = done_tx.send(true);
        });
        let _ = handle.await;
    }

    /// Discard a node's loaded children and reset it for re-listing.
    /// This is the only way `is_empty` ever goes back to true.
    pub async fn reload(&self, id: ItemId) {
        let mut state = self.state.lock().await;
        let children = match state.get(id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            state.free_subtree(child);
        }
        if let Some(node) = state.get_mut(id) {
            node.children.clear();
            node.files.clear();
            node.state = LoadState::Unloaded;
            node.is_empty = true;
            node.metadata = None;
        }
    }

    /// Toggle selection on a node, propagating to all descendants (and
    /// never upward)
    pub async fn set_checked(&self, id: ItemId, checked: bool) {
        let mut state = self.state.lock().await;
        state.set_checked_recursive(id, checked);
    }

    /// Collect every checked file as a transfer request
    pub async fn checked_files(&self) -> Vec<TransferRequest> {
        let state = self.state.lock().await;
        let mut requests = Vec::new();
        for slot in &state.slots {
            if let Some(node) = &slot.node {
                for file in &node.files {
                    if file.checked {
                        requests.push(TransferRequest {
                            source: Arc::clone(&node.source),
                            rel_path: join_rel(&node.rel_path, &file.name),
                            file_name: file.name.clone(),
                        });
                    }
                }
            }
        }
        requests
    }

    /// Apply a metadata-provided base-name override to one file leaf
    pub async fn set_file_base_override(
        &self,
        id: ItemId,
        file_name: &str,
        base: Option<String>,
    ) {
        let mut state = self.state.lock().await;
        if let Some(node) = state.get_mut(id) {
            if let Some(file) = node.files.iter_mut().find(|f| f.name == file_name) {
                file.set_base_override(base);
            }
        }
    }

    /// Attach resolved directory metadata to a node
    pub async fn attach_metadata(&self, id: ItemId, metadata: Arc<Metadata>) {
        let mut state = self.state.lock().await;
        if let Some(node) = state.get_mut(id) {
            node.metadata = Some(metadata);
        }
    }

    /// Display label: the metadata label when one is attached and
    /// non-empty, else the directory name
    pub async fn label(&self, id: ItemId) -> Option<String> {
        let state = self.state.lock().await;
        state.get(id).map(|node| {
            node.metadata
                .as_ref()
                .and_then(|meta| meta.label())
                .unwrap_or_else(|| node.name.clone())
        })
    }

    pub async fn name(&self, id: ItemId) -> Option<String> {
        self.state.lock().await.get(id).map(|n| n.name.clone())
    }

    /// Source-relative path of a node; stable across reloads as long as
    /// the backend path has not moved
    pub async fn relative_path(&self, id: ItemId) -> Option<String> {
        self.state.lock().await.get(id).map(|n| n.rel_path.clone())
    }

    pub async fn is_empty(&self, id: ItemId) -> Option<bool> {
        self.state.lock().await.get(id).map(|n| n.is_empty)
    }

    pub async fn is_checked(&self, id: ItemId) -> Option<bool> {
        self.state.lock().await.get(id).map(|n| n.checked)
    }

    pub async fn is_root(&self, id: ItemId) -> Option<bool> {
        self.state.lock().await.get(id).map(|n| n.is_root)
    }

    pub async fn is_loaded(&self, id: ItemId) -> Option<bool> {
        self.state.lock().await.get(id).map(|n| n.state.is_loaded())
    }

    /// Child items of a node, in backend enumeration order
    pub async fn children(&self, id: ItemId) -> Vec<ItemId> {
        self.state
            .lock()
            .await
            .get(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// File leaves of a node, in backend enumeration order
    pub async fn files(&self, id: ItemId) -> Vec<PartFile> {
        self.state
            .lock()
            .await
            .get(id)
            .map(|n| n.files.clone())
            .unwrap_or_default()
    }

    /// Owning data source of a node
    pub async fn source(&self, id: ItemId) -> Option<Arc<dyn DataSource>> {
        self.state.lock().await.get(id).map(|n| Arc::clone(&n.source))
    }

    /// Find a child item by name under a loaded node
    pub async fn child_by_name(&self, id: ItemId, name: &str) -> Option<ItemId> {
        let state = self.state.lock().await;
        let node = state.get(id)?;
        node.children
            .iter()
            .copied()
            .find(|child| state.get(*child).map(|n| n.name == name).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::source::LocalDataSource;
    use crate::config::{DataSourceConfig, SourceKind};
    use crate::errors::{SourceError, SourceResult};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Backend that counts listings and can serve a canned layout
    #[derive(Debug)]
    struct CountingSource {
        listings: AtomicUsize,
        entries: Vec<DirEntry>,
        delay: std::time::Duration,
    }

    impl CountingSource {
        fn new(entries: Vec<DirEntry>) -> Arc<Self> {
            Arc::new(Self {
                listings: AtomicUsize::new(0),
                entries,
                delay: std::time::Duration::from_millis(10),
            })
        }

        fn file(name: &str) -> DirEntry {
            DirEntry {
                name: name.into(),
                is_dir: false,
                size: 1,
                modified: None,
            }
        }

        fn dir(name: &str) -> DirEntry {
            DirEntry {
                name: name.into(),
                is_dir: true,
                size: 0,
                modified: None,
            }
        }
    }

    #[async_trait]
    impl crate::app::source::DataSource for CountingSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Local
        }
        fn label(&self) -> &str {
            "counting"
        }
        fn source_id(&self) -> String {
            "test:counting".into()
        }
        fn concurrency_limit(&self) -> usize {
            4
        }
        fn config(&self) -> DataSourceConfig {
            DataSourceConfig::Local {
                label: "counting".into(),
                path: Default::default(),
            }
        }
        async fn list_children(&self, _rel_path: &str) -> SourceResult<Vec<DirEntry>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.entries.clone())
        }
        async fn copy_file(
            &self,
            _rel_path: &str,
            _dest: &Path,
            _controller: &Arc<crate::app::source::CopyController>,
        ) -> SourceResult<crate::app::source::CopyOutcome> {
            Err(SourceError::unavailable("counting", "not a copy backend"))
        }
    }

    #[tokio::test]
    async fn test_expand_classifies_children() {
        let source = CountingSource::new(vec![
            CountingSource::dir("gearbox"),
            CountingSource::file("bracket.prt.2"),
            CountingSource::file("notes.txt"),
        ]);
        let tree = CatalogTree::new();
        let root = tree.attach_source(source).await;

        tree.expand(root).await;

        assert_eq!(tree.is_loaded(root).await, Some(true));
        assert_eq!(tree.children(root).await.len(), 1);

        let files = tree.files(root).await;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].kind(), FileKind::PrtProe);
        assert_eq!(files[0].base_name(), "bracket.prt");
        assert_eq!(files[0].version(), 2);
        assert_eq!(files[1].kind(), FileKind::Undefined);
        assert_eq!(files[1].base_name(), "notes.txt");

        // A metadata-provided override takes precedence over the
        // captured base.
        tree.set_file_base_override(root, "bracket.prt.2", Some("bracket-v2".into()))
            .await;
        let files = tree.files(root).await;
        assert_eq!(files[0].base_name(), "bracket-v2");
    }

    #[tokio::test]
    async fn test_concurrent_expand_coalesces_to_one_listing() {
        let source = CountingSource::new(vec![CountingSource::file("a.prt")]);
        let tree = Arc::new(CatalogTree::new());
        let root = tree.attach_source(Arc::clone(&source) as Arc<dyn DataSource>).await;

        let t1 = {
            let tree = Arc::clone(&tree);
            tokio::spawn(async move { tree.expand(root).await })
        };
        let t2 = {
            let tree = Arc::clone(&tree);
            tokio::spawn(async move { tree.expand(root).await })
        };
        t1.await.unwrap();
        t2.await.unwrap();

        assert_eq!(source.listings.load(Ordering::SeqCst), 1);

        // And a later expand of the loaded node does not re-list either.
        tree.expand(root).await;
        assert_eq!(source.listings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_is_empty_propagates_to_ancestors() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/part.prt.1"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("hollow")).unwrap();

        let source: Arc<dyn DataSource> = Arc::new(LocalDataSource::new(
            "ws".into(),
            dir.path().to_path_buf(),
        ));
        let tree = CatalogTree::new();
        let root = tree.attach_source(source).await;

        tree.expand(root).await;
        assert_eq!(tree.is_empty(root).await, Some(true));

        let a = tree.child_by_name(root, "a").await.unwrap();
        tree.expand(a).await;
        let b = tree.child_by_name(a, "b").await.unwrap();
        tree.expand(b).await;

        // The classified file in a/b marks b, a and the root non-empty.
        assert_eq!(tree.is_empty(b).await, Some(false));
        assert_eq!(tree.is_empty(a).await, Some(false));
        assert_eq!(tree.is_empty(root).await, Some(false));

        // The structurally empty sibling stays empty.
        let hollow = tree.child_by_name(root, "hollow").await.unwrap();
        tree.expand(hollow).await;
        assert_eq!(tree.is_empty(hollow).await, Some(true));
    }

    #[tokio::test]
    async fn test_checked_propagates_down_not_up() {
        let source = CountingSource::new(vec![
            CountingSource::dir("sub"),
            CountingSource::file("a.prt"),
        ]);
        let tree = CatalogTree::new();
        let root = tree.attach_source(source).await;
        tree.expand(root).await;
        let sub = tree.child_by_name(root, "sub").await.unwrap();

        tree.set_checked(root, true).await;
        assert_eq!(tree.is_checked(root).await, Some(true));
        assert_eq!(tree.is_checked(sub).await, Some(true));
        assert!(tree.files(root).await[0].checked);

        // Unchecking a child does not propagate upward.
        tree.set_checked(sub, false).await;
        assert_eq!(tree.is_checked(root).await, Some(true));
        assert_eq!(tree.is_checked(sub).await, Some(false));
    }

    #[tokio::test]
    async fn test_checked_files_collects_requests() {
        let source = CountingSource::new(vec![
            CountingSource::file("a.prt"),
            CountingSource::file("b.sldprt"),
        ]);
        let tree = CatalogTree::new();
        let root = tree.attach_source(source).await;
        tree.expand(root).await;
        tree.set_checked(root, true).await;

        let mut requests = tree.checked_files().await;
        requests.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].rel_path, "a.prt");
        assert_eq!(requests[1].file_name, "b.sldprt");
    }

    #[tokio::test]
    async fn test_reload_resets_node() {
        let source = CountingSource::new(vec![CountingSource::file("a.prt")]);
        let tree = CatalogTree::new();
        let root = tree.attach_source(Arc::clone(&source) as Arc<dyn DataSource>).await;

        tree.expand(root).await;
        assert_eq!(tree.is_empty(root).await, Some(false));

        tree.reload(root).await;
        assert_eq!(tree.is_loaded(root).await, Some(false));
        assert_eq!(tree.is_empty(root).await, Some(true));
        assert!(tree.files(root).await.is_empty());

        // A fresh expand lists again.
        tree.expand(root).await;
        assert_eq!(source.listings.load(Ordering::SeqCst), 2);
        assert_eq!(tree.is_empty(root).await, Some(false));
    }

    #[tokio::test]
    async fn test_stale_ids_after_remove_source() {
        let source = CountingSource::new(vec![CountingSource::dir("sub")]);
        let tree = CatalogTree::new();
        let root = tree.attach_source(source).await;
        tree.expand(root).await;
        let sub = tree.child_by_name(root, "sub").await.unwrap();

        tree.remove_source(root).await;
        assert!(tree.roots().await.is_empty());
        assert_eq!(tree.name(root).await, None);
        assert_eq!(tree.name(sub).await, None);
    }

    #[tokio::test]
    async fn test_listing_failure_absorbed_as_empty() {
        let dir = TempDir::new().unwrap();
        let source: Arc<dyn DataSource> = Arc::new(LocalDataSource::new(
            "ws".into(),
            dir.path().join("gone"),
        ));
        let tree = CatalogTree::new();
        let root = tree.attach_source(source).await;

        tree.expand(root).await;

        // Node ends up loaded and empty, not wedged in Loading.
        assert_eq!(tree.is_loaded(root).await, Some(true));
        assert_eq!(tree.is_empty(root).await, Some(true));
        assert!(tree.children(root).await.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_overlay_dir_not_materialized() {
        let source = CountingSource::new(vec![
            CountingSource::dir(meta_consts::INDEX_DIR),
            CountingSource::dir("real"),
        ]);
        let tree = CatalogTree::new();
        let root = tree.attach_source(source).await;
        tree.expand(root).await;

        assert_eq!(tree.children(root).await.len(), 1);
        assert!(tree.child_by_name(root, "real").await.is_some());
    }
}
