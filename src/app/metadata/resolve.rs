//! Directory metadata resolution
//!
//! A [`Metadata`] is an immutable snapshot of one directory's overlay:
//! its parsed store, its resolved include chain, the active language
//! group, and lazily computed lookups (columns, thumbnails, version
//! groups). Include chains resolve at construction and stay fixed for
//! the instance's lifetime; picking up on-disk changes means discarding
//! the instance and loading a fresh one.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::app::classify::classify;
use crate::app::metadata::store::MetadataStore;
use crate::constants::metadata as consts;
use crate::errors::{MetadataError, MetadataResult};

/// Resolved metadata for one catalog directory
#[derive(Debug)]
pub struct Metadata {
    dir: PathBuf,
    store: MetadataStore,
    active_language: Option<String>,
    includes: Vec<Metadata>,
    /// Image files found under the local thumbnails directory, keyed by
    /// base name
    local_thumbnails: HashMap<String, PathBuf>,
    /// Plain file names present in the directory at load time
    dir_files: Vec<String>,
    columns: OnceCell<Vec<String>>,
    thumbnails: OnceCell<HashMap<String, PathBuf>>,
    versions: OnceCell<HashMap<String, Vec<String>>>,
}

impl Metadata {
    /// Load the metadata overlay of `dir`.
    ///
    /// A missing store file yields an empty instance, not an error.
    /// Includes are resolved recursively; a chain that loops back onto a
    /// directory already on the current resolution path is rejected with
    /// [`MetadataError::IncludeCycle`].
    pub async fn load(dir: &Path, language: Option<&str>) -> MetadataResult<Self> {
        let mut chain = HashSet::new();
        load_in_chain(dir.to_path_buf(), language.map(str::to_string), &mut chain).await
    }

    /// An empty overlay for a directory with no usable metadata
    pub fn empty(dir: PathBuf) -> Self {
        Self {
            dir,
            store: MetadataStore::new(),
            active_language: None,
            includes: Vec::new(),
            local_thumbnails: HashMap::new(),
            dir_files: Vec::new(),
            columns: OnceCell::new(),
            thumbnails: OnceCell::new(),
            versions: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Language group this instance resolved to
    pub fn active_language(&self) -> Option<&str> {
        self.active_language.as_deref()
    }

    pub fn includes(&self) -> &[Metadata] {
        &self.includes
    }

    /// Directory display label from the active language group
    pub fn label(&self) -> Option<String> {
        let lang = self.active_language.as_deref()?;
        self.store
            .value(&format!("{}/{}/label", consts::PARAMS_GROUP, lang))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Column labels for part listings.
    ///
    /// When includes exist their columns are concatenated in include
    /// order and the local numbered columns are ignored; otherwise the
    /// active language group's numeric keys are read in ascending order.
    pub fn column_labels(&self) -> &[String] {
        self.columns.get_or_init(|| {
            if !self.includes.is_empty() {
                return self
                    .includes
                    .iter()
                    .flat_map(|inc| inc.column_labels().iter().cloned())
                    .collect();
            }
            let Some(lang) = self.active_language.as_deref() else {
                return Vec::new();
            };
            let prefix = format!("{}/{}", consts::PARAMS_GROUP, lang);
            let mut numbered: Vec<(usize, String)> = self
                .store
                .child_keys(&prefix)
                .into_iter()
                .filter_map(|key| {
                    let index: usize = key.parse().ok()?;
                    let value = self.store.value(&format!("{}/{}", prefix, key))?;
                    Some((index, value.to_string()))
                })
                .collect();
            numbered.sort_by_key(|(index, _)| *index);
            numbered.into_iter().map(|(_, label)| label).collect()
        })
    }

    /// Parameter value for one part and column.
    ///
    /// Lookup order: active-language value, first non-empty value in any
    /// other language group, parameterless value keyed by column alone,
    /// then includes in declaration order.
    pub fn part_param(&self, base_name: &str, column: usize) -> Option<String> {
        let group = part_group(base_name);

        if let Some(lang) = self.active_language.as_deref() {
            if let Some(value) = self.non_empty(&format!("{}/{}/{}", group, lang, column)) {
                return Some(value);
            }
        }
        for lang in self.store.child_groups(group) {
            if let Some(value) = self.non_empty(&format!("{}/{}/{}", group, lang, column)) {
                return Some(value);
            }
        }
        if let Some(value) = self.non_empty(&format!("{}/{}", group, column)) {
            return Some(value);
        }
        self.includes
            .iter()
            .find_map(|inc| inc.part_param(base_name, column))
    }

    /// Thumbnail paths by part base name. Includes contribute first with
    /// earlier includes winning; a local thumbnail overrides them all.
    pub fn part_thumbnail_paths(&self) -> &HashMap<String, PathBuf> {
        self.thumbnails.get_or_init(|| {
            let mut map = HashMap::new();
            for inc in self.includes.iter().rev() {
                map.extend(inc.part_thumbnail_paths().clone());
            }
            map.extend(self.local_thumbnails.clone());
            map
        })
    }

    /// Thumbnail for one part, if any store in the chain has it
    pub fn part_thumbnail_path(&self, base_name: &str) -> Option<&Path> {
        self.part_thumbnail_paths()
            .get(base_name)
            .map(PathBuf::as_path)
    }

    /// Version groups: base name to version-suffixed file names present
    /// in the directory, ascending by version
    pub fn part_versions(&self) -> &HashMap<String, Vec<String>> {
        self.versions.get_or_init(|| {
            let mut grouped: HashMap<String, Vec<(u32, String)>> = HashMap::new();
            for name in &self.dir_files {
                let classification = classify(name);
                if classification.version == 0 {
                    continue;
                }
                if let Some(base) = classification.base_name {
                    grouped
                        .entry(base)
                        .or_default()
                        .push((classification.version, name.clone()));
                }
            }
            grouped
                .into_iter()
                .map(|(base, mut versions)| {
                    versions.sort_by_key(|(v, _)| *v);
                    (base, versions.into_iter().map(|(_, name)| name).collect())
                })
                .collect()
        })
    }

    /// Local store with the given part's group removed; the on-disk
    /// rewrite and cache replacement happen at the cache layer
    pub(crate) fn store_without_part(&self, base_name: &str) -> (MetadataStore, usize) {
        let mut store = self.store.clone();
        let removed = store.remove_group(part_group(base_name));
        (store, removed)
    }

    pub(crate) fn store_path(&self) -> PathBuf {
        store_path(&self.dir)
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.store
            .value(key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Part parameter group name: the base name up to its first dot
fn part_group(base_name: &str) -> &str {
    base_name.split('.').next().unwrap_or(base_name)
}

pub(crate) fn store_path(dir: &Path) -> PathBuf {
    dir.join(consts::INDEX_DIR).join(consts::STORE_FILE)
}

/// Lexical path normalization, enough for cycle detection across
/// `..`-relative includes
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Active language group: 2-char prefix of the requested language if
/// declared, else the fallback language, else the first declared group
fn pick_language(store: &MetadataStore, requested: Option<&str>) -> Option<String> {
    let declared = store.child_groups(consts::PARAMS_GROUP);
    if declared.is_empty() {
        return None;
    }
    if let Some(requested) = requested {
        let short: String = requested.chars().take(2).collect();
        if declared.iter().any(|g| *g == short) {
            return Some(short);
        }
    }
    if declared.iter().any(|g| g == consts::FALLBACK_LANGUAGE) {
        return Some(consts::FALLBACK_LANGUAGE.to_string());
    }
    declared.into_iter().next()
}

/// Declared include paths: the data and thumbnails lists merged in
/// declaration order, resolved against `dir` and deduplicated
fn include_paths(store: &MetadataStore, dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    let lists = [
        format!("{}/data", consts::INCLUDE_GROUP),
        format!("{}/thumbnails", consts::INCLUDE_GROUP),
    ];
    for list in &lists {
        for (_, value) in store.group_entries(list) {
            if value.is_empty() {
                continue;
            }
            let raw = Path::new(&value);
            let resolved = if raw.is_absolute() {
                raw.to_path_buf()
            } else {
                dir.join(raw)
            };
            let resolved = normalize(&resolved);
            if !out.contains(&resolved) {
                out.push(resolved);
            }
        }
    }
    out
}

fn load_in_chain<'a>(
    dir: PathBuf,
    language: Option<String>,
    chain: &'a mut HashSet<PathBuf>,
) -> BoxFuture<'a, MetadataResult<Metadata>> {
    Box::pin(async move {
        let normalized = normalize(&dir);
        if !chain.insert(normalized.clone()) {
            return Err(MetadataError::IncludeCycle { path: normalized });
        }

        let store = match tokio::fs::read_to_string(store_path(&dir)).await {
            Ok(text) => MetadataStore::parse(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataStore::new(),
            Err(e) => return Err(e.into()),
        };

        let active_language = pick_language(&store, language.as_deref());
        let local_thumbnails = scan_thumbnails(&dir).await;
        let dir_files = scan_files(&dir).await;

        let mut includes = Vec::new();
        for include_dir in include_paths(&store, &dir) {
            includes.push(load_in_chain(include_dir, language.clone(), chain).await?);
        }
        chain.remove(&normalized);

        debug!(
            "Resolved metadata for {} ({} includes, language {:?})",
            dir.display(),
            includes.len(),
            active_language
        );
        Ok(Metadata {
            dir,
            store,
            active_language,
            includes,
            local_thumbnails,
            dir_files,
            columns: OnceCell::new(),
            thumbnails: OnceCell::new(),
            versions: OnceCell::new(),
        })
    })
}

/// Image files under the thumbnails overlay directory, keyed by base name
async fn scan_thumbnails(dir: &Path) -> HashMap<String, PathBuf> {
    let thumbs_dir = dir.join(consts::INDEX_DIR).join(consts::THUMBNAILS_DIR);
    let mut map = HashMap::new();
    let Ok(mut entries) = tokio::fs::read_dir(&thumbs_dir).await else {
        return map;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let has_image_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                consts::THUMBNAIL_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);
        if !has_image_ext {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            map.insert(stem.to_string(), path.clone());
        }
    }
    map
}

/// Plain file names directly in the directory; unreadable directories
/// yield an empty listing
async fn scan_files(dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry
            .file_type()
            .await
            .map(|ft| ft.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push(name.to_string());
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_store(dir: &Path, text: &str) {
        let path = store_path(dir);
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, text).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_store_yields_empty_metadata() {
        let root = TempDir::new().unwrap();
        let meta = Metadata::load(root.path(), Some("en")).await.unwrap();
        assert_eq!(meta.label(), None);
        assert!(meta.column_labels().is_empty());
        assert!(meta.includes().is_empty());
    }

    #[tokio::test]
    async fn test_language_fallback_chain() {
        let root = TempDir::new().unwrap();
        write_store(
            root.path(),
            "[params]\ncs/label=Šrouby\nde/label=Schrauben\n",
        )
        .await;

        // Requested language declared: exact group wins.
        let meta = Metadata::load(root.path(), Some("cs_CZ")).await.unwrap();
        assert_eq!(meta.active_language(), Some("cs"));
        assert_eq!(meta.label().as_deref(), Some("Šrouby"));

        // Requested language absent and no `en`: first declared group.
        let meta = Metadata::load(root.path(), Some("fr")).await.unwrap();
        assert_eq!(meta.active_language(), Some("cs"));

        // `en` outranks first-declared when present.
        write_store(
            root.path(),
            "[params]\ncs/label=Šrouby\nen/label=Bolts\n",
        )
        .await;
        let meta = Metadata::load(root.path(), Some("fr")).await.unwrap();
        assert_eq!(meta.label().as_deref(), Some("Bolts"));
    }

    #[tokio::test]
    async fn test_local_column_labels_numeric_order() {
        let root = TempDir::new().unwrap();
        write_store(
            root.path(),
            "[params]\nen/10=Tenth\nen/2=Material\nen/1=Weight\n",
        )
        .await;
        let meta = Metadata::load(root.path(), Some("en")).await.unwrap();
        assert_eq!(meta.column_labels(), ["Weight", "Material", "Tenth"]);
    }

    #[tokio::test]
    async fn test_include_columns_replace_local() {
        let root = TempDir::new().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        let main = root.path().join("main");
        write_store(&a, "[params]\nen/1=A1\nen/2=A2\n").await;
        write_store(&b, "[params]\nen/1=B1\n").await;
        write_store(
            &main,
            "[params]\nen/1=LocalIgnored\n\n[include]\ndata/1=../a\ndata/2=../b\n",
        )
        .await;

        let meta = Metadata::load(&main, Some("en")).await.unwrap();
        assert_eq!(meta.column_labels(), ["A1", "A2", "B1"]);
    }

    #[tokio::test]
    async fn test_part_param_fallback_order() {
        let root = TempDir::new().unwrap();
        let shared = root.path().join("shared");
        let main = root.path().join("main");
        write_store(&shared, "[bracket]\nen/1=FromInclude\n").await;
        write_store(
            &main,
            "[params]\nen/label=Parts\n\n[bracket]\nen/1=Steel\ncs/2=Ocel\n3=Bare\n\n[include]\ndata/1=../shared\n",
        )
        .await;
        let meta = Metadata::load(&main, Some("en")).await.unwrap();

        // Active language hit.
        assert_eq!(meta.part_param("bracket.prt", 1).as_deref(), Some("Steel"));
        // Falls through active language to another language group.
        assert_eq!(meta.part_param("bracket.prt", 2).as_deref(), Some("Ocel"));
        // Parameterless column key.
        assert_eq!(meta.part_param("bracket.prt", 3).as_deref(), Some("Bare"));
        // Nothing local: first include that answers.
        let meta_no_local = Metadata::load(&shared, Some("en")).await.unwrap();
        assert_eq!(
            meta_no_local.part_param("bracket.prt", 1).as_deref(),
            Some("FromInclude")
        );
        // Unknown column.
        assert_eq!(meta.part_param("bracket.prt", 9), None);
    }

    #[tokio::test]
    async fn test_include_cycle_rejected() {
        let root = TempDir::new().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        write_store(&a, "[include]\ndata/1=../b\n").await;
        write_store(&b, "[include]\ndata/1=../a\n").await;

        let err = Metadata::load(&a, Some("en")).await.unwrap_err();
        assert!(matches!(err, MetadataError::IncludeCycle { .. }));
    }

    #[tokio::test]
    async fn test_diamond_includes_are_not_cycles() {
        let root = TempDir::new().unwrap();
        let shared = root.path().join("shared");
        let a = root.path().join("a");
        let b = root.path().join("b");
        let main = root.path().join("main");
        write_store(&shared, "[params]\nen/1=Common\n").await;
        write_store(&a, "[include]\ndata/1=../shared\n").await;
        write_store(&b, "[include]\ndata/1=../shared\n").await;
        write_store(&main, "[include]\ndata/1=../a\ndata/2=../b\n").await;

        let meta = Metadata::load(&main, Some("en")).await.unwrap();
        assert_eq!(meta.column_labels(), ["Common", "Common"]);
    }

    #[tokio::test]
    async fn test_thumbnails_local_overrides_includes() {
        let root = TempDir::new().unwrap();
        let shared = root.path().join("shared");
        let main = root.path().join("main");

        let shared_thumbs = shared.join(consts::INDEX_DIR).join(consts::THUMBNAILS_DIR);
        tokio::fs::create_dir_all(&shared_thumbs).await.unwrap();
        tokio::fs::write(shared_thumbs.join("bracket.prt.png"), b"png")
            .await
            .unwrap();
        tokio::fs::write(shared_thumbs.join("shaft.prt.jpg"), b"jpg")
            .await
            .unwrap();

        let main_thumbs = main.join(consts::INDEX_DIR).join(consts::THUMBNAILS_DIR);
        tokio::fs::create_dir_all(&main_thumbs).await.unwrap();
        tokio::fs::write(main_thumbs.join("bracket.prt.png"), b"png")
            .await
            .unwrap();
        write_store(&main, "[include]\nthumbnails/1=../shared\n").await;

        let meta = Metadata::load(&main, Some("en")).await.unwrap();
        let thumbs = meta.part_thumbnail_paths();
        assert_eq!(thumbs.len(), 2);
        assert!(thumbs["bracket.prt"].starts_with(&main));
        assert!(thumbs["shaft.prt"].starts_with(&shared));
        assert!(meta.part_thumbnail_path("missing.prt").is_none());
    }

    #[tokio::test]
    async fn test_part_versions_grouped_and_sorted() {
        let root = TempDir::new().unwrap();
        for name in ["bracket.prt.3", "bracket.prt.1", "shaft.asm.2", "notes.txt"] {
            tokio::fs::write(root.path().join(name), b"x").await.unwrap();
        }
        let meta = Metadata::load(root.path(), Some("en")).await.unwrap();
        let versions = meta.part_versions();
        assert_eq!(
            versions["bracket.prt"],
            vec!["bracket.prt.1", "bracket.prt.3"]
        );
        assert_eq!(versions["shaft.asm"], vec!["shaft.asm.2"]);
        assert!(!versions.contains_key("notes.txt"));
    }
}
