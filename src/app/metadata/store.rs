//! On-disk metadata store
//!
//! Each catalog directory may carry a `0000-index/metadata.ini` file: a
//! sectioned key/value format where keys nest into groups with `/`.
//! Declaration order is significant (numeric column keys fall back to it,
//! include lists are ordered), so the store keeps entries in a flat
//! ordered list rather than a map.

use std::path::Path;

use tracing::debug;

use crate::errors::{MetadataError, MetadataResult};

/// Parsed metadata store with declaration order preserved.
///
/// Keys are full slash-joined paths, e.g. `params/en/my_part.prt/weight`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataStore {
    entries: Vec<(String, String)>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse store text.
    ///
    /// Sections (`[name]`) prefix the keys that follow them; blank lines
    /// and `;`/`#` comments are skipped; any other line without `=` is a
    /// syntax error carrying its line number.
    pub fn parse(text: &str) -> MetadataResult<Self> {
        let mut entries = Vec::new();
        let mut section = String::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(MetadataError::InvalidSyntax {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(MetadataError::InvalidSyntax {
                    line: idx + 1,
                    content: line.to_string(),
                });
            }
            let full_key = if section.is_empty() {
                key.to_string()
            } else {
                format!("{}/{}", section, key)
            };
            entries.push((full_key, unquote(value.trim())));
        }
        Ok(Self { entries })
    }

    /// Serialize back to store text: ungrouped keys first, then one
    /// section per top-level group in first-appearance order
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        // Bare keys must come before any section header so they parse
        // back without a section prefix.
        for (key, value) in &self.entries {
            if !key.contains('/') {
                out.push_str(&format!("{}={}\n", key, quote(value)));
            }
        }

        let mut sections: Vec<&str> = Vec::new();
        for (key, _) in &self.entries {
            if let Some((head, _)) = key.split_once('/') {
                if !sections.contains(&head) {
                    sections.push(head);
                }
            }
        }

        for section in sections {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", section));
            for (key, value) in &self.entries {
                if let Some(sub) = key.strip_prefix(section).and_then(|r| r.strip_prefix('/')) {
                    out.push_str(&format!("{}={}\n", sub, quote(value)));
                }
            }
        }
        out
    }

    /// Read and parse a store file
    pub async fn load(path: &Path) -> MetadataResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        debug!("Loaded metadata store from {}", path.display());
        Self::parse(&text)
    }

    /// Write the store atomically (temp file then rename)
    pub async fn save(&self, path: &Path) -> MetadataResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("ini.tmp");
        tokio::fs::write(&tmp, self.serialize()).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Saved metadata store to {}", path.display());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of a full key, first declaration wins
    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set or append a key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Distinct next-level group names under a prefix, in declaration order
    pub fn child_groups(&self, prefix: &str) -> Vec<String> {
        self.collect_children(prefix, true)
    }

    /// Terminal key names directly under a prefix, in declaration order
    pub fn child_keys(&self, prefix: &str) -> Vec<String> {
        self.collect_children(prefix, false)
    }

    fn collect_children(&self, prefix: &str, groups: bool) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (key, _) in &self.entries {
            let rest = if prefix.is_empty() {
                key.as_str()
            } else {
                match key.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            let (head, is_group) = match rest.split_once('/') {
                Some((head, _)) => (head, true),
                None => (rest, false),
            };
            if is_group == groups && !head.is_empty() && !out.iter().any(|h| h == head) {
                out.push(head.to_string());
            }
        }
        out
    }

    /// Remove every key under a group prefix; returns how many were removed
    pub fn remove_group(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(k, _)| !(k == prefix || k.starts_with(&format!("{}/", prefix))));
        before - self.entries.len()
    }

    /// All entries under a group prefix with the prefix stripped,
    /// declaration order preserved
    pub fn group_entries(&self, prefix: &str) -> Vec<(String, String)> {
        let lead = format!("{}/", prefix);
        self.entries
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&lead)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect()
    }
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

fn quote(value: &str) -> String {
    if value.is_empty()
        || value.starts_with(' ')
        || value.ends_with(' ')
        || value.contains(';')
        || value.contains('#')
    {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
; part catalog metadata
[params]
en/label=Gearboxes
cs/label=Převodovky
en/1=Weight
en/2=Material

[include]
data/1=../shared
data/2=/templates/bolts
thumbnails/1=../shared
";

    #[test]
    fn test_parse_nested_keys_and_comments() {
        let store = MetadataStore::parse(SAMPLE).unwrap();
        assert_eq!(store.value("params/en/label"), Some("Gearboxes"));
        assert_eq!(store.value("params/cs/label"), Some("Převodovky"));
        assert_eq!(store.value("include/data/2"), Some("/templates/bolts"));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let store = MetadataStore::parse(SAMPLE).unwrap();
        assert_eq!(store.child_keys("params/en"), vec!["label", "1", "2"]);
        assert_eq!(
            store.group_entries("include/data"),
            vec![
                ("1".to_string(), "../shared".to_string()),
                ("2".to_string(), "/templates/bolts".to_string()),
            ]
        );
    }

    #[test]
    fn test_child_groups() {
        let store = MetadataStore::parse(SAMPLE).unwrap();
        assert_eq!(store.child_groups(""), vec!["params", "include"]);
        assert_eq!(store.child_groups("params"), vec!["en", "cs"]);
        assert_eq!(store.child_groups("include"), vec!["data", "thumbnails"]);
    }

    #[test]
    fn test_invalid_line_reports_position() {
        let err = MetadataStore::parse("[params]\nen/label=ok\nbogus line\n").unwrap_err();
        match err {
            MetadataError::InvalidSyntax { line, content } => {
                assert_eq!(line, 3);
                assert_eq!(content, "bogus line");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let store = MetadataStore::parse(SAMPLE).unwrap();
        let text = store.serialize();
        let reparsed = MetadataStore::parse(&text).unwrap();
        assert_eq!(store, reparsed);
    }

    #[test]
    fn test_ungrouped_keys_round_trip() {
        let mut store = MetadataStore::new();
        store.set("version", "2");
        store.set("params/en/label", "Bolts");

        let text = store.serialize();
        assert!(text.starts_with("version=2\n"));

        let reparsed = MetadataStore::parse(&text).unwrap();
        assert_eq!(reparsed, store);
        assert_eq!(reparsed.value("version"), Some("2"));
    }

    #[test]
    fn test_remove_group() {
        let mut store = MetadataStore::parse(SAMPLE).unwrap();
        let removed = store.remove_group("params/en");
        assert_eq!(removed, 3);
        assert_eq!(store.value("params/en/label"), None);
        assert_eq!(store.value("params/cs/label"), Some("Převodovky"));
    }

    #[test]
    fn test_quoted_values() {
        let store = MetadataStore::parse("[params]\nen/label=\"  padded  \"\n").unwrap();
        assert_eq!(store.value("params/en/label"), Some("  padded  "));
        let text = store.serialize();
        assert!(text.contains("\"  padded  \""));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0000-index").join("metadata.ini");
        let mut store = MetadataStore::new();
        store.set("params/en/label", "Bolts");
        store.save(&path).await.unwrap();

        let loaded = MetadataStore::load(&path).await.unwrap();
        assert_eq!(loaded.value("params/en/label"), Some("Bolts"));
    }
}
