//! Persisted data-source configuration
//!
//! One TOML table per data source, keyed by `dataSourceType`. Loading is
//! per-entry lenient: a malformed source table is skipped (and reported)
//! without losing the remaining sources. Saving reproduces every persisted
//! field losslessly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::ftp;
use crate::errors::{ConfigError, ConfigResult};

/// Kind discriminator for data-source configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Ftp,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Ftp => write!(f, "ftp"),
        }
    }
}

/// Persisted configuration of a single data source.
///
/// The serialized form is one key/value table with `dataSourceType`
/// selecting the variant, matching what the settings layer stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dataSourceType", rename_all = "lowercase")]
pub enum DataSourceConfig {
    Local {
        /// User-visible label
        label: String,
        /// Root directory of the source
        path: PathBuf,
    },
    Ftp {
        /// User-visible label
        label: String,
        host: String,
        port: u16,
        #[serde(rename = "baseDir")]
        base_dir: String,
        login: String,
        password: String,
        #[serde(rename = "passiveMode")]
        passive_mode: bool,
    },
}

impl DataSourceConfig {
    /// Variant kind of this configuration
    pub fn kind(&self) -> SourceKind {
        match self {
            DataSourceConfig::Local { .. } => SourceKind::Local,
            DataSourceConfig::Ftp { .. } => SourceKind::Ftp,
        }
    }

    /// User-visible label
    pub fn label(&self) -> &str {
        match self {
            DataSourceConfig::Local { label, .. } => label,
            DataSourceConfig::Ftp { label, .. } => label,
        }
    }

    /// Replace the user-visible label
    pub fn set_label(&mut self, new_label: impl Into<String>) {
        match self {
            DataSourceConfig::Local { label, .. } => *label = new_label.into(),
            DataSourceConfig::Ftp { label, .. } => *label = new_label.into(),
        }
    }

    /// Empty configuration for a variant, carrying over a label
    pub fn empty(kind: SourceKind, label: impl Into<String>) -> Self {
        match kind {
            SourceKind::Local => DataSourceConfig::Local {
                label: label.into(),
                path: PathBuf::new(),
            },
            SourceKind::Ftp => DataSourceConfig::Ftp {
                label: label.into(),
                host: String::new(),
                port: ftp::DEFAULT_PORT,
                base_dir: String::new(),
                login: String::new(),
                password: String::new(),
                passive_mode: true,
            },
        }
    }

    /// Construct the live backend this configuration describes
    pub fn into_source(&self) -> std::sync::Arc<dyn crate::app::source::DataSource> {
        crate::app::source::from_config(self)
    }
}

/// Full persisted configuration: the active source list plus the chosen
/// display language
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcesConfig {
    /// Data sources in display order
    pub sources: Vec<DataSourceConfig>,
    /// Display language in `ll_CC` form (`en_US`); `None` means detect
    pub language: Option<String>,
}

/// Serialized shape of [`SourcesConfig`]. Source tables are kept as raw
/// values on load so one bad entry cannot poison the rest.
#[derive(Debug, Serialize, Deserialize, Default)]
struct SourcesConfigRaw {
    #[serde(default)]
    language: Option<String>,
    #[serde(default, rename = "source")]
    sources: Vec<toml::Value>,
}

impl SourcesConfig {
    /// Parse configuration from TOML text.
    ///
    /// Returns the loaded configuration together with one
    /// [`ConfigError::ConfigInvalid`] record per skipped source table.
    pub fn from_toml(text: &str) -> ConfigResult<(Self, Vec<ConfigError>)> {
        let raw: SourcesConfigRaw = toml::from_str(text)?;

        let mut sources = Vec::with_capacity(raw.sources.len());
        let mut skipped = Vec::new();

        for (index, value) in raw.sources.into_iter().enumerate() {
            match value.clone().try_into::<DataSourceConfig>() {
                Ok(source) => sources.push(source),
                Err(e) => {
                    let label = value
                        .get("label")
                        .and_then(|v| v.as_str())
                        .unwrap_or("<unnamed>")
                        .to_string();
                    warn!("Skipping invalid data source entry {} ('{}'): {}", index, label, e);
                    skipped.push(ConfigError::ConfigInvalid {
                        label,
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            "Loaded {} data sources ({} invalid entries skipped)",
            sources.len(),
            skipped.len()
        );

        Ok((
            Self {
                sources,
                language: raw.language,
            },
            skipped,
        ))
    }

    /// Serialize the configuration to TOML text
    pub fn to_toml(&self) -> ConfigResult<String> {
        let raw = SourcesConfigRaw {
            language: self.language.clone(),
            sources: self
                .sources
                .iter()
                .map(toml::Value::try_from)
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(toml::to_string_pretty(&raw)?)
    }

    /// Load from a configuration file. A missing file yields the default
    /// (empty) configuration.
    pub async fn load(path: &Path) -> ConfigResult<(Self, Vec<ConfigError>)> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration file at {}, starting empty", path.display());
                Ok((Self::default(), Vec::new()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save to a configuration file, creating parent directories as needed
    pub async fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_toml()?).await?;
        debug!("Saved {} data sources to {}", self.sources.len(), path.display());
        Ok(())
    }

    /// Default per-user configuration path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cadvault").join("sources.toml"))
    }
}

/// Transient per-variant drafts for an add/edit flow.
///
/// While a user edits a source and toggles its type, each variant keeps its
/// own in-progress edits; switching back to a previously visited variant
/// restores that variant's draft instead of discarding it.
#[derive(Debug, Clone)]
pub struct DraftSet {
    drafts: HashMap<SourceKind, DataSourceConfig>,
    current: SourceKind,
}

impl DraftSet {
    /// Start an add/edit flow from an existing configuration (or an empty
    /// one for "add")
    pub fn new(initial: DataSourceConfig) -> Self {
        let current = initial.kind();
        let mut drafts = HashMap::new();
        drafts.insert(current, initial);
        Self { drafts, current }
    }

    /// Switch the edited variant. In-progress edits of the variant being
    /// left are preserved; an earlier draft for the target variant is
    /// restored, otherwise a fresh draft carrying the current label is
    /// created.
    pub fn switch_to(&mut self, kind: SourceKind) {
        if kind == self.current {
            return;
        }
        if !self.drafts.contains_key(&kind) {
            let label = self.current().label().to_string();
            self.drafts.insert(kind, DataSourceConfig::empty(kind, label));
        }
        self.current = kind;
    }

    /// The draft currently being edited
    pub fn current(&self) -> &DataSourceConfig {
        &self.drafts[&self.current]
    }

    /// Mutable access to the draft currently being edited
    pub fn current_mut(&mut self) -> &mut DataSourceConfig {
        self.drafts
            .get_mut(&self.current)
            .expect("current draft always present")
    }

    /// Finish the flow, yielding the edited configuration
    pub fn into_config(mut self) -> DataSourceConfig {
        self.drafts
            .remove(&self.current)
            .expect("current draft always present")
    }
}
