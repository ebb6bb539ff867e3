//! Core application logic for cadvault
//!
//! This module contains the main application components: part
//! classification, data-source backends, the lazy catalog tree, the
//! per-directory metadata overlay and the download queue.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cadvault::app::source::{from_config, DataSource};
//! use cadvault::app::tree::CatalogTree;
//! use cadvault::app::transfer::TransferEngine;
//! use cadvault::config::DataSourceConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DataSourceConfig::Local {
//!     label: "workshop".into(),
//!     path: "/srv/parts".into(),
//! };
//! let source = from_config(&config);
//!
//! let tree = CatalogTree::new();
//! let root = tree.attach_source(source).await;
//! tree.expand(root).await;
//! tree.set_checked(root, true).await;
//!
//! let engine = TransferEngine::new();
//! engine
//!     .enqueue(tree.checked_files().await, "/tmp/downloads".as_ref())
//!     .await;
//! engine.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod metadata;
pub mod source;
pub mod transfer;
pub mod tree;

// Re-export main public API
pub use classify::{classify, Classification, FileKind};
pub use metadata::{Metadata, MetadataCache, MetadataStore};
pub use source::{from_config, CopyController, CopyOutcome, DataSource, DirEntry};
pub use transfer::{BatchProgress, BatchState, TransferEngine, TransferEvent, TransferRequest};
pub use tree::{CatalogTree, ItemId, PartFile};
