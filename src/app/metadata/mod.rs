//! Per-directory metadata overlay
//!
//! Catalog directories can carry an overlay under `0000-index/`: a
//! `metadata.ini` store with labels, column definitions, per-part
//! parameters and include declarations, plus a `thumbnails/` image
//! directory. This module parses the store ([`store::MetadataStore`]),
//! resolves it with its include chain into an immutable [`Metadata`]
//! snapshot, and caches snapshots per directory in a [`MetadataCache`].

pub mod cache;
pub mod resolve;
pub mod store;

pub use cache::MetadataCache;
pub use resolve::Metadata;
pub use store::MetadataStore;
