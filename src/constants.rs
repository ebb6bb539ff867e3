//! Application constants for cadvault
//!
//! Centralizes the constants used throughout the crate, organized by
//! functional domain.

use std::time::Duration;

/// Metadata overlay layout inside catalog directories
pub mod metadata {
    /// Directory (inside a catalog directory) holding the metadata overlay
    pub const INDEX_DIR: &str = "0000-index";

    /// Metadata store file name inside [`INDEX_DIR`]
    pub const STORE_FILE: &str = "metadata.ini";

    /// Thumbnail directory inside [`INDEX_DIR`]
    pub const THUMBNAILS_DIR: &str = "thumbnails";

    /// Recognized thumbnail image extensions (lowercase)
    pub const THUMBNAIL_EXTENSIONS: &[&str] = &["png", "jpg"];

    /// Language group that is preferred when the application language has
    /// no parameter group of its own
    pub const FALLBACK_LANGUAGE: &str = "en";

    /// Configuration group holding include declarations
    pub const INCLUDE_GROUP: &str = "include";

    /// Configuration group holding parameter definitions
    pub const PARAMS_GROUP: &str = "params";
}

/// Transfer engine tuning
pub mod transfer {
    use super::Duration;

    /// Copy chunk size; abort requests take effect between chunks
    pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

    /// Default concurrency cap for local data sources, chosen
    /// conservatively for spinning disks
    pub const LOCAL_CONCURRENCY: usize = 3;

    /// Default concurrency cap for FTP data sources; most servers allow
    /// only one or two data connections per account
    pub const FTP_CONCURRENCY: usize = 1;

    /// Idle poll interval while waiting for in-flight transfers to settle
    pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);
}

/// FTP backend defaults
pub mod ftp {
    /// Default FTP control port
    pub const DEFAULT_PORT: u16 = 21;
}

/// Persisted configuration keys (one table per data source)
pub mod config {
    /// Discriminator key selecting the source variant
    pub const KEY_TYPE: &str = "dataSourceType";

    /// Variant value for local directory sources
    pub const TYPE_LOCAL: &str = "local";

    /// Variant value for FTP sources
    pub const TYPE_FTP: &str = "ftp";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_sane() {
        assert!(transfer::COPY_CHUNK_SIZE >= 4096);
        assert!(transfer::LOCAL_CONCURRENCY >= 1);
        assert!(transfer::FTP_CONCURRENCY >= 1);
        assert_eq!(ftp::DEFAULT_PORT, 21);
        assert_eq!(metadata::FALLBACK_LANGUAGE, "en");
    }
}
