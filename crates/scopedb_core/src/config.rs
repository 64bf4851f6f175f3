//! Repository and engine configuration.

/// Configuration for a [`crate::Repository`].
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Page size used by `many` when the caller gives none.
    pub default_page_size: usize,

    /// Upper bound applied to any requested page size.
    pub max_page_size: usize,

    /// Number of documents pulled from an engine cursor per batch.
    pub scan_batch_size: usize,

    /// Whether `update` rejects writes whose version is behind the stored one.
    pub optimistic_concurrency: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 10_000,
            scan_batch_size: 256,
            optimistic_concurrency: true,
        }
    }
}

impl RepositoryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the maximum page size.
    #[must_use]
    pub const fn max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Sets the cursor batch size.
    #[must_use]
    pub const fn scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Enables or disables version checks on update.
    #[must_use]
    pub const fn optimistic_concurrency(mut self, value: bool) -> Self {
        self.optimistic_concurrency = value;
        self
    }

    /// Clamps a requested page size into `1..=max_page_size`.
    pub(crate) fn effective_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

/// Configuration for opening a [`crate::engine::LogEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether to create the data file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the log after every write call.
    pub sync_on_commit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the data file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync on every write.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}
