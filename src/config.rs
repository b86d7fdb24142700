//! Configuration for smrkv
//!
//! Centralized engine options with sensible defaults.

use std::path::PathBuf;

/// Engine-wide options
#[derive(Debug, Clone)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for table and log files
    /// Internal structure:
    ///   {db_path}/
    ///     ├── 000001.log       (durability log)
    ///     ├── L0/000002.ldb    (tables, one directory per level)
    ///     └── 000003.sst       (legacy flat-layout tables)
    pub db_path: PathBuf,

    // -------------------------------------------------------------------------
    // Table Cache Configuration
    // -------------------------------------------------------------------------
    /// Budget for open tables, in bytes of parsed index + filter metadata
    pub table_cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Table Format Configuration
    // -------------------------------------------------------------------------
    /// Approximate uncompressed size of a data block
    pub block_size: usize,

    /// Bloom filter bits per key; `None` builds tables without filters
    pub filter_bits_per_key: Option<usize>,

    /// log2 of the data range covered by one filter bucket (11 => 2 KiB)
    pub filter_base_lg: u8,

    // -------------------------------------------------------------------------
    // Write Path Configuration
    // -------------------------------------------------------------------------
    /// Values above this size are staged in pooled buffers
    pub inline_value_threshold: usize,

    // -------------------------------------------------------------------------
    // Read Path Configuration
    // -------------------------------------------------------------------------
    /// Consult filter blocks before seeking into data blocks
    pub use_bloom_filter: bool,

    /// Verify block checksums on every read
    pub verify_checksums: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./smrkv_data"),
            table_cache_capacity: 8 * 1024 * 1024, // 8 MB of metadata
            block_size: 4096,
            filter_bits_per_key: Some(10),
            filter_base_lg: 11,
            inline_value_threshold: 8192,
            use_bloom_filter: true,
            verify_checksums: true,
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Read options derived from these engine options
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            verify_checksums: self.verify_checksums,
            use_bloom_filter: self.use_bloom_filter,
        }
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the database directory
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.db_path = path.into();
        self
    }

    /// Set the table cache budget (bytes of table metadata)
    pub fn table_cache_capacity(mut self, bytes: usize) -> Self {
        self.options.table_cache_capacity = bytes;
        self
    }

    /// Set the target data block size
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.options.block_size = bytes;
        self
    }

    /// Set bloom filter bits per key (`None` disables filters)
    pub fn filter_bits_per_key(mut self, bits: Option<usize>) -> Self {
        self.options.filter_bits_per_key = bits;
        self
    }

    /// Set log2 of the filter bucket size
    pub fn filter_base_lg(mut self, base_lg: u8) -> Self {
        self.options.filter_base_lg = base_lg;
        self
    }

    /// Set the inline value threshold
    pub fn inline_value_threshold(mut self, bytes: usize) -> Self {
        self.options.inline_value_threshold = bytes;
        self
    }

    /// Enable or disable filter checks on reads
    pub fn use_bloom_filter(mut self, enabled: bool) -> Self {
        self.options.use_bloom_filter = enabled;
        self
    }

    /// Enable or disable checksum verification on reads
    pub fn verify_checksums(mut self, enabled: bool) -> Self {
        self.options.verify_checksums = enabled;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}

/// Per-read options
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub verify_checksums: bool,
    pub use_bloom_filter: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Options::default().read_options()
    }
}
