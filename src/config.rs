//src/config.rs

use std::path::PathBuf;
use std::time::Duration;

/// What to do when a genus/species row would pick up an ancestor left over
/// from a previous branch of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleRankPolicy {
    /// Build the lineage from whatever the ladder holds.
    Ignore,
    /// Same as `Ignore`, but log each occurrence and count it.
    #[default]
    Warn,
    /// Abort the sample.
    Fail,
}

/// How a fragment directory is fingerprinted for the reference cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintMode {
    /// Name, byte size and whole-second modification time of each file.
    #[default]
    Metadata,
    /// Name and full contents of each file.
    Content,
}

/// Per-sample settings for the attrition table.
#[derive(Debug, Clone)]
pub struct AttritionConfig {
    /// Only index reads whose classification status is `C`.
    pub classified_only: bool,
    /// Lineages with fewer reads than this are left out of the table.
    pub min_reads: u64,
    pub stale_ranks: StaleRankPolicy,
}

impl Default for AttritionConfig {
    fn default() -> Self {
        Self {
            classified_only: false,
            min_reads: 5,
            stale_ranks: StaleRankPolicy::default(),
        }
    }
}

/// Settings for the concatenated reference cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub fingerprint: FingerprintMode,
    /// Give up waiting for another builder after this long.
    pub lock_timeout: Duration,
    pub lock_poll: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache_binned_refs"),
            fingerprint: FingerprintMode::default(),
            lock_timeout: Duration::from_secs(600),
            lock_poll: Duration::from_millis(200),
        }
    }
}

impl CacheConfig {
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }
}
