//src/refcache.rs

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::config::{CacheConfig, FingerprintMode};
use crate::error::{AttritionError, IoContext, Result};

/// Hex characters of the digest kept as the cache key.
pub const FINGERPRINT_LEN: usize = 16;

/// A regular file directly inside the fragment directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Modification time truncated to whole seconds.
    pub mtime: i64,
}

impl Fragment {
    /// Fragments that go into the concatenated reference: `*.fa*`.
    pub fn is_sequence(&self) -> bool {
        self.name.contains(".fa")
    }
}

fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Regular files of `dir`, dotfiles included (not recursive), sorted by name.
pub fn list_fragments<P: AsRef<Path>>(dir: P) -> Result<Vec<Fragment>> {
    let dir = dir.as_ref();
    let mut fragments = Vec::new();

    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        // Follows symlinks, so a link to a regular file counts as one.
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(AttritionError::io(&path, e)),
        };
        if !meta.is_file() {
            continue;
        }
        let mtime = meta.modified().with_path(&path)?;
        fragments.push(Fragment {
            name,
            path,
            size: meta.len(),
            mtime: unix_seconds(mtime),
        });
    }

    fragments.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(fragments)
}

fn hex_prefix(digest: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(len);
    out
}

fn hash_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).with_path(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).with_path(path)?;
    Ok(hasher.finalize().to_vec())
}

/// Cache key for a set of fragments.
///
/// `Metadata` digests (name, size, mtime seconds) per file with SHA-256 and
/// never opens the files, so keys match caches written by the Python
/// pipeline; two different fragment sets sharing all three are
/// indistinguishable. `Content` digests each file's bytes (in parallel) and
/// ignores timestamps.
pub fn fingerprint(fragments: &[Fragment], mode: FingerprintMode) -> Result<String> {
    let mut hasher = Sha256::new();

    match mode {
        FingerprintMode::Metadata => {
            for f in fragments {
                hasher.update(f.name.as_bytes());
                hasher.update(f.size.to_string().as_bytes());
                hasher.update(f.mtime.to_string().as_bytes());
            }
        }
        FingerprintMode::Content => {
            let digests: Vec<Vec<u8>> = fragments
                .par_iter()
                .map(|f| hash_file(&f.path))
                .collect::<Result<_>>()?;
            for (f, digest) in fragments.iter().zip(digests) {
                hasher.update(f.name.as_bytes());
                hasher.update(&digest);
            }
        }
    }

    Ok(hex_prefix(&hasher.finalize(), FINGERPRINT_LEN))
}

/// Exclusive lock file, removed when dropped.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    /// Create `path` exclusively, polling until it can be created or
    /// `config.lock_timeout` has passed.
    pub fn acquire(path: PathBuf, config: &CacheConfig) -> Result<Self> {
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Holder pid is informational only.
                    if let Err(e) = writeln!(file, "{}", std::process::id()) {
                        log::debug!("could not record pid in {}: {e}", path.display());
                    }
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let waited = started.elapsed();
                    if waited >= config.lock_timeout {
                        return Err(AttritionError::LockTimeout { path, waited });
                    }
                    log::debug!("waiting for {}", path.display());
                    thread::sleep(config.lock_poll);
                }
                Err(e) => return Err(AttritionError::io(&path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("could not remove cache lock {}: {e}", self.path.display());
        }
    }
}

/// Concatenated references keyed by the fingerprint of their fragment directory.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    config: CacheConfig,
}

impl ReferenceCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn artifact_path(&self, key: &str) -> PathBuf {
        self.config.cache_dir.join(format!("binned_{key}.fasta"))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.config.cache_dir.join(format!("binned_{key}.lock"))
    }

    /// Where the reference for `fragments_dir` lives (or would live).
    pub fn reference_path<P: AsRef<Path>>(&self, fragments_dir: P) -> Result<PathBuf> {
        let fragments = list_fragments(fragments_dir)?;
        let key = fingerprint(&fragments, self.config.fingerprint)?;
        Ok(self.artifact_path(&key))
    }

    /// Return the cached reference for `fragments_dir`, building it first if
    /// no artifact exists for the current fingerprint. An existing artifact
    /// is reused as is.
    pub fn build_or_get<P: AsRef<Path>>(&self, fragments_dir: P) -> Result<PathBuf> {
        let fragments_dir = fragments_dir.as_ref();
        let cache_dir = &self.config.cache_dir;
        fs::create_dir_all(cache_dir).with_path(cache_dir)?;

        let fragments = list_fragments(fragments_dir)?;
        let key = fingerprint(&fragments, self.config.fingerprint)?;
        let artifact = self.artifact_path(&key);

        if artifact.is_file() {
            log::info!("reusing cached reference {}", artifact.display());
            return Ok(artifact);
        }

        let _lock = CacheLock::acquire(self.lock_path(&key), &self.config)?;
        // Another process may have published while we waited.
        if artifact.is_file() {
            log::info!("reusing cached reference {}", artifact.display());
            return Ok(artifact);
        }

        let sequences: Vec<&Fragment> = fragments.iter().filter(|f| f.is_sequence()).collect();
        log::info!(
            "building reference {} from {} fragment(s) in {}",
            artifact.display(),
            sequences.len(),
            fragments_dir.display()
        );
        concatenate(&sequences, cache_dir, &artifact)?;
        Ok(artifact)
    }
}

/// Write `fragments` back to back into a temp file beside `dest`, then
/// rename it into place.
fn concatenate(fragments: &[&Fragment], tmp_dir: &Path, dest: &Path) -> Result<()> {
    let tmp = NamedTempFile::new_in(tmp_dir).with_path(tmp_dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file());
        for fragment in fragments {
            let mut input = File::open(&fragment.path).with_path(&fragment.path)?;
            io::copy(&mut input, &mut out).with_path(&fragment.path)?;
        }
        out.flush().with_path(tmp.path())?;
    }
    tmp.as_file().sync_all().with_path(tmp.path())?;
    tmp.persist(dest).map_err(|e| AttritionError::io(dest, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).unwrap();
        p
    }

    fn fragment_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bin.2.fa", ">c2\nGGCC\n");
        write(dir.path(), "bin.1.fasta", ">c1\nACGT\n");
        write(dir.path(), "checkm.txt", "not a sequence\n");
        write(dir.path(), ".hidden.fa", ">h\nNNNN\n");
        fs::create_dir(dir.path().join("sub.fa")).unwrap();
        dir
    }

    fn cache_in(dir: &Path) -> ReferenceCache {
        ReferenceCache::new(CacheConfig {
            lock_timeout: Duration::from_millis(300),
            lock_poll: Duration::from_millis(20),
            ..CacheConfig::new(dir.join("cache"))
        })
    }

    #[test]
    fn lists_regular_files_including_dotfiles_in_name_order() {
        let dir = fragment_dir();
        let names: Vec<String> = list_fragments(dir.path()).unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, [".hidden.fa", "bin.1.fasta", "bin.2.fa", "checkm.txt"]);
    }

    fn fixed(name: &str, size: u64, mtime: i64) -> Fragment {
        Fragment {
            name: name.to_string(),
            path: PathBuf::from(name),
            size,
            mtime,
        }
    }

    #[test]
    fn metadata_key_matches_sha256_of_name_size_mtime() {
        let fragments = [fixed("bin.1.fa", 10, 1_700_000_000), fixed("bin.2.fa", 2048, 1_700_000_123)];
        assert_eq!(fingerprint(&fragments, FingerprintMode::Metadata).unwrap(), "5d6a2037d0df6062");
        assert_eq!(fingerprint(&[], FingerprintMode::Metadata).unwrap(), "e3b0c44298fc1c14");
    }

    fn leftovers(cache: &ReferenceCache) -> Vec<String> {
        fs::read_dir(&cache.config().cache_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".lock") || n.starts_with(".tmp"))
            .collect()
    }

    const CONCATENATED: &str = ">h\nNNNN\n>c1\nACGT\n>c2\nGGCC\n";

    #[test]
    fn builds_concatenation_once_and_reuses_it() {
        let frags = fragment_dir();
        let scratch = tempfile::tempdir().unwrap();
        let cache = cache_in(scratch.path());

        let first = cache.build_or_get(frags.path()).unwrap();
        assert_eq!(fs::read_to_string(&first).unwrap(), CONCATENATED);
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("binned_") && name.ends_with(".fasta"));
        assert_eq!(name.len(), "binned_".len() + FINGERPRINT_LEN + ".fasta".len());
        let built_at = fs::metadata(&first).unwrap().modified().unwrap();

        let second = cache.build_or_get(frags.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::metadata(&second).unwrap().modified().unwrap(), built_at);
        assert!(leftovers(&cache).is_empty());
        assert_eq!(cache.reference_path(frags.path()).unwrap(), first);
    }

    #[test]
    fn touching_a_fragment_changes_the_key() {
        let frags = fragment_dir();
        let scratch = tempfile::tempdir().unwrap();
        let cache = cache_in(scratch.path());
        let before = cache.build_or_get(frags.path()).unwrap();

        let f = File::options().write(true).open(frags.path().join("checkm.txt")).unwrap();
        f.set_modified(SystemTime::now() + Duration::from_secs(3600)).unwrap();

        let after = cache.build_or_get(frags.path()).unwrap();
        assert_ne!(before, after);
        assert!(before.exists() && after.exists());
    }

    #[test]
    fn touching_a_dotfile_fragment_changes_the_key() {
        let frags = fragment_dir();
        let scratch = tempfile::tempdir().unwrap();
        let cache = cache_in(scratch.path());
        let before = cache.build_or_get(frags.path()).unwrap();

        let f = File::options().write(true).open(frags.path().join(".hidden.fa")).unwrap();
        f.set_modified(SystemTime::now() + Duration::from_secs(3600)).unwrap();

        let after = cache.build_or_get(frags.path()).unwrap();
        assert_ne!(before, after);
        assert_eq!(fs::read_to_string(&after).unwrap(), CONCATENATED);
    }

    #[test]
    fn concurrent_builders_share_one_complete_artifact() {
        let frags = fragment_dir();
        let scratch = tempfile::tempdir().unwrap();
        let cache = ReferenceCache::new(CacheConfig {
            lock_timeout: Duration::from_secs(30),
            lock_poll: Duration::from_millis(5),
            ..CacheConfig::new(scratch.path().join("cache"))
        });

        let (a, b) = std::thread::scope(|s| {
            let first = s.spawn(|| cache.build_or_get(frags.path()));
            let second = s.spawn(|| cache.build_or_get(frags.path()));
            (first.join().unwrap().unwrap(), second.join().unwrap().unwrap())
        });

        assert_eq!(a, b);
        assert_eq!(fs::read_to_string(&a).unwrap(), CONCATENATED);
        assert!(leftovers(&cache).is_empty());
    }

    #[test]
    fn waiting_builder_reuses_artifact_published_under_the_lock() {
        let frags = fragment_dir();
        let scratch = tempfile::tempdir().unwrap();
        let cache = ReferenceCache::new(CacheConfig {
            lock_timeout: Duration::from_secs(30),
            lock_poll: Duration::from_millis(10),
            ..CacheConfig::new(scratch.path().join("cache"))
        });
        fs::create_dir_all(&cache.config().cache_dir).unwrap();

        let artifact = cache.reference_path(frags.path()).unwrap();
        let key = fingerprint(&list_fragments(frags.path()).unwrap(), FingerprintMode::Metadata).unwrap();
        let held = CacheLock::acquire(cache.lock_path(&key), cache.config()).unwrap();

        let got = std::thread::scope(|s| {
            let waiter = s.spawn(|| cache.build_or_get(frags.path()));
            // Let the waiter pass its first existence check and block on the lock.
            std::thread::sleep(Duration::from_millis(200));
            fs::write(&artifact, "published elsewhere\n").unwrap();
            drop(held);
            waiter.join().unwrap().unwrap()
        });

        assert_eq!(got, artifact);
        assert_eq!(fs::read_to_string(&artifact).unwrap(), "published elsewhere\n");
        assert!(leftovers(&cache).is_empty());
    }

    #[test]
    fn content_mode_ignores_timestamps() {
        let frags = fragment_dir();
        let before = fingerprint(&list_fragments(frags.path()).unwrap(), FingerprintMode::Content).unwrap();

        let f = File::options().write(true).open(frags.path().join("bin.2.fa")).unwrap();
        f.set_modified(SystemTime::now() + Duration::from_secs(3600)).unwrap();
        let after = fingerprint(&list_fragments(frags.path()).unwrap(), FingerprintMode::Content).unwrap();
        assert_eq!(before, after);

        write(frags.path(), "bin.2.fa", ">c2\nGGCA\n");
        let edited = fingerprint(&list_fragments(frags.path()).unwrap(), FingerprintMode::Content).unwrap();
        assert_ne!(before, edited);
        assert_eq!(edited.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn empty_directory_builds_empty_reference() {
        let frags = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let path = cache_in(scratch.path()).build_or_get(frags.path()).unwrap();
        assert_eq!(fs::metadata(path).unwrap().len(), 0);
    }

    #[test]
    fn held_lock_times_out() {
        let scratch = tempfile::tempdir().unwrap();
        let cache = cache_in(scratch.path());
        fs::create_dir_all(&cache.config().cache_dir).unwrap();

        let held = CacheLock::acquire(cache.lock_path("k"), cache.config()).unwrap();
        let err = CacheLock::acquire(cache.lock_path("k"), cache.config()).unwrap_err();
        assert!(matches!(err, AttritionError::LockTimeout { .. }));
        let lock_file = held.path().to_path_buf();
        drop(held);
        assert!(!lock_file.exists());
    }

    #[test]
    fn missing_fragment_directory_is_fatal() {
        let scratch = tempfile::tempdir().unwrap();
        let missing = scratch.path().join("no_bins");
        let err = cache_in(scratch.path()).build_or_get(&missing).unwrap_err();
        assert!(err.to_string().contains("no_bins"));
    }
}
