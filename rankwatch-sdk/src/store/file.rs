//! Directory-backed store for participants running as separate processes.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/data/<key>              one file per key
//! <root>/barriers/<group>/<n>    one empty file per barrier ticket
//! ```
//!
//! Writes go to a temporary file that is renamed into place, so readers never
//! observe a partial blob. Tickets are claimed with `create_new`, which the
//! filesystem guarantees to succeed for exactly one claimant.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use super::{release_target, BarrierOutcome, BarrierWait, CoordinationStore};
use crate::error::StoreError;

/// A store rooted in a directory on a filesystem every participant can see.
///
/// Use a fresh root per run: barrier tickets left behind by an aborted run
/// would shift the next run's generations.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    group_size: usize,
    poll_interval: Duration,
    description: String,
}

impl FileStore {
    /// Create a store rooted at `root` for a group of `group_size` participants.
    ///
    /// A size of zero is treated as one.
    pub fn new<P: AsRef<Path>>(root: P, group_size: usize) -> Self {
        let root = root.as_ref().to_path_buf();
        let description = format!("file: {}", root.display());
        Self {
            root,
            group_size: group_size.max(1),
            poll_interval: Duration::from_millis(10),
            description,
        }
    }

    /// How often a waiting participant re-checks the barrier.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn data_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_component(key)?;
        Ok(self.root.join("data").join(key))
    }

    fn barrier_dir(&self, group: &str) -> Result<PathBuf, StoreError> {
        validate_component(group)?;
        Ok(self.root.join("barriers").join(group))
    }

    /// Claim the lowest free ticket at or above the current count.
    ///
    /// Tickets are only ever created in ascending order, so the existing
    /// tickets always form a contiguous prefix `0..count`.
    fn claim_ticket(dir: &Path) -> Result<u64, StoreError> {
        let mut ticket = fs::read_dir(dir)?.count() as u64;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(ticket.to_string()))
            {
                Ok(_) => return Ok(ticket),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => ticket += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl CoordinationStore for FileStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.data_path(key)?;
        let dir = self.root.join("data");
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".{}.tmp-{}", key, std::process::id()));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.data_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn barrier(&self, group: &str, wait: BarrierWait) -> Result<BarrierOutcome, StoreError> {
        let dir = self.barrier_dir(group)?;
        fs::create_dir_all(&dir)?;

        let deadline = match wait {
            BarrierWait::Indefinite => None,
            BarrierWait::Timeout(d) => Some(Instant::now() + d),
        };

        let ticket = Self::claim_ticket(&dir)?;
        let target = release_target(ticket, self.group_size);
        // Tickets form a prefix, so the last ticket of the generation
        // existing means every earlier one does too.
        let last = dir.join((target - 1).to_string());
        tracing::debug!(group, ticket, target, store = %self.description, "arrived at barrier");

        loop {
            if last.exists() {
                return Ok(BarrierOutcome::Arrived);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(BarrierOutcome::TimedOut);
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn group_size(&self) -> usize {
        self.group_size
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Keys and group ids become file names, so they must be a single path
/// component.
fn validate_component(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(&['/', '\\', '\0'][..]);
    if invalid {
        Err(StoreError::InvalidKey(name.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_new() {
        let store = FileStore::new("/tmp/rankwatch", 0);
        assert_eq!(store.root(), Path::new("/tmp/rankwatch"));
        assert_eq!(store.description(), "file: /tmp/rankwatch");
        assert_eq!(store.group_size(), 1);
    }

    #[test]
    fn put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), 1);

        store.put("duration_dict_0", b"payload").unwrap();
        assert_eq!(store.get("duration_dict_0").unwrap(), b"payload");

        store.put("duration_dict_0", b"newer").unwrap();
        assert_eq!(store.get("duration_dict_0").unwrap(), b"newer");
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), 1);
        assert!(matches!(store.get("gpu_memory_3"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn path_like_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), 1);
        for key in ["", ".", "..", "../escape", "a/b", ".hidden"] {
            assert!(
                matches!(store.put(key, b"x"), Err(StoreError::InvalidKey(_))),
                "{:?}",
                key
            );
        }
    }

    #[test]
    fn no_temporary_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), 1);
        store.put("k", b"v").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path().join("data"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("k")]);
    }

    #[test]
    fn stores_sharing_a_root_see_each_other() {
        let dir = TempDir::new().unwrap();
        let a = FileStore::new(dir.path(), 2);
        let b = FileStore::new(dir.path(), 2);

        a.put("duration_dict_0", b"a").unwrap();
        assert_eq!(b.get("duration_dict_0").unwrap(), b"a");
    }

    #[test]
    fn barrier_releases_all_together() {
        let dir = TempDir::new().unwrap();
        let passed = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..2 {
            let store = FileStore::new(dir.path(), 3).with_poll_interval(Duration::from_millis(1));
            let p = passed.clone();
            handles.push(thread::spawn(move || {
                store.barrier("ckpt", BarrierWait::Indefinite).unwrap();
                p.fetch_add(1, Ordering::SeqCst);
            }));
        }

        thread::sleep(Duration::from_millis(50));
        assert_eq!(passed.load(Ordering::SeqCst), 0);

        let last = FileStore::new(dir.path(), 3);
        assert_eq!(
            last.barrier("ckpt", BarrierWait::Indefinite).unwrap(),
            BarrierOutcome::Arrived
        );
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(passed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn barrier_times_out() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path(), 2);
        let outcome = store
            .barrier("ckpt", BarrierWait::Timeout(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(outcome, BarrierOutcome::TimedOut);
    }

    #[test]
    fn concurrent_claims_get_distinct_tickets() {
        let dir = TempDir::new().unwrap();
        let group = dir.path().join("g");
        fs::create_dir_all(&group).unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let g = group.clone();
            handles.push(thread::spawn(move || FileStore::claim_ticket(&g).unwrap()));
        }
        let mut tickets: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        tickets.sort_unstable();
        assert_eq!(tickets, (0..8).collect::<Vec<u64>>());
    }

    #[test]
    fn group_id_is_reusable_across_checkpoints() {
        let dir = TempDir::new().unwrap();
        let peer = FileStore::new(dir.path(), 2).with_poll_interval(Duration::from_millis(1));
        let store = FileStore::new(dir.path(), 2).with_poll_interval(Duration::from_millis(1));

        let handle = thread::spawn(move || {
            for _ in 0..3 {
                peer.barrier("ckpt", BarrierWait::Indefinite).unwrap();
            }
        });
        for _ in 0..3 {
            assert_eq!(
                store
                    .barrier("ckpt", BarrierWait::Timeout(Duration::from_secs(5)))
                    .unwrap(),
                BarrierOutcome::Arrived
            );
        }
        handle.join().unwrap();
    }
}
