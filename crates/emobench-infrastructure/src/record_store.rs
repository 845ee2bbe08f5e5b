//! Append-only session record storage with atomic writes.
//!
//! One JSON document per seed-topic conversation, under
//! `{root}/{tested_style}/{disorder}/{character}/patient{id}/`. Records
//! are written via temp file + fsync + rename so a crash mid-write never
//! leaves a partial record observable, and an advisory lock brackets id
//! allocation and write.

use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use tracing::debug;

use emobench_core::{Disorder, EmobenchError, Result, SessionRecord};

/// Store for the session records of one (tested_style, disorder,
/// character, patient) combination.
pub struct SessionRecordStore {
    dir: PathBuf,
}

impl SessionRecordStore {
    pub fn new(
        root: impl AsRef<Path>,
        tested_style: &str,
        disorder: Disorder,
        character: &str,
        patient_id: u32,
    ) -> Self {
        let dir = root
            .as_ref()
            .join(tested_style)
            .join(disorder.key())
            .join(character)
            .join(format!("patient{patient_id}"));
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists a record under the next sequential id and returns the id
    /// and the written path.
    pub fn append(&self, record: &SessionRecord) -> Result<(u64, PathBuf)> {
        fs::create_dir_all(&self.dir)?;
        let _lock = DirLock::acquire(&self.dir)?;

        let id = self.next_id()?;
        let mut record = record.clone();
        record.id = id;

        let path = self.dir.join(format!("{id}.json"));
        let json = serde_json::to_string_pretty(&record)
            .map_err(EmobenchError::from)?;

        let tmp_path = self.dir.join(format!(".{id}.json.tmp"));
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);
        fs::rename(&tmp_path, &path)?;
        debug!(id, path = %path.display(), "session record persisted");

        Ok((id, path))
    }

    /// Next sequential id: one past the highest numeric file stem present.
    fn next_id(&self) -> Result<u64> {
        let mut next = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = Path::new(&name)
                .file_stem()
                .and_then(|s| s.to_str())
            else {
                continue;
            };
            if let Ok(existing) = stem.parse::<u64>() {
                next = next.max(existing + 1);
            }
        }
        Ok(next)
    }
}

/// Advisory lock on a store directory, released when the handle drops.
///
/// The `.lock` file itself is never deleted: removing it would let a
/// waiter blocked on the old inode and a newcomer locking a fresh file
/// both hold "exclusive" locks at once.
struct DirLock {
    _file: File,
}

impl DirLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let lock_path = dir.join(".lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive().map_err(|e| {
                EmobenchError::io(format!("failed to lock {}: {e}", lock_path.display()))
            })?;
        }

        Ok(DirLock { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emobench_core::TestResult;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_record() -> SessionRecord {
        let flat = |v: i64| {
            TestResult::Flat(BTreeMap::from([("1".to_string(), v)]))
        };
        SessionRecord::new(0, "seed topic", flat(1), flat(2), vec![])
    }

    #[test]
    fn appends_with_sequential_ids() {
        let root = TempDir::new().unwrap();
        let store =
            SessionRecordStore::new(root.path(), "Roar", Disorder::Depression, "Mentor", 1);

        let (first, _) = store.append(&sample_record()).unwrap();
        let (second, path) = store.append(&sample_record()).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert!(path.ends_with("Roar/depression/Mentor/patient1/1.json"));

        let reread: SessionRecord =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(reread.id, 1);
        assert!(reread.deepened);
    }

    #[test]
    fn resumes_after_existing_records() {
        let root = TempDir::new().unwrap();
        let store =
            SessionRecordStore::new(root.path(), "Roar", Disorder::Depression, "Mentor", 1);
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join("7.json"), "{}").unwrap();

        let (id, _) = store.append(&sample_record()).unwrap();
        assert_eq!(id, 8);
    }

    #[test]
    fn lock_file_survives_appends_and_never_becomes_a_record() {
        let root = TempDir::new().unwrap();
        let store =
            SessionRecordStore::new(root.path(), "Roar", Disorder::Delusion, "Mentor", 3);

        let (first, _) = store.append(&sample_record()).unwrap();
        assert!(store.dir().join(".lock").exists());

        // The persistent lock file must not disturb id allocation.
        let (second, _) = store.append(&sample_record()).unwrap();
        assert_eq!((first, second), (0, 1));
        assert!(store.dir().join(".lock").exists());
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let root = TempDir::new().unwrap();
        let store =
            SessionRecordStore::new(root.path(), "Roar", Disorder::Psychosis, "Villain", 2);
        store.append(&sample_record()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
    }
}
