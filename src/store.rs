//! Persistence of enrolled embeddings.
//!
//! The matcher only needs two things from a store: a consistent snapshot of
//! every row, and an all-or-nothing append of one finalized enrollment.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::embedding::Embedding;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub label: String,
    pub embedding: Embedding,
}

impl EnrollmentRecord {
    pub fn new(label: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            label: label.into(),
            embedding,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: postcard::Error,
    },
    #[error("encoding face records")]
    Encode(#[source] postcard::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Shared, possibly concurrently written, collection of enrollment rows.
pub trait IdentityStore: Send + Sync {
    /// Every row as of this call.
    fn snapshot(&self) -> Result<Vec<EnrollmentRecord>>;

    /// Append all `records` or none of them.
    fn append(&self, records: &[EnrollmentRecord]) -> Result<()>;

    /// Remove every row for `label`, returning how many were removed.
    fn purge(&self, label: &str) -> Result<usize>;

    /// Labels with their sample counts, in first-enrolled order.
    fn labels(&self) -> Result<Vec<(String, usize)>> {
        let mut out: Vec<(String, usize)> = Vec::new();
        for record in self.snapshot()? {
            match out.iter_mut().find(|(l, _)| *l == record.label) {
                Some((_, n)) => *n += 1,
                None => out.push((record.label, 1)),
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<EnrollmentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryStore {
    fn snapshot(&self) -> Result<Vec<EnrollmentRecord>> {
        Ok(self.records.read().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn append(&self, records: &[EnrollmentRecord]) -> Result<()> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .extend_from_slice(records);
        Ok(())
    }

    fn purge(&self, label: &str) -> Result<usize> {
        let mut guard = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let before = guard.len();
        guard.retain(|r| r.label != label);
        Ok(before - guard.len())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FaceRecord {
    id: Uuid,
    label: String,
    embedding: Vec<f32>,
}

/// Postcard-encoded file of face records.
///
/// Writers take an exclusive lock on a sibling `.lock` file for the whole
/// load-modify-replace cycle, so appends from other handles or processes are
/// never lost. The new contents go to a fresh temporary file in the same
/// directory which is then renamed over the store, so readers never observe
/// a partially written enrollment.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn write_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }

    /// Exclusive writer lock, released when the returned file is dropped.
    fn lock(&self) -> Result<File> {
        std::fs::create_dir_all(self.dir()).map_err(|e| self.write_err(e))?;
        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| self.write_err(e))?;
        file.lock_exclusive().map_err(|e| self.write_err(e))?;
        Ok(file)
    }

    fn load(&self) -> Result<Vec<FaceRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let data = std::fs::read(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        postcard::from_bytes(&data).map_err(|source| StoreError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Caller must hold [`FileStore::lock`].
    fn save(&self, records: &[FaceRecord]) -> Result<()> {
        let data = postcard::to_allocvec(records).map_err(StoreError::Encode)?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(self.dir()).map_err(|e| self.write_err(e))?;
        tmp.write_all(&data).map_err(|e| self.write_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(e.error))?;
        Ok(())
    }
}

impl IdentityStore for FileStore {
    fn snapshot(&self) -> Result<Vec<EnrollmentRecord>> {
        Ok(self
            .load()?
            .into_iter()
            .map(|r| EnrollmentRecord::new(r.label, Embedding::new(r.embedding)))
            .collect())
    }

    fn append(&self, records: &[EnrollmentRecord]) -> Result<()> {
        let _lock = self.lock()?;
        let mut stored = self.load()?;
        stored.extend(records.iter().map(|r| FaceRecord {
            id: Uuid::new_v4(),
            label: r.label.clone(),
            embedding: r.embedding.as_slice().to_vec(),
        }));
        self.save(&stored)?;
        log::debug!(
            "appended {} record(s) to {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }

    fn purge(&self, label: &str) -> Result<usize> {
        let _lock = self.lock()?;
        let mut stored = self.load()?;
        let before = stored.len();
        stored.retain(|r| r.label != label);
        let removed = before - stored.len();
        if removed > 0 {
            self.save(&stored)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(label: &str, v: f32) -> EnrollmentRecord {
        EnrollmentRecord::new(label, Embedding::new(vec![v, 1.0 - v]))
    }

    #[test]
    fn test_memory_store_roundtrip() -> Result<()> {
        let store = MemoryStore::new();
        assert!(store.snapshot()?.is_empty());
        store.append(&[rec("alice", 0.1), rec("alice", 0.2)])?;
        store.append(&[rec("bob", 0.9)])?;
        assert_eq!(store.snapshot()?.len(), 3);
        assert_eq!(
            store.labels()?,
            vec![("alice".to_string(), 2), ("bob".to_string(), 1)]
        );
        assert_eq!(store.purge("alice")?, 2);
        assert_eq!(store.snapshot()?, vec![rec("bob", 0.9)]);
        Ok(())
    }

    #[test]
    fn test_file_store_missing_file_is_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path().join("faces.bin"));
        assert!(store.snapshot()?.is_empty());
        assert_eq!(store.purge("nobody")?, 0);
        assert!(!store.path().exists());
        Ok(())
    }

    #[test]
    fn test_file_store_persists_across_instances() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store").join("faces.bin");
        {
            let store = FileStore::open(&path);
            store.append(&[rec("alice", 0.1), rec("alice", 0.2)])?;
            store.append(&[rec("bob", 0.7)])?;
        }
        let store = FileStore::open(&path);
        let rows = store.snapshot()?;
        assert_eq!(rows, vec![rec("alice", 0.1), rec("alice", 0.2), rec("bob", 0.7)]);

        assert_eq!(store.purge("alice")?, 2);
        assert_eq!(FileStore::open(&path).snapshot()?, vec![rec("bob", 0.7)]);
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .filter(|n| n != "faces.bin" && n != "faces.lock")
            .collect();
        assert!(leftovers.is_empty(), "stray files: {:?}", leftovers);
        Ok(())
    }

    #[test]
    fn test_file_store_concurrent_handles_keep_every_append() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faces.bin");

        let writers: Vec<_> = ["alice", "bob"]
            .into_iter()
            .map(|label| {
                let path = path.clone();
                std::thread::spawn(move || -> Result<()> {
                    let store = FileStore::open(&path);
                    for i in 0..50 {
                        let batch: Vec<_> =
                            (0..10).map(|j| rec(label, (i * 10 + j) as f32)).collect();
                        store.append(&batch)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for w in writers {
            w.join().expect("writer thread panicked")?;
        }

        let store = FileStore::open(&path);
        assert_eq!(store.snapshot()?.len(), 1000);
        assert_eq!(
            store.labels()?.into_iter().map(|(_, n)| n).collect::<Vec<_>>(),
            vec![500, 500]
        );
        Ok(())
    }

    #[test]
    fn test_file_store_rejects_garbage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("faces.bin");
        std::fs::write(&path, [0xff, 0xff, 0xff, 0xff, 0xff, 0xff])?;
        let err = FileStore::open(&path).snapshot().unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
        Ok(())
    }
}
