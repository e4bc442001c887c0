//! Pool Store: one directory holding one physical file per fetched item.
//!
//! ```text
//! <sync_root>/pool/
//! ├── Some Title.mp4
//! └── Another Title.mp4
//! ```
//!
//! Entry names come from the fetch result, not from the content identifier.

use std::ffi::{OsStr, OsString};
use std::fs::{self, Metadata};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::Result;

/// Stable identity of a storage object (device + inode).
///
/// Two paths with the same identity are hard links to the same content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    pub fn of(meta: &Metadata) -> Self {
        Self {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }

    /// Identity of the object at `path`, without following a final symlink.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        fs::symlink_metadata(path).map(|m| Self::of(&m))
    }
}

/// A physical file in the pool
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub name: OsString,
    pub path: PathBuf,
    pub size: u64,
    /// Sole signal of age and recency used by retention
    pub modified: SystemTime,
    pub identity: FileIdentity,
}

impl PoolEntry {
    fn from_metadata(path: PathBuf, meta: &Metadata) -> io::Result<Self> {
        let name = path
            .file_name()
            .map(OsStr::to_os_string)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "pool entry without file name"))?;
        Ok(Self {
            name,
            size: meta.len(),
            modified: meta.modified()?,
            identity: FileIdentity::of(meta),
            path,
        })
    }

    pub fn display_name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub entry_count: u64,
    pub total_bytes: u64,
}

/// Directory of shared pool files
#[derive(Debug, Clone)]
pub struct PoolStore {
    root: PathBuf,
}

impl PoolStore {
    /// Open the pool at `root`, creating the directory if it doesn't exist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &OsStr) -> PathBuf {
        self.root.join(name)
    }

    pub fn contains(&self, name: &OsStr) -> bool {
        self.path_of(name).is_file()
    }

    /// Regular files directly inside the pool, sorted by name.
    pub fn entries(&self) -> Result<Vec<PoolEntry>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            let meta = match dirent.metadata() {
                Ok(meta) => meta,
                // Vanished between readdir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }
            entries.push(PoolEntry::from_metadata(dirent.path(), &meta)?);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn entry(&self, name: &OsStr) -> Result<Option<PoolEntry>> {
        let path = self.path_of(name);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(PoolEntry::from_metadata(path, &meta)?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Bytes of every file below the pool root, nested directories included.
    pub fn total_bytes(&self) -> Result<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                total += entry.metadata().map_err(io::Error::from)?.len();
            }
        }
        Ok(total)
    }

    pub fn stats(&self) -> Result<PoolStats> {
        Ok(PoolStats {
            entry_count: self.entries()?.len() as u64,
            total_bytes: self.total_bytes()?,
        })
    }

    pub fn remove(&self, name: &OsStr) -> io::Result<()> {
        fs::remove_file(self.path_of(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entries_are_files_sorted_by_name() {
        let temp = TempDir::new().unwrap();
        let store = PoolStore::new(temp.path().join("pool")).unwrap();

        fs::write(store.root().join("b.mp4"), b"bb").unwrap();
        fs::write(store.root().join("a.mp4"), b"a").unwrap();
        fs::create_dir(store.root().join("nested")).unwrap();

        let entries = store.entries().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.display_name()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4"]);
        assert_eq!(entries[1].size, 2);
    }

    #[test]
    fn test_total_bytes_is_recursive() {
        let temp = TempDir::new().unwrap();
        let store = PoolStore::new(temp.path()).unwrap();

        fs::write(store.root().join("a.mp4"), vec![0u8; 100]).unwrap();
        fs::create_dir(store.root().join("nested")).unwrap();
        fs::write(store.root().join("nested/leftover.part"), vec![0u8; 50]).unwrap();

        assert_eq!(store.total_bytes().unwrap(), 150);
        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.total_bytes, 150);
    }

    #[test]
    fn test_identity_follows_hard_links() {
        let temp = TempDir::new().unwrap();
        let store = PoolStore::new(temp.path().join("pool")).unwrap();
        let original = store.root().join("x.mp4");
        fs::write(&original, b"x").unwrap();

        let renamed_link = temp.path().join("renamed by subscriber.mp4");
        fs::hard_link(&original, &renamed_link).unwrap();
        let copy = temp.path().join("copy.mp4");
        fs::copy(&original, &copy).unwrap();

        let entry = store.entry(OsStr::new("x.mp4")).unwrap().unwrap();
        assert_eq!(entry.identity, FileIdentity::from_path(&renamed_link).unwrap());
        assert_ne!(entry.identity, FileIdentity::from_path(&copy).unwrap());
    }

    #[test]
    fn test_entry_missing_and_remove() {
        let temp = TempDir::new().unwrap();
        let store = PoolStore::new(temp.path()).unwrap();
        assert!(store.entry(OsStr::new("nope")).unwrap().is_none());

        fs::write(store.root().join("gone.mp4"), b"1").unwrap();
        assert!(store.contains(OsStr::new("gone.mp4")));
        store.remove(OsStr::new("gone.mp4")).unwrap();
        assert!(!store.contains(OsStr::new("gone.mp4")));
        assert_eq!(
            store.remove(OsStr::new("gone.mp4")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
