//! Subscriber namespaces: per-subscriber directories of links into the pool.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::link_strategy::{LinkOutcome, LinkStrategy};
use crate::store::{FileIdentity, PoolEntry};

#[derive(Debug, Clone)]
pub struct Namespace {
    subscriber: String,
    dir: PathBuf,
}

impl Namespace {
    pub fn new(subscriber: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            subscriber: subscriber.into(),
            dir: dir.into(),
        }
    }

    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &OsStr) -> PathBuf {
        self.dir.join(name)
    }

    /// True if any directory entry with this name exists, dangling or not.
    pub fn contains(&self, name: &OsStr) -> bool {
        fs::symlink_metadata(self.path_of(name)).is_ok()
    }

    /// Names of the regular files in the namespace.
    ///
    /// A namespace directory the subscriber removed reads as empty.
    pub fn entries(&self) -> io::Result<Vec<OsString>> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for dirent in read {
            let dirent = dirent?;
            if dirent.file_type()?.is_file() {
                names.push(dirent.file_name());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Storage identities of every file the subscriber still holds.
    pub fn identities(&self) -> io::Result<HashSet<FileIdentity>> {
        let mut ids = HashSet::new();
        for name in self.entries()? {
            match FileIdentity::from_path(&self.path_of(&name)) {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(ids)
    }

    /// Materialize `entry` under its pool name unless that name is taken.
    pub fn link(&self, entry: &PoolEntry, strategy: &dyn LinkStrategy) -> io::Result<LinkOutcome> {
        let target = self.path_of(&entry.name);
        if self.contains(&entry.name) {
            return Ok(LinkOutcome::AlreadyPresent);
        }
        strategy.link_file(&entry.path, &target)
    }

    /// Remove the entry called `name`. Returns false when it was not there.
    pub fn remove(&self, name: &OsStr) -> io::Result<bool> {
        match fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
