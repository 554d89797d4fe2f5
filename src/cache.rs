//! The page-cache collaborator interfaces.
//!
//! The core (directory, bucket store, split buffer, operation engine) is
//! written against the [`PageCache`] trait only — it never assumes a
//! particular backing store, the same separation of policy from page-byte
//! storage an LRU cache draws between its eviction policy and its backing
//! map; here the trait boundary is drawn a level higher, since this
//! crate owns both sides.
//!
//! [`FilePageCache`] is the production implementation: one file per
//! bucket file level, grown with `allocate`, read/written directly at a
//! page's byte offset, with advisory whole-file locking via
//! [`fs2::FileExt`] standing in for the per-page lock discipline a
//! sharded implementation would use. [`MemPageCache`] is a minimal
//! in-process reference implementation, used in tests and for a purely
//! in-memory index.

use std::{
    collections::HashMap,
    fs,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use fs2::FileExt;

use crate::{err_at, error::Result};

/// Backing store for fixed-size bucket pages, addressed by `(file_level,
/// page_index)`. Implementations own durability; the core only ever
/// reads and writes whole pages of `page_size` bytes.
pub trait PageCache: Send + Sync {
    /// Number of pages currently allocated at `level`.
    fn filled_up_to(&self, level: u8) -> Result<u64>;

    /// Grow `level`'s file by one page, zero-filled, returning its index.
    fn allocate(&self, level: u8) -> Result<u64>;

    /// Read a page's raw bytes.
    fn load(&self, level: u8, page_index: u64) -> Result<Vec<u8>>;

    /// Overwrite a page's raw bytes in place.
    fn store(&self, level: u8, page_index: u64, data: &[u8]) -> Result<()>;

    /// Drop a level's file entirely (all its pages are tombstoned and
    /// abandoned — used only when an index is destroyed, not part of the
    /// split/merge path).
    fn truncate(&self, level: u8) -> Result<()>;

    /// Flush any buffered writes for `level` to durable storage.
    fn flush(&self, level: u8) -> Result<()>;
}

/// File-backed [`PageCache`]: one file per level named
/// `<name>.bucket.<level>`, holding a dense sequence of `page_size`-byte
/// pages.
pub struct FilePageCache {
    dir: PathBuf,
    name: String,
    page_size: usize,
    files: Mutex<HashMap<u8, fs::File>>,
}

impl FilePageCache {
    pub fn new(dir: &Path, name: &str, page_size: usize) -> FilePageCache {
        FilePageCache {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            page_size,
            files: Mutex::new(HashMap::new()),
        }
    }

    fn file_path(&self, level: u8) -> PathBuf {
        self.dir.join(format!("{}.bucket.{}", self.name, level))
    }

    fn with_file<T>(&self, level: u8, f: impl FnOnce(&mut fs::File) -> Result<T>) -> Result<T> {
        let mut files = self.files.lock().expect("page cache file table poisoned");
        if !files.contains_key(&level) {
            let path = self.file_path(level);
            let file = err_at!(
                Index,
                fs::OpenOptions::new().read(true).write(true).create(true).open(&path)
            )?;
            files.insert(level, file);
        }
        let file = files.get_mut(&level).expect("just inserted");
        err_at!(Index, file.lock_exclusive())?;
        let result = f(file);
        let _ = file.unlock();
        result
    }
}

impl PageCache for FilePageCache {
    fn filled_up_to(&self, level: u8) -> Result<u64> {
        self.with_file(level, |file| {
            let len = err_at!(Index, file.metadata())?.len();
            Ok(len / self.page_size as u64)
        })
    }

    fn allocate(&self, level: u8) -> Result<u64> {
        self.with_file(level, |file| {
            let len = err_at!(Index, file.metadata())?.len();
            let page_index = len / self.page_size as u64;
            err_at!(Index, file.set_len(len + self.page_size as u64))?;
            Ok(page_index)
        })
    }

    fn load(&self, level: u8, page_index: u64) -> Result<Vec<u8>> {
        self.with_file(level, |file| {
            let offset = page_index * self.page_size as u64;
            err_at!(Index, file.seek(SeekFrom::Start(offset)))?;
            let mut buf = vec![0u8; self.page_size];
            err_at!(Index, file.read_exact(&mut buf))?;
            Ok(buf)
        })
    }

    fn store(&self, level: u8, page_index: u64, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return err_at!(Fatal, msg: "page write of {} bytes, expected {}", data.len(), self.page_size);
        }
        self.with_file(level, |file| {
            let offset = page_index * self.page_size as u64;
            err_at!(Index, file.seek(SeekFrom::Start(offset)))?;
            err_at!(Index, file.write_all(data))?;
            Ok(())
        })
    }

    fn truncate(&self, level: u8) -> Result<()> {
        self.with_file(level, |file| {
            err_at!(Index, file.set_len(0))?;
            Ok(())
        })
    }

    fn flush(&self, level: u8) -> Result<()> {
        self.with_file(level, |file| {
            err_at!(Index, file.sync_data())?;
            Ok(())
        })
    }
}

/// Minimal in-process [`PageCache`] backed by plain `Vec<u8>` pages,
/// suitable for tests and for running the index without a filesystem.
#[derive(Default)]
pub struct MemPageCache {
    page_size: usize,
    levels: Mutex<HashMap<u8, Vec<Vec<u8>>>>,
}

impl MemPageCache {
    pub fn new(page_size: usize) -> MemPageCache {
        MemPageCache {
            page_size,
            levels: Mutex::new(HashMap::new()),
        }
    }
}

impl PageCache for MemPageCache {
    fn filled_up_to(&self, level: u8) -> Result<u64> {
        let levels = self.levels.lock().expect("mem page cache poisoned");
        Ok(levels.get(&level).map(|pages| pages.len() as u64).unwrap_or(0))
    }

    fn allocate(&self, level: u8) -> Result<u64> {
        let mut levels = self.levels.lock().expect("mem page cache poisoned");
        let pages = levels.entry(level).or_default();
        pages.push(vec![0u8; self.page_size]);
        Ok((pages.len() - 1) as u64)
    }

    fn load(&self, level: u8, page_index: u64) -> Result<Vec<u8>> {
        let levels = self.levels.lock().expect("mem page cache poisoned");
        match levels.get(&level).and_then(|pages| pages.get(page_index as usize)) {
            Some(page) => Ok(page.clone()),
            None => err_at!(Corruption, msg: "load of unallocated page {}/{}", level, page_index),
        }
    }

    fn store(&self, level: u8, page_index: u64, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return err_at!(Fatal, msg: "page write of {} bytes, expected {}", data.len(), self.page_size);
        }
        let mut levels = self.levels.lock().expect("mem page cache poisoned");
        match levels.get_mut(&level).and_then(|pages| pages.get_mut(page_index as usize)) {
            Some(page) => {
                page.copy_from_slice(data);
                Ok(())
            }
            None => err_at!(Corruption, msg: "store to unallocated page {}/{}", level, page_index),
        }
    }

    fn truncate(&self, level: u8) -> Result<()> {
        let mut levels = self.levels.lock().expect("mem page cache poisoned");
        levels.remove(&level);
        Ok(())
    }

    fn flush(&self, _level: u8) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
