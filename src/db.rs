//! The `Database` handle: open/create/close and the small bookkeeping shared
//! by the insertion, query, and dump engines.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::format::{Header, HEADER_SIZE};
use crate::layout::{levels_needed, span_through};
use crate::mapping::Mapping;

/// Levels eagerly mapped when a database is created or opened, before any
/// insert forces growth. Chosen to cover up to 64 Ki elements (`2^17 - 1`)
/// without a remap, matching the design's "small databases never pay for a
/// remap" goal while staying well under [`crate::mapping::MAP_MAX`].
pub const INITIAL_LEVELS: u32 = 17;

/// A single-file, memory-mapped COLA index over unique `u64` keys.
///
/// A `Database` owns exclusive access to its backing file for the lifetime of
/// the handle: nothing here is safe to share across processes, and within a
/// process all access goes through `&mut self` for mutating operations.
pub struct Database {
    file: File,
    path: PathBuf,
    rw: bool,
    n_elements: u64,
    mapping: Mapping,
}

impl Database {
    /// Creates a new, empty database file at `path`. Fails if the file
    /// already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::Open { path: path.clone(), source: e })?;

        crate::fileio::reserve(&file, span_through(INITIAL_LEVELS), "reserve initial levels")?;
        let header = Header::new(0);
        crate::fileio::pwrite_all(&file, 0, &header.to_bytes(), "write initial header")?;

        let mapping = Mapping::install(&file, true, INITIAL_LEVELS)?;

        tracing::debug!(path = %path.display(), "created database");
        Ok(Database { file, path, rw: true, n_elements: 0, mapping })
    }

    /// Opens an existing database file at `path`.
    pub fn open(path: impl AsRef<Path>, rw: bool) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(rw)
            .open(&path)
            .map_err(|e| Error::Open { path: path.clone(), source: e })?;

        let len = file
            .metadata()
            .map_err(|e| Error::io("stat", e))?
            .len();
        if len < HEADER_SIZE {
            return Err(Error::Format { path, kind: crate::error::FormatErrorKind::Truncated });
        }

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        crate::fileio::pread_exact(&file, 0, &mut header_buf, "read header")?;
        let header = Header::from_bytes(&header_buf);

        if header.magic != crate::format::MAGIC {
            return Err(Error::Format {
                path,
                kind: crate::error::FormatErrorKind::BadMagic { found: header.magic },
            });
        }
        if header.version != crate::format::CURRENT_VERSION {
            return Err(Error::Format {
                path,
                kind: crate::error::FormatErrorKind::UnsupportedVersion { found: header.version },
            });
        }

        let needed = levels_needed(header.n_elements).max(1);
        let map_levels = needed.min(crate::mapping::MAP_MAX);
        let mapping = Mapping::install(&file, rw, map_levels)?;

        tracing::debug!(path = %path.display(), n_elements = header.n_elements, "opened database");
        Ok(Database { file, path, rw, n_elements: header.n_elements, mapping })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.n_elements
    }

    pub fn is_empty(&self) -> bool {
        self.n_elements == 0
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    pub(crate) fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub(crate) fn mapping_mut(&mut self) -> &mut Mapping {
        &mut self.mapping
    }

    /// Splits the borrow so callers can grow the mapping while still holding
    /// a reference to the file it maps, without the borrow checker seeing two
    /// overlapping borrows of `self`.
    pub(crate) fn file_and_mapping_mut(&mut self) -> (&File, &mut Mapping) {
        (&self.file, &mut self.mapping)
    }

    pub(crate) fn n_elements(&self) -> u64 {
        self.n_elements
    }

    pub(crate) fn set_n_elements(&mut self, n: u64) {
        self.n_elements = n;
    }

    /// Inserts `key`. Fails with [`Error::Protocol`] if `key` already exists,
    /// or if this handle was opened read-only.
    pub fn insert(&mut self, key: u64) -> Result<(), Error> {
        if !self.rw {
            return Err(Error::protocol("insert on a read-only handle"));
        }
        crate::engine::insert::insert(self, key)
    }

    /// Looks up `key`, returning `true` if present.
    pub fn query(&mut self, key: u64) -> Result<bool, Error> {
        crate::engine::query::query(self, key)
    }

    /// Looks up `key` using the fractional-cascading narrowed search instead
    /// of a full-range scan of every level. Not called by `query` or the CLI
    /// — it exists to keep the cascading `fp` pointers `insert` writes on a
    /// real, tested code path. See `engine::query` for when narrowing does
    /// and doesn't apply.
    pub fn query_with_cascading(&mut self, key: u64) -> Result<bool, Error> {
        crate::engine::query::query_with_cascading(self, key)
    }

    /// Writes a human-readable dump of every level to `out`.
    pub fn dump(&self, out: &mut dyn std::io::Write) -> Result<(), Error> {
        crate::engine::dump::dump(self, out)
    }

    /// Flushes pending writes and persists the current element count to the
    /// header. The header is intentionally only written here, not after every
    /// insert: a crash between inserts and the next `close` leaves the header
    /// stale, which callers are expected to detect via external means (this
    /// index does not attempt crash recovery).
    pub fn close(mut self) -> Result<(), Error> {
        let result = self.flush();
        // Drop still runs after this; mark the flush done so it doesn't repeat.
        self.rw = false;
        result
    }

    fn flush(&mut self) -> Result<(), Error> {
        if !self.rw {
            return Ok(());
        }
        self.mapping.flush_async()?;
        let header = Header::new(self.n_elements);
        crate::fileio::pwrite_all(&self.file, 0, &header.to_bytes(), "write header on close")?;
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.rw {
            if let Err(e) = self.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to flush on drop");
            }
        }
    }
}
