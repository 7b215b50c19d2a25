//! Mapping manager: owns the one shared `mmap` that always starts at file
//! offset 0 and covers a prefix of levels, growing as insertion needs deeper
//! levels.
//!
//! `memmap2` has no `mremap` wrapper, so "remapping" here is flush-drop-remap
//! (as in production mmap-backed stores — see e.g. vector storage engines
//! that resize by dropping and re-`mmap`ing after `set_len`), rather than a
//! literal `mremap(2)` call. For a single-threaded handle the two are
//! observationally identical: no other thread can be mid-access to the old
//! mapping when it is dropped.

use std::fs::File;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::Error;
use crate::layout::span_through;

/// Ceiling (in levels covered) above which no further remapping is attempted.
/// Unbounded on 64-bit hosts; capped at 23 (8 Mi elements per mapped level) on
/// 32-bit hosts, where address space can't comfortably hold more.
#[cfg(target_pointer_width = "32")]
pub const MAP_MAX: u32 = 23;
#[cfg(not(target_pointer_width = "32"))]
pub const MAP_MAX: u32 = crate::layout::NUM_LEVELS;

enum Map {
    Ro(Mmap),
    Rw(MmapMut),
}

/// The installed mapping, if any, plus how many levels (0..levels) it covers.
pub struct Mapping {
    map: Option<Map>,
    /// Number of levels covered by the mapping, i.e. the mapping spans
    /// `[0, span_through(levels))`. `levels == 0` means nothing is mapped.
    levels: u32,
    rw: bool,
}

impl Mapping {
    /// Installs the initial mapping covering `levels` levels (may be 0 to map
    /// nothing, matching the spec's `INITIAL_LEVELS == 0` escape hatch).
    pub fn install(file: &File, rw: bool, levels: u32) -> Result<Self, Error> {
        let mut mapping = Mapping { map: None, levels: 0, rw };
        if levels > 0 {
            mapping.remap(file, levels)?;
        }
        Ok(mapping)
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Grows the mapping, if necessary, to cover at least `levels` levels.
    /// No-op if already covering enough or if `levels` exceeds [`MAP_MAX`].
    pub fn ensure(&mut self, file: &File, levels: u32) -> Result<(), Error> {
        if levels <= self.levels || levels > MAP_MAX {
            return Ok(());
        }
        self.remap(file, levels)
    }

    fn remap(&mut self, file: &File, levels: u32) -> Result<(), Error> {
        let new_size = span_through(levels);
        tracing::debug!(levels, new_size, "remapping");

        // Drop the old mapping (if any) before creating the new one so we
        // never hold two mappings of the same file at once.
        self.map = None;

        let map = if self.rw {
            // SAFETY: `file` is a regular, open, read-write file whose length
            // covers `new_size` (the caller reserves space before growing the
            // mapping — see the insertion engine). Concurrent modification of
            // the file from outside this process is the same hazard any mmap
            // carries and is out of scope (single-handle-owns-file model).
            let opts = MmapOptions::new().len(new_size as usize);
            Map::Rw(unsafe { opts.map_mut(file) }.map_err(|e| Error::io("mmap", e))?)
        } else {
            // SAFETY: see above.
            let opts = MmapOptions::new().len(new_size as usize);
            Map::Ro(unsafe { opts.map(file) }.map_err(|e| Error::io("mmap", e))?)
        };

        self.map = Some(map);
        self.levels = levels;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.map {
            Some(Map::Ro(m)) => &m[..],
            Some(Map::Rw(m)) => &m[..],
            None => &[],
        }
    }

    /// Mutable access to the mapping. Panics if the mapping is read-only or
    /// absent; callers only invoke this on handles opened read-write.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.map {
            Some(Map::Rw(m)) => &mut m[..],
            _ => panic!("colacask: mutable mapping access on a read-only or absent mapping"),
        }
    }

    /// Schedules an asynchronous flush (`MS_ASYNC` equivalent); does not wait
    /// for completion, matching the documented "writes are asynchronous and
    /// unordered" durability stance.
    pub fn flush_async(&self) -> Result<(), Error> {
        match &self.map {
            Some(Map::Rw(m)) => m.flush_async().map_err(|e| Error::io("msync", e)),
            _ => Ok(()),
        }
    }
}
