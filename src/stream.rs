//! Input/output adapters used by the k-way merge: a uniform `pull`/`push`
//! interface over either a slice of the shared mapping or a small ring-style
//! buffer refilled by positioned I/O.
//!
//! Unlike the original design's single bump-allocated 4 MiB buffer pool
//! shared across all unmapped streams in a merge, each buffered stream here
//! owns its own bounded `Vec<u8>`. Carving disjoint mutable sub-slices of one
//! shared pool out for the lifetime of a whole merge needs either unsafe
//! pointer arithmetic or an allocator abstraction; a plain per-stream buffer
//! sidesteps that for a one-off cost of a few extra small heap allocations
//! per insert, which is negligible next to the I/O it performs. The size
//! budgets from the design (64 KiB per buffered input stream, up to 4 MiB for
//! the buffered output stream) are preserved as constants.

use std::fs::File;

use crate::error::Error;
use crate::format::{Element, ELEMENT_SIZE};
use crate::layout::level_offset;

/// Per-stream buffered-input chunk size.
pub const READ_CHUNK_BYTES: u64 = 64 * 1024;

/// Ceiling on the buffered-output accumulator.
pub const WRITE_POOL_BYTES: u64 = 4 * 1024 * 1024;

/// One input to the k-way merge: either the lone new key, a slice into the
/// shared mapping, or a positioned-I/O-backed ring buffer over an unmapped
/// level.
pub enum Input<'a> {
    Singleton(Option<u64>),
    Mapped { buf: &'a [u8], pos: u64, len: u64 },
    Buffered(BufferedInput<'a>),
}

impl<'a> Input<'a> {
    pub fn singleton(key: u64) -> Self {
        Input::Singleton(Some(key))
    }

    pub fn mapped(buf: &'a [u8], len: u64) -> Self {
        Input::Mapped { buf, pos: 0, len }
    }

    pub fn buffered(file: &'a File, level: u32) -> Self {
        let capacity = 1u64 << level;
        let chunk_elems = (READ_CHUNK_BYTES / ELEMENT_SIZE).min(capacity).max(1);
        Input::Buffered(BufferedInput {
            file,
            level,
            capacity,
            consumed: 0,
            chunk: vec![0u8; (chunk_elems * ELEMENT_SIZE) as usize],
            chunk_pos: 0,
            chunk_valid: 0,
        })
    }

    /// Returns the next key, or `None` if this stream is exhausted.
    pub fn pull(&mut self) -> Result<Option<u64>, Error> {
        match self {
            Input::Singleton(slot) => Ok(slot.take()),
            Input::Mapped { buf, pos, len } => {
                if *pos >= *len {
                    return Ok(None);
                }
                let key = Element::key_at(buf, *pos);
                *pos += 1;
                Ok(Some(key))
            }
            Input::Buffered(b) => b.pull(),
        }
    }
}

pub struct BufferedInput<'a> {
    file: &'a File,
    level: u32,
    capacity: u64,
    consumed: u64,
    chunk: Vec<u8>,
    chunk_pos: usize,
    chunk_valid: usize,
}

impl BufferedInput<'_> {
    fn pull(&mut self) -> Result<Option<u64>, Error> {
        if self.chunk_pos >= self.chunk_valid {
            if self.consumed >= self.capacity {
                return Ok(None);
            }
            self.refill()?;
        }
        let key = Element::key_at(&self.chunk, (self.chunk_pos / ELEMENT_SIZE as usize) as u64);
        self.chunk_pos += ELEMENT_SIZE as usize;
        self.consumed += 1;
        Ok(Some(key))
    }

    fn refill(&mut self) -> Result<(), Error> {
        let remaining = self.capacity - self.consumed;
        let chunk_elems = (self.chunk.len() / ELEMENT_SIZE as usize) as u64;
        let take = remaining.min(chunk_elems);
        let bytes = (take * ELEMENT_SIZE) as usize;
        let offset = level_offset(self.level) + self.consumed * ELEMENT_SIZE;
        crate::fileio::pread_exact(
            self.file,
            offset,
            &mut self.chunk[..bytes],
            "read level during merge",
        )?;
        self.chunk_pos = 0;
        self.chunk_valid = bytes;
        Ok(())
    }
}

/// One output of the k-way merge.
pub enum Output<'a> {
    Mapped { buf: &'a mut [u8], pos: u64 },
    Buffered(BufferedOutput<'a>),
}

impl<'a> Output<'a> {
    pub fn mapped(buf: &'a mut [u8]) -> Self {
        Output::Mapped { buf, pos: 0 }
    }

    pub fn buffered(file: &'a File, level: u32) -> Self {
        let capacity = 1u64 << level;
        let cap_bytes = capacity * ELEMENT_SIZE;
        let chunk_bytes = cap_bytes.min(WRITE_POOL_BYTES);
        Output::Buffered(BufferedOutput {
            file,
            level,
            chunk: vec![0u8; chunk_bytes as usize],
            chunk_len: 0,
            flushed_elems: 0,
        })
    }

    pub fn push(&mut self, elem: Element) -> Result<(), Error> {
        match self {
            Output::Mapped { buf, pos } => {
                elem.write_at(buf, *pos);
                *pos += 1;
                Ok(())
            }
            Output::Buffered(b) => b.push(elem),
        }
    }

    /// Flushes any partially-filled buffered chunk. No-op for mapped output
    /// (the mapping is flushed on close).
    pub fn finish(self) -> Result<(), Error> {
        match self {
            Output::Mapped { .. } => Ok(()),
            Output::Buffered(b) => b.finish(),
        }
    }
}

pub struct BufferedOutput<'a> {
    file: &'a File,
    level: u32,
    chunk: Vec<u8>,
    chunk_len: usize,
    flushed_elems: u64,
}

impl BufferedOutput<'_> {
    fn push(&mut self, elem: Element) -> Result<(), Error> {
        let idx = (self.chunk_len / ELEMENT_SIZE as usize) as u64;
        elem.write_at(&mut self.chunk, idx);
        self.chunk_len += ELEMENT_SIZE as usize;
        if self.chunk_len == self.chunk.len() {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Error> {
        if self.chunk_len == 0 {
            return Ok(());
        }
        let offset = level_offset(self.level) + self.flushed_elems * ELEMENT_SIZE;
        crate::fileio::pwrite_all(
            self.file,
            offset,
            &self.chunk[..self.chunk_len],
            "write level during merge",
        )?;
        self.flushed_elems += (self.chunk_len / ELEMENT_SIZE as usize) as u64;
        self.chunk_len = 0;
        Ok(())
    }

    fn finish(mut self) -> Result<(), Error> {
        self.flush()
    }
}
