//! Insertion: duplicate rejection, then a k-way merge of the new key against
//! every currently-occupied level below the carry level, writing the result
//! into the level the carry lands on.
//!
//! The merge's tricky part is aliasing: levels below the carry level are read
//! while the carry level itself is written, and when both live in the same
//! shared mapping a naive implementation would need two overlapping borrows
//! of it. `split_at_mut` resolves this without `unsafe`: when the output
//! level falls inside the mapped region, every source level does too (they
//! are all strictly lower), so one `split_at_mut` at the output level's
//! offset yields a read half and a disjoint write half. When the output
//! level falls outside the mapped region, the mapping is only ever borrowed
//! immutably (for source levels still within it) while the output goes
//! through positioned I/O instead.

use crate::db::Database;
use crate::error::Error;
use crate::format::Element;
use crate::heap::{HeapItem, MinHeap};
use crate::layout::{
    carry_level, is_occupied, level_byte_len, level_capacity, level_offset, span_through,
};
use crate::stream::{Input, Output};

pub fn insert(db: &mut Database, key: u64) -> Result<(), Error> {
    if crate::engine::query::query(db, key)? {
        return Err(Error::protocol(format!("key {key} already present")));
    }

    let n = db.n_elements();
    let level = carry_level(n);

    crate::fileio::reserve(db.file(), span_through(level + 1), "reserve level for insert")?;

    let map_target = (level + 1).min(crate::mapping::MAP_MAX);
    let (file, mapping) = db.file_and_mapping_mut();
    mapping.ensure(file, map_target)?;
    let mapped_levels = mapping.levels();

    // Level `level + 1` is untouched by this merge (invariant 4: disjoint
    // byte ranges), so it's safe to read through positioned I/O concurrently
    // with a mapped write to level `level` even when both live in the same
    // file. Going through `file` uniformly here (rather than threading a
    // slice out of the mapping) sidesteps a second mutable/immutable split
    // of the mapping for what is, numerically, a rare case (only levels
    // `level` and `level + 1` both occupied at once).
    let mut cascade = if is_occupied(n, level + 1) {
        Some(Cascade::new(Input::buffered(file, level + 1))?)
    } else {
        None
    };

    if level < mapped_levels {
        let split_at = level_offset(level) as usize;
        let full = mapping.as_mut_slice();
        let (read_part, write_part) = full.split_at_mut(split_at);

        let mut inputs = Vec::with_capacity(level as usize + 1);
        inputs.push(Input::singleton(key));
        for l in 0..level {
            let off = level_offset(l) as usize;
            let len = level_byte_len(l) as usize;
            inputs.push(Input::mapped(&read_part[off..off + len], level_capacity(l)));
        }
        let output = Output::mapped(write_part);
        run_merge(inputs, output, cascade.as_mut())?;
    } else {
        let ro = mapping.as_slice();
        let mut inputs = Vec::with_capacity(level as usize + 1);
        inputs.push(Input::singleton(key));
        for l in 0..level {
            if l < mapped_levels {
                let off = level_offset(l) as usize;
                let len = level_byte_len(l) as usize;
                inputs.push(Input::mapped(&ro[off..off + len], level_capacity(l)));
            } else {
                inputs.push(Input::buffered(file, l));
            }
        }
        let output = Output::buffered(file, level);
        run_merge(inputs, output, cascade.as_mut())?;
    }

    db.set_n_elements(n + 1);
    Ok(())
}

/// Tracks, during a merge, how many keys of the next-larger level (the one
/// this merge's output doesn't touch) are strictly less than each key as
/// it's emitted — the straddle position fractional cascading stores as `fp`.
/// Both the merge's output and this source are individually sorted
/// ascending, so a running two-pointer join computes it without any
/// per-key binary search.
struct Cascade<'a> {
    source: Input<'a>,
    next: Option<u64>,
    count: u64,
}

impl<'a> Cascade<'a> {
    fn new(mut source: Input<'a>) -> Result<Self, Error> {
        let next = source.pull()?;
        Ok(Cascade { source, next, count: 0 })
    }

    fn fp_for(&mut self, key: u64) -> Result<u64, Error> {
        while let Some(k) = self.next {
            if k >= key {
                break;
            }
            self.count += 1;
            self.next = self.source.pull()?;
        }
        Ok(self.count)
    }
}

fn run_merge(
    mut inputs: Vec<Input>,
    mut output: Output,
    mut cascade: Option<&mut Cascade>,
) -> Result<(), Error> {
    let mut items = Vec::with_capacity(inputs.len());
    for (idx, input) in inputs.iter_mut().enumerate() {
        if let Some(key) = input.pull()? {
            items.push(HeapItem { key, stream: idx });
        }
    }
    let mut heap = MinHeap::heapify(items);
    while let Some(min) = heap.peek() {
        let fp = match cascade.as_deref_mut() {
            Some(c) => c.fp_for(min.key)?,
            None => 0,
        };
        output.push(Element { key: min.key, fp })?;

        match inputs[min.stream].pull()? {
            Some(next_key) => heap.replace_min(HeapItem { key: next_key, stream: min.stream }),
            None => heap.pop_min(),
        }
    }
    output.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ELEMENT_SIZE;
    use std::fs::OpenOptions;

    /// Writes `keys` (already sorted) as a level-shaped run at `level`'s
    /// offset in a scratch file and hands back the opened file, so `Cascade`
    /// can be driven through the same `Input::buffered` path insertion uses.
    fn level_file(level: u32, keys: &[u64]) -> (tempfile::TempDir, std::fs::File) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lvl.bin");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        let end = level_offset(level) + level_byte_len(level);
        file.set_len(end).unwrap();
        for (i, &k) in keys.iter().enumerate() {
            let elem = Element { key: k, fp: 0 };
            crate::fileio::pwrite_all(
                &file,
                level_offset(level) + i as u64 * ELEMENT_SIZE,
                &elem.to_bytes(),
                "test setup",
            )
            .unwrap();
        }
        (dir, file)
    }

    #[test]
    fn cascade_counts_strictly_less_than() {
        // Level 1 (capacity 2) holds [20, 40]; straddle positions for a
        // level-0 merge emitting 10, 25, 50 should be 0, 1, 2.
        let (_dir, file) = level_file(1, &[20, 40]);
        let mut cascade = Cascade::new(Input::buffered(&file, 1)).unwrap();
        assert_eq!(cascade.fp_for(10).unwrap(), 0);
        assert_eq!(cascade.fp_for(25).unwrap(), 1);
        assert_eq!(cascade.fp_for(50).unwrap(), 2);
    }

    #[test]
    fn cascade_handles_interleaved_keys() {
        let (_dir, file) = level_file(2, &[5, 15, 25, 35]);
        let mut cascade = Cascade::new(Input::buffered(&file, 2)).unwrap();
        // Emitted keys climbing past straddle keys one at a time.
        assert_eq!(cascade.fp_for(6).unwrap(), 1);
        assert_eq!(cascade.fp_for(16).unwrap(), 2);
        assert_eq!(cascade.fp_for(100).unwrap(), 4);
    }
}
