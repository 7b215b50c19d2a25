//! Lookup: a binary search over each occupied level, most recently filled
//! first.
//!
//! [`query`] searches every occupied level over its full range — the
//! spec-mandated default, since the next *occupied* level after a miss is not
//! always the literal next level index, and `fp` pointers are only ever
//! computed relative to the literal next level (see [`crate::engine::insert`]).
//! [`query_with_cascading`] is the approved optimization: it walks every level
//! index (not just occupied ones) and narrows its search window using `fp`
//! whenever a miss's level and the level directly above it are *both*
//! occupied — the one case where the stored `fp` values are guaranteed to
//! still describe that neighbor's current contents (see DESIGN.md). It is not
//! called by `query` or by anything in the CLI; it exists so the cascading
//! machinery is a real, tested code path rather than a write-only field.

use std::cmp::Ordering;
use std::fs::File;
use std::ops::Range;

use crate::db::Database;
use crate::error::Error;
use crate::format::{Element, ELEMENT_SIZE};
use crate::layout::{is_occupied, level_capacity, level_offset, NUM_LEVELS};

pub fn query(db: &mut Database, key: u64) -> Result<bool, Error> {
    let n = db.n_elements();
    for level in 0..NUM_LEVELS {
        if !is_occupied(n, level) {
            continue;
        }
        if level_contains(db, level, key)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn level_contains(db: &Database, level: u32, key: u64) -> Result<bool, Error> {
    let mapping = db.mapping();
    if level < mapping.levels() {
        let buf = mapping.as_slice();
        let off = level_offset(level) as usize;
        Ok(binary_search_mapped(&buf[off..], level_capacity(level), key))
    } else {
        binary_search_positioned(db.file(), level, key)
    }
}

fn binary_search_mapped(buf: &[u8], len: u64, key: u64) -> bool {
    let mut lo = 0u64;
    let mut hi = len;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match Element::key_at(buf, mid).cmp(&key) {
            Ordering::Equal => return true,
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
        }
    }
    false
}

fn binary_search_positioned(file: &File, level: u32, key: u64) -> Result<bool, Error> {
    let len = level_capacity(level);
    let base = level_offset(level);
    let mut lo = 0u64;
    let mut hi = len;
    let mut elem_buf = [0u8; ELEMENT_SIZE as usize];
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        crate::fileio::pread_exact(
            file,
            base + mid * ELEMENT_SIZE,
            &mut elem_buf,
            "read element for query",
        )?;
        match u64::from_le_bytes(elem_buf[0..8].try_into().unwrap()).cmp(&key) {
            Ordering::Equal => return Ok(true),
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
        }
    }
    Ok(false)
}

/// Outcome of a windowed search: either a hit, or the `fp` values of the two
/// elements straddling where `key` would have been, which bound where it
/// could sit in the next level down.
struct WindowHit {
    found: bool,
    lower_fp: Option<u64>,
    upper_fp: Option<u64>,
}

impl WindowHit {
    /// The window to search `next_capacity`'s level with, given this miss.
    fn narrow(&self, next_capacity: u64) -> Range<u64> {
        let lo = self.lower_fp.unwrap_or(0).min(next_capacity);
        let hi = self.upper_fp.unwrap_or(next_capacity).max(lo).min(next_capacity);
        lo..hi
    }
}

pub fn query_with_cascading(db: &mut Database, key: u64) -> Result<bool, Error> {
    let n = db.n_elements();
    let mut window: Option<Range<u64>> = None;
    for level in 0..NUM_LEVELS {
        if level_capacity(level) > n {
            break;
        }
        if !is_occupied(n, level) {
            // Nothing valid to search, and no trustworthy fp to carry
            // forward — the next occupied level gets a fresh full window.
            window = None;
            continue;
        }
        let cap = level_capacity(level);
        let w = window.clone().unwrap_or(0..cap);
        let hit = search_level_window(db, level, w, key)?;
        if hit.found {
            return Ok(true);
        }
        window = if is_occupied(n, level + 1) {
            Some(hit.narrow(level_capacity(level + 1)))
        } else {
            None
        };
    }
    Ok(false)
}

fn search_level_window(
    db: &Database,
    level: u32,
    window: Range<u64>,
    key: u64,
) -> Result<WindowHit, Error> {
    let mapping = db.mapping();
    if level < mapping.levels() {
        let buf = mapping.as_slice();
        let off = level_offset(level) as usize;
        Ok(windowed_search_mapped(&buf[off..], window, key))
    } else {
        windowed_search_positioned(db.file(), level, window, key)
    }
}

fn windowed_search_mapped(buf: &[u8], window: Range<u64>, key: u64) -> WindowHit {
    let start = window.start;
    let end = window.end;
    let mut lo = start;
    let mut hi = end;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match Element::key_at(buf, mid).cmp(&key) {
            Ordering::Equal => return WindowHit { found: true, lower_fp: None, upper_fp: None },
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
        }
    }
    let lower_fp = (lo > start).then(|| Element::from_bytes(&elem_at(buf, lo - 1)).fp);
    let upper_fp = (lo < end).then(|| Element::from_bytes(&elem_at(buf, lo)).fp);
    WindowHit { found: false, lower_fp, upper_fp }
}

fn elem_at(buf: &[u8], index: u64) -> [u8; ELEMENT_SIZE as usize] {
    let off = (index * ELEMENT_SIZE) as usize;
    buf[off..off + ELEMENT_SIZE as usize].try_into().unwrap()
}

fn windowed_search_positioned(
    file: &File,
    level: u32,
    window: Range<u64>,
    key: u64,
) -> Result<WindowHit, Error> {
    let base = level_offset(level);
    let start = window.start;
    let end = window.end;
    let mut lo = start;
    let mut hi = end;
    let mut elem_buf = [0u8; ELEMENT_SIZE as usize];
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        crate::fileio::pread_exact(
            file,
            base + mid * ELEMENT_SIZE,
            &mut elem_buf,
            "read element for windowed query",
        )?;
        match u64::from_le_bytes(elem_buf[0..8].try_into().unwrap()).cmp(&key) {
            Ordering::Equal => return Ok(WindowHit { found: true, lower_fp: None, upper_fp: None }),
            Ordering::Less => lo = mid + 1,
            Ordering::Greater => hi = mid,
        }
    }
    let lower_fp = if lo > start {
        crate::fileio::pread_exact(
            file,
            base + (lo - 1) * ELEMENT_SIZE,
            &mut elem_buf,
            "read element for windowed query",
        )?;
        Some(Element::from_bytes(&elem_buf).fp)
    } else {
        None
    };
    let upper_fp = if lo < end {
        crate::fileio::pread_exact(
            file,
            base + lo * ELEMENT_SIZE,
            &mut elem_buf,
            "read element for windowed query",
        )?;
        Some(Element::from_bytes(&elem_buf).fp)
    } else {
        None
    };
    Ok(WindowHit { found: false, lower_fp, upper_fp })
}
