//! Human-readable dump of every level with `2^l <= n`, lowest first.
//!
//! Occupied levels hold live keys; unoccupied ones still have their bytes on
//! disk (stale leftovers from a previous merge — invariant says their
//! contents are meaningless) and are printed dimmed with the original tool's
//! own `\x1b[2;37m` / `\x1b[0m` escape pair, the same ANSI codes
//! `original_source/coladb.c`'s `cola_dump` used, rather than pulling in a
//! terminal-color crate for two constants.

use std::io::{self, Write};

use crate::db::Database;
use crate::error::Error;
use crate::format::{Element, ELEMENT_SIZE};
use crate::layout::{is_occupied, level_capacity, level_offset, NUM_LEVELS};

/// Truncation width: levels past this many keys print only the first and
/// last few with an elision marker, matching the original tool's terminal
/// output.
const PREVIEW_KEYS: u64 = 9;

const DIM: &str = "\x1b[2;37m";
const RESET: &str = "\x1b[0m";

pub fn dump(db: &Database, out: &mut dyn Write) -> Result<(), Error> {
    let n = db.n_elements();
    let mapping = db.mapping();

    writeln!(out, "{n} items").map_err(|e| Error::io("write dump output", e))?;

    for level in 0..NUM_LEVELS {
        if level_capacity(level) > n {
            break;
        }
        let capacity = level_capacity(level);
        let keys = read_level_keys(db, level, capacity, mapping.levels())?;
        let occupied = is_occupied(n, level);
        write_level(out, level, &keys, occupied).map_err(|e| Error::io("write dump output", e))?;
    }
    Ok(())
}

fn read_level_keys(
    db: &Database,
    level: u32,
    capacity: u64,
    mapped_levels: u32,
) -> Result<Vec<u64>, Error> {
    let mut keys = Vec::with_capacity(capacity as usize);
    if level < mapped_levels {
        let buf = db.mapping().as_slice();
        let off = level_offset(level) as usize;
        for i in 0..capacity {
            keys.push(Element::key_at(&buf[off..], i));
        }
    } else {
        let base = level_offset(level);
        let mut elem_buf = [0u8; ELEMENT_SIZE as usize];
        for i in 0..capacity {
            crate::fileio::pread_exact(
                db.file(),
                base + i * ELEMENT_SIZE,
                &mut elem_buf,
                "read element for dump",
            )?;
            keys.push(u64::from_le_bytes(elem_buf[0..8].try_into().unwrap()));
        }
    }
    Ok(keys)
}

fn write_level(out: &mut dyn Write, level: u32, keys: &[u64], occupied: bool) -> io::Result<()> {
    if !occupied {
        write!(out, "{DIM}")?;
    }
    write!(out, "level {level:2} ({} keys):", keys.len())?;
    if keys.len() as u64 <= PREVIEW_KEYS {
        for k in keys {
            write!(out, " {k}")?;
        }
    } else {
        let half = (PREVIEW_KEYS / 2) as usize;
        for k in &keys[..half] {
            write!(out, " {k}")?;
        }
        write!(out, " ...")?;
        for k in &keys[keys.len() - half..] {
            write!(out, " {k}")?;
        }
    }
    if !occupied {
        write!(out, "{RESET}")?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_level_prints_every_key() {
        let mut out = Vec::new();
        write_level(&mut out, 2, &[1, 2, 3], true).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert_eq!(s, "level  2 (3 keys): 1 2 3\n");
    }

    #[test]
    fn long_level_is_truncated() {
        let keys: Vec<u64> = (0..20).collect();
        let mut out = Vec::new();
        write_level(&mut out, 5, &keys, true).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.contains("..."));
        assert!(s.starts_with("level  5 (20 keys): 0 1 2 3 ..."));
    }

    #[test]
    fn unoccupied_level_is_dimmed() {
        let mut out = Vec::new();
        write_level(&mut out, 0, &[7], false).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with(DIM));
        assert!(s.trim_end().ends_with(RESET));
        assert!(s.contains("level  0 (1 keys): 7"));
    }
}
