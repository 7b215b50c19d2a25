//! Retry-safe positioned byte I/O on top of a plain `File`.
//!
//! `std::fs::File`'s `read`/`write` already retry internally on `EINTR`
//! (`Interrupted` is looped by the standard library before it ever reaches
//! calling code), so the only retrying left for us to do is for *short*
//! reads/writes/pwrites — the case the original design's `fd_read`/`fd_pwrite`
//! loops exist for. A `WouldBlock` retry path is included for parity with
//! that design, though it is unreachable for the regular files this index
//! always operates on (never opened `O_NONBLOCK`).

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use crate::error::Error;

/// Reads exactly `buf.len()` bytes starting at `offset`, looping over short
/// reads. Returns an I/O error (wrapped with `context`) if EOF is hit before
/// the buffer is filled.
pub fn pread_exact(file: &File, offset: u64, buf: &mut [u8], context: &str) -> Result<(), Error> {
    let mut done = 0usize;
    while done < buf.len() {
        match file.read_at(&mut buf[done..], offset + done as u64) {
            Ok(0) => {
                return Err(Error::io(
                    context,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "short read"),
                ));
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(Error::io(context, e)),
        }
    }
    Ok(())
}

/// Writes all of `buf` starting at `offset`, looping over short writes.
pub fn pwrite_all(file: &File, offset: u64, buf: &[u8], context: &str) -> Result<(), Error> {
    let mut done = 0usize;
    while done < buf.len() {
        match file.write_at(&buf[done..], offset + done as u64) {
            Ok(0) => {
                return Err(Error::io(
                    context,
                    io::Error::new(io::ErrorKind::WriteZero, "short write"),
                ));
            }
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(Error::io(context, e)),
        }
    }
    Ok(())
}

/// Extends (or truncates) the file to `len` bytes, preferring a real
/// allocating `fallocate` on Linux so the blocks are reserved up front;
/// elsewhere (and on fallocate failure) falls back to `set_len`, matching the
/// design's "failure to reserve is reported but does not abort" stance since
/// later positioned writes will extend the file regardless.
pub fn reserve(file: &File, len: u64, context: &str) -> Result<(), Error> {
    #[cfg(target_os = "linux")]
    {
        use nix::fcntl::{fallocate, FallocateFlags};
        use std::os::unix::io::AsFd;

        let current = file.metadata().map(|m| m.len()).unwrap_or(0);
        if len > current {
            let grow = (len - current) as i64;
            if let Err(errno) = fallocate(
                file.as_fd(),
                FallocateFlags::empty(),
                current as i64,
                grow,
            ) {
                tracing::debug!(%context, ?errno, "fallocate failed, falling back to set_len");
                return file
                    .set_len(len)
                    .map_err(|e| Error::io(context, e));
            }
            return Ok(());
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        if file.metadata().map(|m| m.len()).unwrap_or(0) < len {
            file.set_len(len).map_err(|e| Error::io(context, e))?;
        }
        Ok(())
    }
}
