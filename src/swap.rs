// Copyright 2025 Brian Langenberger
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Whole-file replacement via temporary file and rename

use crate::Error;
use std::fs::File;
use std::path::Path;

/// Builds a replacement for `path` and renames it over the original
///
/// The replacement is written to a temporary file
/// in the same directory, so the final rename is atomic
/// for any reader which opened the original beforehand.
/// The original's permission bits are carried over.
///
/// If `build` fails, the temporary file is removed
/// and the original is left untouched.
pub(crate) fn replace_file<P, F>(path: P, build: F) -> Result<(), Error>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> Result<(), Error>,
{
    let path = path.as_ref();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

    build(tmp.as_file_mut())?;

    if let Ok(metadata) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }

    tmp.persist(path).map_err(|err| Error::Io(err.error))?;

    log::debug!("replaced {}", path.display());

    Ok(())
}

/// Copies exactly `len` bytes from `r` to `w`
pub(crate) fn copy_exact<R, W>(r: R, w: &mut W, len: u64) -> Result<(), Error>
where
    R: std::io::Read,
    W: std::io::Write + ?Sized,
{
    match std::io::copy(&mut r.take(len), w)? {
        copied if copied == len => Ok(()),
        _ => Err(Error::Truncated),
    }
}
