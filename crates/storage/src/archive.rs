// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive creation, ported from `afk/storage/storage.py`'s
//! `_export_entry`/`_add_archive_fileobj`: a bz2-compressed tar built under
//! `tmp`, then atomically moved into place.

use bzip2::write::BzEncoder;
use bzip2::Compression;
use tar::Builder;

use crate::error::StorageError;
use crate::location::{Location, OpenMode};

/// Writes `files` into a bz2-compressed tar at `destination`, staging the
/// build under `tmp` first. Directories recurse, mirroring the original's
/// archive-membership walk. Fails before any file is touched if one of
/// `files` is missing.
pub fn create_archive(
    files: &[Box<dyn Location>],
    destination: &dyn Location,
    tmp: &dyn Location,
    cleanup: bool,
) -> Result<(), StorageError> {
    for file in files {
        if !file.exists()? {
            return Err(crate::error::StorageError::NotFound(file.path().into()));
        }
    }

    let staging_name = format!("{}.partial", destination.name());
    let mut staging = tmp.join_loc(&staging_name);
    staging.touch(true, true)?;

    {
        let out = staging.open(OpenMode::Write)?;
        let encoder = BzEncoder::new(out, Compression::best());
        let mut builder = Builder::new(encoder);
        for file in files {
            add_archive_member(&mut builder, file.as_ref(), file.name())?;
        }
        let encoder = builder
            .into_inner()
            .map_err(|e| StorageError::io(staging.path(), e))?;
        encoder
            .finish()
            .map_err(|e| StorageError::io(staging.path(), e))?;
    }

    staging.move_to(destination)?;

    if cleanup {
        for file in files {
            file.delete(false, true)?;
        }
    }
    Ok(())
}

fn add_archive_member<W: std::io::Write>(
    builder: &mut Builder<W>,
    loc: &dyn Location,
    relative_name: &str,
) -> Result<(), StorageError> {
    if loc.is_dir()? {
        for child in loc.iter_location()? {
            let child_name = format!("{relative_name}/{}", child.name());
            add_archive_member(builder, child.as_ref(), &child_name)?;
        }
        return Ok(());
    }
    let bytes = loc.read()?;
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, relative_name, bytes.as_slice())
        .map_err(|e| StorageError::io(loc.path(), e))?;
    Ok(())
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
