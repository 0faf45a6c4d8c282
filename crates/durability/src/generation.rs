//! Generation directories.
//!
//! A generation is a timestamp-named directory under the engine root with a
//! `snapshot/` subtree and, once committed, an `archive` file. Because the
//! names are zero-padded timestamps, plain string order is enough to pick
//! the latest and the oldest generation.
//!
//! Deletion in this tree always cascades upward: removing the last entry of
//! a directory removes the directory, repeatedly, stopping short of the
//! engine root. The cascade is iterative.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use snapper_core::timestamp::parse_generation_name;
use tracing::debug;

use crate::archive::{Archive, ArchiveError};

/// Name of the per-generation manifest file.
pub const ARCHIVE_FILE: &str = "archive";

/// Name of the subtree holding a generation's backlink files.
pub const SNAPSHOT_DIR: &str = "snapshot";

/// Name of the overflow subdirectories bounding directory fan-out.
pub const EXT_DIR: &str = "ext";

/// Filesystem path of a generation's archive file.
pub fn archive_path(root: &Path, name: &str) -> PathBuf {
    root.join(name).join(ARCHIVE_FILE)
}

/// All generation directories under the root, sorted ascending (oldest
/// first). Entries whose names do not parse as generation timestamps are
/// not generations and are skipped.
pub fn list_generations(root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            if parse_generation_name(&name).is_some() {
                names.push(name);
            }
        }
    }
    names.sort_unstable();
    Ok(names)
}

/// Load-validate a generation's archive.
pub fn load_generation_archive(root: &Path, name: &str) -> Result<Archive, ArchiveError> {
    Archive::load(&archive_path(root, name))
}

/// All valid generations (archive present, parses, version and hash match),
/// sorted ascending.
pub fn valid_generations(root: &Path) -> io::Result<Vec<String>> {
    let mut valid = Vec::new();
    for name in list_generations(root)? {
        if load_generation_archive(root, &name).is_ok() {
            valid.push(name);
        }
    }
    Ok(valid)
}

/// The lexicographically greatest generation whose archive validates.
pub fn latest_valid_generation(root: &Path) -> io::Result<Option<String>> {
    Ok(valid_generations(root)?.pop())
}

/// Delete `target` and cascade upward: while the parent directory is left
/// empty, delete it too, stopping short of `root`.
///
/// A missing target is fine; the cascade still runs so interrupted
/// deletions can be resumed.
pub fn delete_upwards(root: &Path, target: &Path) -> io::Result<()> {
    debug_assert!(target.starts_with(root) && target != root);

    match fs::metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target)?,
        Ok(_) => fs::remove_file(target)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    debug!(target = %target.display(), "deleted");

    let mut current = target.parent();
    while let Some(dir) = current {
        if dir == root || fs::read_dir(dir)?.next().is_some() {
            break;
        }
        fs::remove_dir(dir)?;
        debug!(dir = %dir.display(), "removed empty parent directory");
        current = dir.parent();
    }
    Ok(())
}

/// Remove every empty directory beneath (and including) `dir`, bottom-up.
///
/// Returns whether `dir` itself was removed. A missing `dir` counts as
/// removed.
pub fn prune_empty_dirs(dir: &Path) -> io::Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }

    // collect directories in pre-order, then sweep them in reverse so every
    // child is handled before its parent
    let mut dirs = vec![dir.to_path_buf()];
    let mut index = 0;
    while index < dirs.len() {
        for entry in fs::read_dir(&dirs[index])? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        index += 1;
    }

    for candidate in dirs.iter().rev() {
        if fs::read_dir(candidate)?.next().is_none() {
            fs::remove_dir(candidate)?;
        }
    }
    Ok(!dir.exists())
}

/// Every file beneath `dir`, walked iteratively.
pub fn walk_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                pending.push(entry.path());
            } else {
                files.push(entry.path());
            }
        }
    }
    Ok(files)
}
