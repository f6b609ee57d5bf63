//! Atomic file replacement.
//!
//! Readers of `path` observe either the previous contents or the new
//! contents in full, never a prefix. The update is written to a
//! uniquely named sibling, synced, then renamed over the target; the
//! parent directory is synced afterwards so the rename itself is
//! durable.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::Result;

/// Atomically replaces the contents of the file at `path` with `data`,
/// creating the file if it does not exist.
pub fn save_data<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let tmp = tmp_path(path);
    match write_then_rename(path, &tmp, data) {
        Ok(()) => Ok(()),
        Err(err) => {
            // the rename never happened, or failed; drop the temp file
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

fn write_then_rename(path: &Path, tmp: &Path, data: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(tmp, path)?;
    sync_parent(path)?;
    Ok(())
}

/// A sibling of `path` whose name no concurrent writer will pick.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(format!(".tmp.{}", Uuid::new_v4()));
    PathBuf::from(name)
}

/// The rename is only durable once the directory entry holding it is.
fn sync_parent(path: &Path) -> Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => File::open(parent)?,
        None => File::open(".")?,
    };
    dir.sync_all()?;
    Ok(())
}
