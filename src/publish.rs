//! Publishes a run's output directory as a whole.
//!
//! Everything is written into a sibling staging directory first and swapped
//! into place with renames, so readers see either the previous set of reports
//! or the new one, never a mix, and files a previous run wrote but this run
//! did not are gone.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

fn sibling(out_dir: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(out_dir.file_name().unwrap_or_else(|| out_dir.as_os_str()));
    name.push(suffix);
    out_dir.with_file_name(name)
}

fn remove_if_present(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Calls `fill` with an empty staging directory and, if it succeeds, makes
/// that directory the new `out_dir`. On failure `out_dir` is left untouched.
pub fn publish<T>(out_dir: &Path, fill: impl FnOnce(&Path) -> anyhow::Result<T>) -> anyhow::Result<T> {
    if let Some(parent) = out_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let staging = sibling(out_dir, ".staging");
    let previous = sibling(out_dir, ".previous");
    remove_if_present(&staging)?;
    remove_if_present(&previous)?;
    fs::create_dir(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;

    let value = match fill(&staging) {
        Ok(value) => value,
        Err(err) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }
    };

    let had_previous = out_dir.exists();
    if had_previous {
        fs::rename(out_dir, &previous)
            .with_context(|| format!("failed to move aside {}", out_dir.display()))?;
    }
    if let Err(err) = fs::rename(&staging, out_dir) {
        if had_previous {
            if let Err(restore) = fs::rename(&previous, out_dir) {
                warn!(error = %restore, "failed to restore previous reports");
            }
        }
        return Err(err).with_context(|| format!("failed to publish {}", out_dir.display()));
    }
    if had_previous {
        remove_if_present(&previous)?;
    }

    debug!(out_dir = %out_dir.display(), "published reports");
    Ok(value)
}
