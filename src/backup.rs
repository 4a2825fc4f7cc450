//! Pre-mutation file backups.
//!
//! Every destructive rewrite of an existing config file takes a backup
//! first. With `--backup` the copy is timestamped (`<path>.bak.<YYYYMMDDhhmmss>`)
//! and accumulates across runs; without it a single `<path>.bak` is
//! overwritten each run.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::Result;

/// Copy `path` aside before a rewrite. Returns the backup path, or `None`
/// when the file does not exist yet (nothing to preserve).
pub fn backup_before_rewrite(path: &Path, timestamped: bool) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let dest = if timestamped {
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        PathBuf::from(format!("{}.bak.{}", path.display(), stamp))
    } else {
        PathBuf::from(format!("{}.bak", path.display()))
    };

    fs::copy(path, &dest)?;
    info!(from = %path.display(), to = %dest.display(), "backed up file");
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("absent.conf");
        assert!(backup_before_rewrite(&target, true).unwrap().is_none());
    }

    #[test]
    fn test_plain_backup_overwritten_each_run() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sshd_config");
        fs::write(&target, "one").unwrap();

        let first = backup_before_rewrite(&target, false).unwrap().unwrap();
        assert_eq!(first, dir.path().join("sshd_config.bak"));
        assert_eq!(fs::read_to_string(&first).unwrap(), "one");

        fs::write(&target, "two").unwrap();
        let second = backup_before_rewrite(&target, false).unwrap().unwrap();
        assert_eq!(second, first, "fallback backup path is stable");
        assert_eq!(fs::read_to_string(&second).unwrap(), "two");
    }

    #[test]
    fn test_timestamped_backup_has_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sshd_config");
        fs::write(&target, "content").unwrap();

        let backup = backup_before_rewrite(&target, true).unwrap().unwrap();
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        let suffix = name.strip_prefix("sshd_config.bak.").unwrap();
        assert_eq!(suffix.len(), 14, "YYYYMMDDhhmmss");
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(fs::read_to_string(&backup).unwrap(), "content");
    }
}
