//! Writing sudoers drop-in fragments.
//!
//! A grant for one user lives in `/etc/sudoers.d/<user>`. The write path is
//! back up → write with mode 0440 → `visudo -c -f` syntax check; a fragment
//! that fails validation is deleted again so an unparsable file never stays
//! in place (sudo refuses the whole directory otherwise).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::backup::backup_before_rewrite;
use crate::error::{IniqError, Result};
use crate::runner::CommandRunner;

/// Render the fragment content for one user.
pub fn sudoers_entry(user: &str, nopasswd: bool) -> String {
    if nopasswd {
        format!("{} ALL=(ALL) NOPASSWD: ALL\n", user)
    } else {
        format!("{} ALL=(ALL) ALL\n", user)
    }
}

/// The drop-in path for one user.
pub fn fragment_path(sudoers_dir: &Path, user: &str) -> PathBuf {
    sudoers_dir.join(user)
}

/// Current fragment content, if a grant exists.
pub fn existing_entry(sudoers_dir: &Path, user: &str) -> Option<String> {
    fs::read_to_string(fragment_path(sudoers_dir, user)).ok()
}

/// Writer for sudoers fragments.
#[derive(Debug)]
pub struct SudoersWriter<'a> {
    runner: &'a CommandRunner,
    sudoers_dir: PathBuf,
    /// Timestamped backups when true, single `.bak` otherwise.
    timestamped_backup: bool,
}

impl<'a> SudoersWriter<'a> {
    pub fn new(runner: &'a CommandRunner, sudoers_dir: &Path, timestamped_backup: bool) -> Self {
        Self {
            runner,
            sudoers_dir: sudoers_dir.to_path_buf(),
            timestamped_backup,
        }
    }

    /// Install (or refresh) the grant for `user`.
    ///
    /// Idempotent: a fragment already holding the target content is left
    /// untouched, so a retried attempt converges instead of re-writing.
    pub fn write_entry(&self, user: &str, nopasswd: bool) -> Result<()> {
        let path = fragment_path(&self.sudoers_dir, user);
        let content = sudoers_entry(user, nopasswd);

        if self.runner.dry_run() {
            info!(path = %path.display(), "[dry-run] would write sudoers entry: {}", content.trim());
            return Ok(());
        }

        if existing_entry(&self.sudoers_dir, user).as_deref() == Some(content.as_str()) {
            info!(path = %path.display(), "sudoers entry already up to date");
            return Ok(());
        }

        backup_before_rewrite(&path, self.timestamped_backup)?;
        fs::write(&path, &content)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o440))?;

        let check = self.runner.probe(
            "visudo",
            &["-c", "-f", &path.display().to_string()],
        );
        let valid = match check {
            Ok(out) => out.success,
            Err(e) => {
                // Cannot validate: do not leave an unchecked fragment behind.
                let _ = fs::remove_file(&path);
                return Err(e);
            }
        };
        if !valid {
            fs::remove_file(&path)?;
            return Err(IniqError::system(format!(
                "visudo rejected the generated entry for {}; file removed",
                user
            )));
        }

        info!(path = %path.display(), "installed sudoers entry");
        Ok(())
    }
}
