//! Local account probes.
//!
//! Read-only lookups against the host's user database, shared by several
//! features (user creation checks existence, ssh-keys needs the home
//! directory and ownership, sudo checks group membership). All probes go
//! through `getent`/`id` so NSS sources beyond `/etc/passwd` are honored.

use std::path::PathBuf;

use crate::error::{IniqError, Result};
use crate::runner::CommandRunner;

/// One parsed passwd entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

impl PasswdEntry {
    /// Parse a `name:x:uid:gid:gecos:home:shell` line.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split(':').collect();
        if fields.len() < 7 {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
            shell: fields[6].to_string(),
        })
    }
}

/// Look up a user. `Ok(None)` means the account does not exist.
pub fn lookup_user(runner: &CommandRunner, name: &str) -> Result<Option<PasswdEntry>> {
    let out = runner.probe("getent", &["passwd", name])?;
    if out.success {
        PasswdEntry::parse(&out.stdout)
            .map(Some)
            .ok_or_else(|| IniqError::system(format!("unparsable passwd entry for {}", name)))
    } else if out.exit_code == Some(2) {
        // getent: key not found.
        Ok(None)
    } else {
        out.ensure_success("getent passwd").map(|_| None)
    }
}

/// Group names the user belongs to.
pub fn user_groups(runner: &CommandRunner, name: &str) -> Result<Vec<String>> {
    let out = runner
        .probe("id", &["-nG", name])?
        .ensure_success("id -nG")?;
    Ok(out.stdout.split_whitespace().map(str::to_string).collect())
}

/// Whether `user` is a member of `group`.
pub fn in_group(runner: &CommandRunner, user: &str, group: &str) -> Result<bool> {
    Ok(user_groups(runner, user)?.iter().any(|g| g == group))
}
