//! Host OS detection.
//!
//! Resolves the per-distribution facts the features need: where the SSH
//! daemon config lives, how to restart the daemon, and which group grants
//! admin rights. Detection reads `/etc/os-release` once at startup; the
//! result is immutable for the rest of the run.

use std::fs;
use std::path::{Path, PathBuf};

use strum::{Display, EnumString};

use crate::error::{IniqError, Result};

/// Linux distribution family, as far as iniq cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DistroFamily {
    Debian,
    Rhel,
    Arch,
    Suse,
}

/// Immutable host facts consumed by features.
#[derive(Debug, Clone)]
pub struct OsInfo {
    pub family: DistroFamily,
    /// Pretty name from os-release, for display.
    pub name: String,
    /// Path to the SSH daemon configuration.
    pub sshd_config: PathBuf,
    /// systemd unit name for the SSH daemon.
    pub sshd_service: &'static str,
    /// Group whose members may use sudo.
    pub admin_group: &'static str,
}

impl OsInfo {
    /// Detect the running distribution from `/etc/os-release`.
    pub fn detect() -> Result<Self> {
        let text = fs::read_to_string("/etc/os-release").map_err(|e| {
            IniqError::unsupported(format!("cannot read /etc/os-release: {}", e))
        })?;
        Self::from_os_release(&text)
    }

    /// Build host facts from os-release text. Split out for tests.
    pub fn from_os_release(text: &str) -> Result<Self> {
        let id = os_release_field(text, "ID").unwrap_or_default();
        let id_like = os_release_field(text, "ID_LIKE").unwrap_or_default();
        let name = os_release_field(text, "PRETTY_NAME")
            .or_else(|| os_release_field(text, "NAME"))
            .unwrap_or_else(|| "unknown Linux".to_string());

        let haystack = format!("{} {}", id, id_like);
        let family = if contains_word(&haystack, &["debian", "ubuntu"]) {
            DistroFamily::Debian
        } else if contains_word(&haystack, &["rhel", "fedora", "centos", "rocky", "almalinux"]) {
            DistroFamily::Rhel
        } else if contains_word(&haystack, &["arch", "manjaro"]) {
            DistroFamily::Arch
        } else if contains_word(&haystack, &["suse", "opensuse"]) {
            DistroFamily::Suse
        } else {
            return Err(IniqError::unsupported(format!(
                "unrecognized distribution (ID={:?}, ID_LIKE={:?})",
                id, id_like
            )));
        };

        Ok(Self::for_family(family, name))
    }

    /// Per-family constants.
    pub fn for_family(family: DistroFamily, name: String) -> Self {
        let (sshd_service, admin_group) = match family {
            // Debian's unit is "ssh"; the others call it "sshd".
            DistroFamily::Debian => ("ssh", "sudo"),
            DistroFamily::Rhel => ("sshd", "wheel"),
            DistroFamily::Arch => ("sshd", "wheel"),
            DistroFamily::Suse => ("sshd", "wheel"),
        };
        Self {
            family,
            name,
            sshd_config: PathBuf::from("/etc/ssh/sshd_config"),
            sshd_service,
            admin_group,
        }
    }

    /// Command line that restarts the SSH daemon.
    pub fn sshd_restart_command(&self) -> (&'static str, Vec<String>) {
        (
            "systemctl",
            vec!["restart".to_string(), self.sshd_service.to_string()],
        )
    }

    /// Directory for sudoers drop-in fragments. Fixed across distros.
    pub fn sudoers_dir(&self) -> &Path {
        Path::new("/etc/sudoers.d")
    }
}

/// Whether the current process runs with effective UID 0.
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// The login name of the invoking user, honoring SUDO_USER so remediation
/// targets the human, not root.
pub fn current_username() -> Option<String> {
    if let Ok(sudo_user) = std::env::var("SUDO_USER") {
        if !sudo_user.is_empty() {
            return Some(sudo_user);
        }
    }
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.name)
}

fn os_release_field(text: &str, key: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(key) {
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value.trim_matches('"').to_string());
            }
        }
    }
    None
}

fn contains_word(haystack: &str, words: &[&str]) -> bool {
    haystack
        .split(|c: char| c.is_whitespace() || c == '"')
        .any(|w| words.contains(&w))
}
