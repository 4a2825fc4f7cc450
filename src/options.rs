//! Typed run options for iniq.
//!
//! The desired configuration for one run lives in a single [`Options`] value,
//! assembled from CLI flags (and optionally a JSON config file) by the
//! composition root. Features read it and write resolved values back into the
//! [`Derived`] side-channel so later-priority features observe the same
//! decisions. The struct replaces a stringly-keyed bag with compile-time
//! checked fields.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{IniqError, Result};

/// Tokens accepted as "enable" for tri-state flags, case-insensitive.
pub const ENABLE_TOKENS: &[&str] = &["yes", "enable", "true", "1", "y", "t", "on"];
/// Tokens accepted as "disable" for tri-state flags, case-insensitive.
pub const DISABLE_TOKENS: &[&str] = &["no", "disable", "false", "0", "n", "f", "off"];

/// Tri-valued desired state for a hardening toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    Enable,
    Disable,
    #[default]
    Unset,
}

impl TriState {
    /// Parse a user-supplied token, naming the flag in the error.
    pub fn parse(raw: &str, flag: &str) -> Result<Self> {
        let token = raw.trim().to_ascii_lowercase();
        if ENABLE_TOKENS.contains(&token.as_str()) {
            Ok(Self::Enable)
        } else if DISABLE_TOKENS.contains(&token.as_str()) {
            Ok(Self::Disable)
        } else {
            Err(IniqError::validation(format!(
                "invalid value {:?} for {}: accepted values are {} (enable) or {} (disable)",
                raw,
                flag,
                ENABLE_TOKENS.join("/"),
                DISABLE_TOKENS.join("/"),
            )))
        }
    }

    /// The desired boolean, if this toggle was set at all.
    pub fn desired(self) -> Option<bool> {
        match self {
            Self::Enable => Some(true),
            Self::Disable => Some(false),
            Self::Unset => None,
        }
    }

    pub fn is_set(self) -> bool {
        self != Self::Unset
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "enable"),
            Self::Disable => write!(f, "disable"),
            Self::Unset => write!(f, "unset"),
        }
    }
}

/// Values resolved during the run by one feature and consumed by
/// later-priority features.
#[derive(Debug, Clone, Default)]
pub struct Derived {
    /// The effective username, written by the user feature once resolved
    /// (flag value, interactive answer, or existing-account confirmation).
    pub username: Option<String>,
    /// Set by the sudo feature's detection: the user already has a
    /// passwordless sudoers entry, so prompting can be skipped.
    pub sudo_already_configured: Option<bool>,
}

/// Desired configuration for one iniq run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Target username (`--user`).
    pub user: Option<String>,
    /// SSH key specs: `github:NAME`, `gitlab:NAME`, `url:URL`, `file:PATH`.
    pub keys: Vec<String>,
    /// Desired PermitRootLogin state (`--ssh-root-login`), raw token.
    pub ssh_root_login: Option<String>,
    /// Desired PasswordAuthentication state (`--ssh-password-auth`), raw token.
    pub ssh_password_auth: Option<String>,
    /// Deprecated alias for `--ssh-root-login no`.
    pub ssh_no_root: bool,
    /// Deprecated alias for `--ssh-password-auth no`.
    pub ssh_no_password: bool,
    /// Grant passwordless sudo (default true).
    pub sudo_nopasswd: bool,
    /// Do not touch sudo configuration at all.
    pub skip_sudo: bool,
    /// Apply all hardening options.
    pub all: bool,
    /// Set a password for the created user interactively.
    pub password: bool,
    /// Create the user with a locked password (key-only login).
    pub no_password: bool,
    /// Take timestamped backups before rewriting config files.
    pub backup: bool,
    /// Assume yes: never prompt, take defaults.
    pub assume_yes: bool,
    /// Log intended actions without mutating anything.
    pub dry_run: bool,
    /// Interactive mode: detect, display, and prompt per feature.
    pub interactive: bool,
    /// Values resolved mid-run, readable by later features.
    pub derived: Derived,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            user: None,
            keys: Vec::new(),
            ssh_root_login: None,
            ssh_password_auth: None,
            ssh_no_root: false,
            ssh_no_password: false,
            sudo_nopasswd: true,
            skip_sudo: false,
            all: false,
            password: false,
            no_password: false,
            backup: false,
            assume_yes: false,
            dry_run: false,
            interactive: false,
            derived: Derived::default(),
        }
    }
}

impl Options {
    /// The username later features should operate on: the derived value once
    /// the user feature has resolved it, else the raw flag.
    pub fn effective_user(&self) -> Option<&str> {
        self.derived
            .username
            .as_deref()
            .or(self.user.as_deref())
    }

    /// True when any flag requesting an action was given. Used to decide
    /// whether a bare `iniq` invocation enters interactive mode.
    pub fn has_action_flags(&self) -> bool {
        self.user.is_some()
            || !self.keys.is_empty()
            || self.ssh_root_login.is_some()
            || self.ssh_password_auth.is_some()
            || self.ssh_no_root
            || self.ssh_no_password
            || self.all
    }

    /// Resolve the interactive flag: no action flags and no `--yes` means
    /// the run is a guided questionnaire.
    pub fn finalize(&mut self) {
        self.interactive = !self.has_action_flags() && !self.assume_yes;
    }

    /// Overlay values from a JSON config file. CLI flags win: only fields
    /// still at their "not given" value are taken from the file.
    pub fn apply_config_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)?;
        let file: OptionsFile = serde_json::from_str(&text)?;
        if self.user.is_none() {
            self.user = file.user;
        }
        if self.keys.is_empty() {
            if let Some(keys) = file.keys {
                self.keys = keys;
            }
        }
        if self.ssh_root_login.is_none() {
            self.ssh_root_login = file.ssh_root_login;
        }
        if self.ssh_password_auth.is_none() {
            self.ssh_password_auth = file.ssh_password_auth;
        }
        if let Some(v) = file.sudo_nopasswd {
            self.sudo_nopasswd = v;
        }
        self.skip_sudo |= file.skip_sudo.unwrap_or(false);
        self.all |= file.all.unwrap_or(false);
        self.backup |= file.backup.unwrap_or(false);
        Ok(())
    }
}

/// On-disk JSON shape for `--config`. Every field optional; absent fields
/// leave the CLI value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct OptionsFile {
    user: Option<String>,
    keys: Option<Vec<String>>,
    ssh_root_login: Option<String>,
    ssh_password_auth: Option<String>,
    sudo_nopasswd: Option<bool>,
    skip_sudo: Option<bool>,
    all: Option<bool>,
    backup: Option<bool>,
}

/// Validate a username against the portable POSIX rules iniq enforces:
/// lowercase start, then lowercase/digits/underscore/hyphen, max 32 chars.
pub fn validate_username(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_first = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if name.is_empty() || name.len() > 32 || !valid_first || !valid_rest {
        return Err(IniqError::validation(format!(
            "invalid username {:?}: must start with a lowercase letter or underscore, \
             contain only lowercase letters, digits, '_' or '-', and be at most 32 characters",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_tristate_enable_tokens() {
        for token in ["yes", "ENABLE", "true", "1", "y", "T", "on"] {
            assert_eq!(
                TriState::parse(token, "--ssh-root-login").unwrap(),
                TriState::Enable,
                "token {token}"
            );
        }
    }

    #[test]
    fn test_tristate_disable_tokens() {
        for token in ["no", "disable", "FALSE", "0", "n", "f", "off"] {
            assert_eq!(
                TriState::parse(token, "--ssh-password-auth").unwrap(),
                TriState::Disable,
                "token {token}"
            );
        }
    }

    #[test]
    fn test_tristate_invalid_token_names_value_and_tokens() {
        let err = TriState::parse("invalid-value", "--ssh-root-login").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid-value"));
        assert!(msg.contains("--ssh-root-login"));
        assert!(msg.contains("yes/enable/true/1/y/t/on"));
        assert!(msg.contains("no/disable/false/0/n/f/off"));
    }

    #[test]
    fn test_interactive_resolution() {
        let mut opts = Options::default();
        opts.finalize();
        assert!(opts.interactive, "bare invocation is interactive");

        let mut opts = Options {
            user: Some("alice".into()),
            ..Options::default()
        };
        opts.finalize();
        assert!(!opts.interactive, "action flags suppress interactive mode");

        let mut opts = Options {
            assume_yes: true,
            ..Options::default()
        };
        opts.finalize();
        assert!(!opts.interactive, "--yes suppresses interactive mode");
    }

    #[test]
    fn test_effective_user_prefers_derived() {
        let mut opts = Options {
            user: Some("alice".into()),
            ..Options::default()
        };
        assert_eq!(opts.effective_user(), Some("alice"));
        opts.derived.username = Some("bob".into());
        assert_eq!(opts.effective_user(), Some("bob"));
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("_svc-user1").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("Alice").is_err());
        assert!(validate_username("1alice").is_err());
        assert!(validate_username("al ice").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_config_file_merge_cli_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"user": "filed", "keys": ["github:filed"], "sudo-nopasswd": false}}"#
        )
        .unwrap();

        let mut opts = Options {
            user: Some("cli".into()),
            ..Options::default()
        };
        opts.apply_config_file(file.path()).unwrap();
        assert_eq!(opts.user.as_deref(), Some("cli"), "CLI flag wins");
        assert_eq!(opts.keys, vec!["github:filed".to_string()]);
        assert!(!opts.sudo_nopasswd);
    }

    #[test]
    fn test_config_file_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"no-such-option": true}}"#).unwrap();
        let mut opts = Options::default();
        assert!(opts.apply_config_file(file.path()).is_err());
    }
}
