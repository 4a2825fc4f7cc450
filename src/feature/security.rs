//! SSH daemon hardening.
//!
//! Applies the two boolean directives iniq manages (`PermitRootLogin`,
//! `PasswordAuthentication`) through the idempotent directive mutator, with
//! pre-mutation backup, `sshd -t` syntax validation and a daemon restart.
//! `--all` and the deprecated `--ssh-no-root`/`--ssh-no-password` aliases
//! expand into the tri-state flags at activation time.

use std::fs;

use tracing::{info, warn};

use crate::backup::backup_before_rewrite;
use crate::directive::{effective_value, set_directive};
use crate::error::{IniqError, Result};
use crate::feature::{DetectedState, ExecContext, Feature, PRIORITY_SECURITY};
use crate::options::{Options, TriState};
use crate::osinfo;
use crate::prompt::Prompter;

const ROOT_LOGIN: &str = "PermitRootLogin";
const PASSWORD_AUTH: &str = "PasswordAuthentication";

/// One directive rewrite the feature intends to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Change {
    directive: &'static str,
    target: &'static str,
}

pub struct SecurityFeature;

impl SecurityFeature {
    pub fn new() -> Self {
        Self
    }

    /// The toggles requested by flags, as (directive, desired-enabled) pairs.
    fn desired_toggles(options: &Options) -> Result<Vec<(&'static str, bool)>> {
        let mut toggles = Vec::new();
        if let Some(raw) = &options.ssh_root_login {
            if let Some(desired) = TriState::parse(raw, "--ssh-root-login")?.desired() {
                toggles.push((ROOT_LOGIN, desired));
            }
        }
        if let Some(raw) = &options.ssh_password_auth {
            if let Some(desired) = TriState::parse(raw, "--ssh-password-auth")?.desired() {
                toggles.push((PASSWORD_AUTH, desired));
            }
        }
        Ok(toggles)
    }

    /// Which rewrites the config text actually needs to reach the desired
    /// toggles. Only the exact literal target counts as converged: values
    /// like `prohibit-password` are not `no` and still get rewritten when
    /// the operator asked for the literal.
    fn plan(config: &str, toggles: &[(&'static str, bool)]) -> Vec<Change> {
        toggles
            .iter()
            .copied()
            .map(|(directive, desired)| Change {
                directive,
                target: if desired { "yes" } else { "no" },
            })
            .filter(|change| {
                effective_value(config, change.directive).value.as_deref() != Some(change.target)
            })
            .collect()
    }
}

impl Default for SecurityFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for SecurityFeature {
    fn name(&self) -> &'static str {
        "security"
    }

    fn description(&self) -> &'static str {
        "Harden SSH daemon configuration"
    }

    fn priority(&self) -> i32 {
        PRIORITY_SECURITY
    }

    fn should_activate(&self, options: &mut Options) -> bool {
        // Aggregate and deprecated flags expand into the tri-state flags
        // here, before activation is decided, so every later step sees one
        // canonical representation.
        if options.all {
            options.ssh_root_login.get_or_insert_with(|| "no".to_string());
            options
                .ssh_password_auth
                .get_or_insert_with(|| "no".to_string());
        }
        if options.ssh_no_root && options.ssh_root_login.is_none() {
            warn!("--ssh-no-root is deprecated, use --ssh-root-login no");
            options.ssh_root_login = Some("no".to_string());
        }
        if options.ssh_no_password && options.ssh_password_auth.is_none() {
            warn!("--ssh-no-password is deprecated, use --ssh-password-auth no");
            options.ssh_password_auth = Some("no".to_string());
        }

        options.ssh_root_login.is_some()
            || options.ssh_password_auth.is_some()
            || options.interactive
    }

    fn validate_options(&self, options: &Options) -> Result<()> {
        Self::desired_toggles(options).map(|_| ())
    }

    fn detect_state(&self, ctx: &mut ExecContext) -> Result<DetectedState> {
        let config = fs::read_to_string(&ctx.os.sshd_config)?;
        let mut state = DetectedState::new();

        let root_login = effective_value(&config, ROOT_LOGIN);
        state.set_text(
            "permit_root_login_value",
            root_login.value.as_deref().unwrap_or("unset"),
        );
        state.set_text("permit_root_login_source", root_login.source.to_string());
        state.set_flag("root_login_disabled", !root_login.enabled());

        let password_auth = effective_value(&config, PASSWORD_AUTH);
        state.set_text(
            "password_authentication_value",
            password_auth.value.as_deref().unwrap_or("unset"),
        );
        state.set_text(
            "password_authentication_source",
            password_auth.source.to_string(),
        );
        state.set_flag("password_auth_disabled", !password_auth.enabled());

        Ok(state)
    }

    fn display_state(&self, _ctx: &ExecContext, state: &DetectedState) {
        println!(
            "PermitRootLogin: {} ({})",
            state.text("permit_root_login_value").unwrap_or("?"),
            state.text("permit_root_login_source").unwrap_or("?"),
        );
        println!(
            "PasswordAuthentication: {} ({})",
            state.text("password_authentication_value").unwrap_or("?"),
            state.text("password_authentication_source").unwrap_or("?"),
        );
    }

    fn should_prompt(&self, ctx: &ExecContext, _state: &DetectedState) -> bool {
        ctx.options.ssh_root_login.is_none() || ctx.options.ssh_password_auth.is_none()
    }

    fn prompt_user(
        &self,
        ctx: &mut ExecContext,
        prompter: &mut dyn Prompter,
        state: &DetectedState,
    ) -> Result<()> {
        if ctx.options.ssh_root_login.is_none() {
            let enabled = state.flag("root_login_disabled") == Some(false);
            let toggle = prompter.state_toggle("Permit root SSH login", enabled)?;
            if let Some(desired) = toggle.desired() {
                ctx.options.ssh_root_login = Some(if desired { "yes" } else { "no" }.to_string());
            }
        }
        if ctx.options.ssh_password_auth.is_none() {
            let enabled = state.flag("password_auth_disabled") == Some(false);
            let toggle = prompter.state_toggle("Permit SSH password authentication", enabled)?;
            if let Some(desired) = toggle.desired() {
                ctx.options.ssh_password_auth =
                    Some(if desired { "yes" } else { "no" }.to_string());
            }
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecContext, _state: &DetectedState) -> Result<()> {
        let toggles = Self::desired_toggles(ctx.options)?;
        if toggles.is_empty() {
            info!("no hardening toggles requested");
            return Ok(());
        }

        let path = ctx.os.sshd_config.clone();
        let config = fs::read_to_string(&path)?;
        let changes = Self::plan(&config, &toggles);
        if changes.is_empty() {
            info!("SSH daemon already in the desired state");
            return Ok(());
        }

        if ctx.dry_run() {
            for change in &changes {
                info!(
                    directive = change.directive,
                    target = change.target,
                    "[dry-run] would set sshd directive"
                );
            }
            info!(service = ctx.os.sshd_service, "[dry-run] would restart SSH daemon");
            return Ok(());
        }

        if !osinfo::is_root() {
            return Err(IniqError::permission(format!(
                "rewriting {} requires root",
                path.display()
            )));
        }

        let backup = backup_before_rewrite(&path, ctx.options.backup)?;

        let mut text = config;
        for change in &changes {
            text = set_directive(&text, change.directive, change.target);
            info!(directive = change.directive, target = change.target, "set sshd directive");
        }
        fs::write(&path, &text)?;

        // Syntax-check the rewritten config; roll back rather than leave a
        // config the daemon will refuse to load.
        let check = ctx
            .runner
            .probe("sshd", &["-t", "-f", &path.display().to_string()])?;
        if !check.success {
            if let Some(backup) = &backup {
                fs::copy(backup, &path)?;
            }
            return Err(IniqError::system(format!(
                "sshd rejected the rewritten config, restored previous version: {}",
                check.stderr.trim()
            )));
        }

        let (program, args) = ctx.os.sshd_restart_command();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        ctx.runner
            .mutate(program, &args)?
            .ensure_success("SSH daemon restart")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyFetcher, PublicKey};
    use crate::osinfo::{DistroFamily, OsInfo};
    use crate::prompt::{ScriptedPrompter, ToggleDecision};
    use crate::runner::CommandRunner;
    use std::io::Write;

    struct NoFetch;
    impl KeyFetcher for NoFetch {
        fn fetch_keys(&self, _url: &str) -> Result<Vec<PublicKey>> {
            panic!("security feature must not fetch keys")
        }
    }

    fn os_with_config(config: &str) -> (OsInfo, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", config).unwrap();
        let mut os = OsInfo::for_family(DistroFamily::Debian, "test".into());
        os.sshd_config = file.path().to_path_buf();
        (os, file)
    }

    #[test]
    fn test_all_flag_expands_into_toggles() {
        let feature = SecurityFeature::new();
        let mut options = Options {
            all: true,
            ..Options::default()
        };
        assert!(feature.should_activate(&mut options));
        assert_eq!(options.ssh_root_login.as_deref(), Some("no"));
        assert_eq!(options.ssh_password_auth.as_deref(), Some("no"));
    }

    #[test]
    fn test_deprecated_aliases_expand() {
        let feature = SecurityFeature::new();
        let mut options = Options {
            ssh_no_root: true,
            ssh_no_password: true,
            ..Options::default()
        };
        assert!(feature.should_activate(&mut options));
        assert_eq!(options.ssh_root_login.as_deref(), Some("no"));
        assert_eq!(options.ssh_password_auth.as_deref(), Some("no"));
    }

    #[test]
    fn test_explicit_flag_wins_over_all() {
        let feature = SecurityFeature::new();
        let mut options = Options {
            all: true,
            ssh_root_login: Some("yes".into()),
            ..Options::default()
        };
        assert!(feature.should_activate(&mut options));
        assert_eq!(options.ssh_root_login.as_deref(), Some("yes"));
    }

    #[test]
    fn test_validate_rejects_invalid_token() {
        let feature = SecurityFeature::new();
        let options = Options {
            ssh_root_login: Some("invalid-value".into()),
            ..Options::default()
        };
        let err = feature.validate_options(&options).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid-value"));
        assert!(msg.contains("yes/enable/true/1/y/t/on"));
    }

    #[test]
    fn test_detect_reports_values_and_sources() {
        let feature = SecurityFeature::new();
        let (os, _file) =
            os_with_config("PermitRootLogin yes\n#PasswordAuthentication yes\nPort 22\n");
        let mut options = Options::default();
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ExecContext {
            options: &mut options,
            os: &os,
            runner: &runner,
            fetcher: &fetcher,
        };

        let state = feature.detect_state(&mut ctx).unwrap();
        assert_eq!(state.text("permit_root_login_value"), Some("yes"));
        assert_eq!(state.text("permit_root_login_source"), Some("explicit"));
        assert_eq!(state.flag("root_login_disabled"), Some(false));
        assert_eq!(
            state.text("password_authentication_source"),
            Some("commented")
        );
    }

    #[test]
    fn test_plan_skips_directives_already_at_target() {
        let config = "PermitRootLogin no\nPasswordAuthentication yes\n";
        let changes = SecurityFeature::plan(config, &[(ROOT_LOGIN, false), (PASSWORD_AUTH, false)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].directive, PASSWORD_AUTH);
        assert_eq!(changes[0].target, "no");
    }

    #[test]
    fn test_plan_rewrites_nonliteral_values() {
        // Stock OpenSSH ships PermitRootLogin prohibit-password; disabling
        // root login must still rewrite it to the literal no.
        let config = "PermitRootLogin prohibit-password\n";
        let changes = SecurityFeature::plan(config, &[(ROOT_LOGIN, false)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].directive, ROOT_LOGIN);
        assert_eq!(changes[0].target, "no");

        // And enabling it is not converged either.
        let changes = SecurityFeature::plan(config, &[(ROOT_LOGIN, true)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].target, "yes");
    }

    #[test]
    fn test_dry_run_leaves_config_untouched() {
        let feature = SecurityFeature::new();
        let original = "PermitRootLogin yes\nPasswordAuthentication yes\n";
        let (os, file) = os_with_config(original);
        let mut options = Options {
            ssh_root_login: Some("no".into()),
            dry_run: true,
            ..Options::default()
        };
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ExecContext {
            options: &mut options,
            os: &os,
            runner: &runner,
            fetcher: &fetcher,
        };
        let state = DetectedState::new();
        feature.execute(&mut ctx, &state).unwrap();
        assert_eq!(fs::read_to_string(file.path()).unwrap(), original);
    }

    #[test]
    fn test_prompt_sets_flags_from_toggles() {
        let feature = SecurityFeature::new();
        let (os, _file) = os_with_config("PermitRootLogin yes\nPasswordAuthentication yes\n");
        let mut options = Options {
            interactive: true,
            ..Options::default()
        };
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ExecContext {
            options: &mut options,
            os: &os,
            runner: &runner,
            fetcher: &fetcher,
        };
        let state = feature.detect_state(&mut ctx).unwrap();
        assert!(feature.should_prompt(&ctx, &state));

        let mut prompter = ScriptedPrompter::new()
            .with_toggles(&[ToggleDecision::Disable, ToggleDecision::Keep]);
        feature.prompt_user(&mut ctx, &mut prompter, &state).unwrap();
        assert_eq!(options.ssh_root_login.as_deref(), Some("no"));
        assert_eq!(options.ssh_password_auth, None);
    }
}
