//! Sudo access for the target user.
//!
//! Two mutations: a drop-in under `/etc/sudoers.d/` (written through the
//! validating [`crate::sudoers::SudoersWriter`]) and membership in the
//! distribution's admin group. Detection records whether the user is
//! already fully configured so interactive mode skips the re-confirmation.

use tracing::info;

use crate::account::{in_group, lookup_user};
use crate::error::{IniqError, Result};
use crate::feature::{DetectedState, ExecContext, Feature, PRIORITY_SUDO};
use crate::options::Options;
use crate::osinfo;
use crate::prompt::Prompter;
use crate::sudoers::{existing_entry, sudoers_entry, SudoersWriter};

pub struct SudoFeature;

impl SudoFeature {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SudoFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for SudoFeature {
    fn name(&self) -> &'static str {
        "sudo"
    }

    fn description(&self) -> &'static str {
        "Configure sudo access"
    }

    fn priority(&self) -> i32 {
        PRIORITY_SUDO
    }

    fn should_activate(&self, options: &mut Options) -> bool {
        !options.skip_sudo && (options.user.is_some() || options.interactive)
    }

    fn validate_options(&self, _options: &Options) -> Result<()> {
        // Username syntax is the user feature's concern; nothing else to
        // check here.
        Ok(())
    }

    fn detect_state(&self, ctx: &mut ExecContext) -> Result<DetectedState> {
        let mut state = DetectedState::new();
        let Some(user) = ctx.options.effective_user().map(str::to_string) else {
            state.set_flag("has_sudo", false);
            return Ok(state);
        };

        let fragment = existing_entry(ctx.os.sudoers_dir(), &user);
        let target = sudoers_entry(&user, ctx.options.sudo_nopasswd);
        let fragment_matches = fragment.as_deref() == Some(target.as_str());

        let member = if lookup_user(ctx.runner, &user)?.is_some() {
            in_group(ctx.runner, &user, ctx.os.admin_group)?
        } else {
            false
        };

        state.set_flag("has_sudo", fragment.is_some() || member);
        state.set_flag("in_admin_group", member);
        state.set_flag("sudoers_entry_present", fragment.is_some());

        let configured = fragment_matches && member;
        state.set_flag("sudo_already_configured", configured);
        ctx.options.derived.sudo_already_configured = Some(configured);
        Ok(state)
    }

    fn display_state(&self, ctx: &ExecContext, state: &DetectedState) {
        let user = ctx.options.effective_user().unwrap_or("?");
        if state.flag("sudo_already_configured") == Some(true) {
            println!("User '{}' already has sudo configured", user);
        } else if state.flag("has_sudo") == Some(true) {
            println!("User '{}' has partial sudo configuration", user);
        } else {
            println!("User '{}' has no sudo access", user);
        }
    }

    fn should_prompt(&self, ctx: &ExecContext, state: &DetectedState) -> bool {
        // A user who already has passwordless sudo has nothing to decide.
        state.flag("sudo_already_configured") != Some(true)
            && ctx.options.derived.sudo_already_configured != Some(true)
    }

    fn prompt_user(
        &self,
        ctx: &mut ExecContext,
        prompter: &mut dyn Prompter,
        _state: &DetectedState,
    ) -> Result<()> {
        let user = ctx.options.effective_user().unwrap_or("the user").to_string();
        if !prompter.confirm(&format!("Grant sudo access to '{}'?", user), true)? {
            ctx.options.skip_sudo = true;
            return Ok(());
        }
        ctx.options.sudo_nopasswd = prompter.confirm(
            "Allow sudo without password (NOPASSWD)?",
            ctx.options.sudo_nopasswd,
        )?;
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecContext, _state: &DetectedState) -> Result<()> {
        if ctx.options.skip_sudo {
            info!("sudo configuration skipped");
            return Ok(());
        }
        let user = ctx
            .options
            .effective_user()
            .ok_or_else(|| IniqError::validation("sudo configuration needs a target user"))?
            .to_string();

        if ctx.options.derived.sudo_already_configured == Some(true) {
            info!(user, "sudo already configured, nothing to do");
            return Ok(());
        }

        if !ctx.dry_run() && !osinfo::is_root() {
            return Err(IniqError::permission(format!(
                "writing /etc/sudoers.d/{} requires root",
                user
            )));
        }

        let writer = SudoersWriter::new(ctx.runner, ctx.os.sudoers_dir(), ctx.options.backup);
        writer.write_entry(&user, ctx.options.sudo_nopasswd)?;

        let needs_membership = if ctx.dry_run() {
            true
        } else {
            !in_group(ctx.runner, &user, ctx.os.admin_group)?
        };
        if needs_membership {
            ctx.runner
                .mutate("usermod", &["-aG", ctx.os.admin_group, &user])?
                .ensure_success("usermod -aG")?;
        } else {
            info!(user, group = ctx.os.admin_group, "already in admin group");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyFetcher, PublicKey};
    use crate::osinfo::{DistroFamily, OsInfo};
    use crate::prompt::ScriptedPrompter;
    use crate::runner::CommandRunner;

    struct NoFetch;
    impl KeyFetcher for NoFetch {
        fn fetch_keys(&self, _url: &str) -> Result<Vec<PublicKey>> {
            panic!("sudo feature must not fetch keys")
        }
    }

    #[test]
    fn test_activation_respects_skip_flag() {
        let feature = SudoFeature::new();
        let mut options = Options {
            user: Some("alice".into()),
            ..Options::default()
        };
        assert!(feature.should_activate(&mut options));

        options.skip_sudo = true;
        assert!(!feature.should_activate(&mut options));

        let mut options = Options::default();
        assert!(!feature.should_activate(&mut options));
    }

    #[test]
    fn test_detect_records_derived_flag() {
        let feature = SudoFeature::new();
        let mut options = Options {
            user: Some("iniq-no-such-user-xyz".into()),
            ..Options::default()
        };
        let os = OsInfo::for_family(DistroFamily::Debian, "test".into());
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ExecContext {
            options: &mut options,
            os: &os,
            runner: &runner,
            fetcher: &fetcher,
        };

        let state = feature.detect_state(&mut ctx).unwrap();
        assert_eq!(state.flag("sudo_already_configured"), Some(false));
        assert_eq!(options.derived.sudo_already_configured, Some(false));
    }

    #[test]
    fn test_prompt_decline_sets_skip() {
        let feature = SudoFeature::new();
        let mut options = Options {
            user: Some("alice".into()),
            ..Options::default()
        };
        let os = OsInfo::for_family(DistroFamily::Debian, "test".into());
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ExecContext {
            options: &mut options,
            os: &os,
            runner: &runner,
            fetcher: &fetcher,
        };
        let state = DetectedState::new();

        let mut prompter = ScriptedPrompter::new().with_confirms(&[false]);
        feature.prompt_user(&mut ctx, &mut prompter, &state).unwrap();
        assert!(options.skip_sudo);
    }

    #[test]
    fn test_execute_skips_when_already_configured() {
        let feature = SudoFeature::new();
        let mut options = Options {
            user: Some("alice".into()),
            ..Options::default()
        };
        options.derived.sudo_already_configured = Some(true);
        let os = OsInfo::for_family(DistroFamily::Debian, "test".into());
        // A live runner: execute must return before any mutation is attempted.
        let runner = CommandRunner::new(false);
        let fetcher = NoFetch;
        let mut ctx = ExecContext {
            options: &mut options,
            os: &os,
            runner: &runner,
            fetcher: &fetcher,
        };
        let state = DetectedState::new();
        feature.execute(&mut ctx, &state).unwrap();
    }

    #[test]
    fn test_dry_run_execute_is_pure() {
        let feature = SudoFeature::new();
        let mut options = Options {
            user: Some("root".into()),
            dry_run: true,
            ..Options::default()
        };
        let os = OsInfo::for_family(DistroFamily::Debian, "test".into());
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
        // Nothing written: /etc/sudoers.d/root would require root anyway,
        // and the dry-run writer never touches the filesystem.
    }
}
