//! User account creation.
//!
//! The first and only critical feature: every later stage (keys, sudo)
//! assumes the target account exists, so a failure here aborts the run.

use tracing::info;

use crate::account::lookup_user;
use crate::error::{IniqError, Result};
use crate::feature::{DetectedState, ExecContext, Feature, PRIORITY_USER};
use crate::options::{validate_username, Options};
use crate::osinfo;
use crate::prompt::Prompter;

/// Shell assigned to newly created accounts.
const DEFAULT_SHELL: &str = "/bin/bash";

pub struct UserFeature;

impl UserFeature {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UserFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for UserFeature {
    fn name(&self) -> &'static str {
        "user"
    }

    fn description(&self) -> &'static str {
        "Create user account"
    }

    fn priority(&self) -> i32 {
        PRIORITY_USER
    }

    fn is_critical(&self) -> bool {
        true
    }

    fn should_activate(&self, options: &mut Options) -> bool {
        options.user.is_some() || options.interactive
    }

    fn validate_options(&self, options: &Options) -> Result<()> {
        if options.password && options.no_password {
            return Err(IniqError::validation(
                "cannot specify both --password and --no-pass options",
            ));
        }
        if let Some(user) = options.effective_user() {
            validate_username(user)?;
        } else if !options.interactive {
            return Err(IniqError::validation("no username given (use --user)"));
        }
        Ok(())
    }

    fn detect_state(&self, ctx: &mut ExecContext) -> Result<DetectedState> {
        let mut state = DetectedState::new();
        match ctx.options.effective_user() {
            Some(user) => {
                state.set_text("username", user);
                match lookup_user(ctx.runner, user)? {
                    Some(entry) => {
                        state.set_flag("user_exists", true);
                        state.set_text("home", entry.home.display().to_string());
                        state.set_text("shell", entry.shell);
                    }
                    None => state.set_flag("user_exists", false),
                }
            }
            None => state.set_flag("username_resolved", false),
        }
        Ok(state)
    }

    fn display_state(&self, _ctx: &ExecContext, state: &DetectedState) {
        match state.text("username") {
            Some(user) if state.flag("user_exists") == Some(true) => {
                println!(
                    "User '{}' already exists (home: {})",
                    user,
                    state.text("home").unwrap_or("?")
                );
            }
            Some(user) => println!("User '{}' does not exist yet", user),
            None => println!("No target user chosen yet"),
        }
    }

    fn should_prompt(&self, ctx: &ExecContext, state: &DetectedState) -> bool {
        // Nothing to ask when the named account is already present.
        ctx.options.effective_user().is_none() || state.flag("user_exists") != Some(true)
    }

    fn prompt_user(
        &self,
        ctx: &mut ExecContext,
        prompter: &mut dyn Prompter,
        state: &DetectedState,
    ) -> Result<()> {
        if ctx.options.effective_user().is_none() {
            let name = prompter.input("Username to configure", None)?;
            ctx.options.user = Some(name);
        }
        // Password policy only matters for accounts we are about to create.
        if state.flag("user_exists") != Some(true)
            && !ctx.options.password
            && !ctx.options.no_password
        {
            if prompter.confirm("Set a login password for the new user?", false)? {
                ctx.options.password = true;
            } else {
                ctx.options.no_password = true;
            }
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecContext, _state: &DetectedState) -> Result<()> {
        let user = ctx
            .options
            .effective_user()
            .ok_or_else(|| IniqError::validation("no username given (use --user)"))?
            .to_string();

        // Re-probe instead of trusting pre-prompt state: the username may
        // have been chosen interactively, and a retried attempt must see
        // what a partially failed earlier attempt left behind.
        let existing = lookup_user(ctx.runner, &user)?;
        if let Some(entry) = existing {
            info!(user, home = %entry.home.display(), "user already exists, skipping creation");
            ctx.options.derived.username = Some(user);
            return Ok(());
        }

        if !ctx.dry_run() && !osinfo::is_root() {
            return Err(IniqError::permission(format!(
                "creating user '{}' requires root",
                user
            )));
        }

        ctx.runner
            .mutate("useradd", &["-m", "-s", DEFAULT_SHELL, &user])?
            .ensure_success("useradd")?;

        if ctx.options.password {
            // passwd prompts on the controlling terminal itself.
            ctx.runner.mutate_interactive("passwd", &[&user])?;
        } else {
            if !ctx.options.no_password && !ctx.options.interactive {
                info!(user, "no password policy given, leaving account locked (key-only login)");
            }
            ctx.runner
                .mutate("passwd", &["-l", &user])?
                .ensure_success("passwd -l")?;
        }

        ctx.options.derived.username = Some(user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyFetcher, PublicKey};
    use crate::osinfo::{DistroFamily, OsInfo};
    use crate::runner::CommandRunner;

    struct NoFetch;
    impl KeyFetcher for NoFetch {
        fn fetch_keys(&self, _url: &str) -> crate::error::Result<Vec<PublicKey>> {
            panic!("user feature must not fetch keys")
        }
    }

    fn ctx<'a>(
        options: &'a mut Options,
        os: &'a OsInfo,
        runner: &'a CommandRunner,
        fetcher: &'a NoFetch,
    ) -> ExecContext<'a> {
        ExecContext {
            options,
            os,
            runner,
            fetcher,
        }
    }

    #[test]
    fn test_activation() {
        let feature = UserFeature::new();
        let mut options = Options::default();
        assert!(!feature.should_activate(&mut options));

        options.user = Some("alice".into());
        assert!(feature.should_activate(&mut options));

        let mut options = Options {
            interactive: true,
            ..Options::default()
        };
        assert!(feature.should_activate(&mut options));
    }

    #[test]
    fn test_conflicting_password_flags() {
        let feature = UserFeature::new();
        let options = Options {
            user: Some("alice".into()),
            password: true,
            no_password: true,
            ..Options::default()
        };
        let err = feature.validate_options(&options).unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot specify both --password and --no-pass options"));
        assert!(matches!(err, IniqError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_bad_username() {
        let feature = UserFeature::new();
        let options = Options {
            user: Some("Not Valid".into()),
            ..Options::default()
        };
        assert!(feature.validate_options(&options).is_err());
    }

    #[test]
    fn test_validate_requires_user_when_not_interactive() {
        let feature = UserFeature::new();
        let options = Options::default();
        let err = feature.validate_options(&options).unwrap_err();
        assert!(err.to_string().contains("no username"));
    }

    #[test]
    fn test_detect_existing_root() {
        let feature = UserFeature::new();
        let mut options = Options {
            user: Some("root".into()),
            ..Options::default()
        };
        let os = OsInfo::for_family(DistroFamily::Debian, "test".into());
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ctx(&mut options, &os, &runner, &fetcher);

        let state = feature.detect_state(&mut ctx).unwrap();
        assert_eq!(state.flag("user_exists"), Some(true));
        assert!(state.text("home").is_some());
        assert!(!feature.should_prompt(&ctx, &state));
    }

    #[test]
    fn test_execute_skips_existing_user_and_derives_username() {
        let feature = UserFeature::new();
        let mut options = Options {
            user: Some("root".into()),
            ..Options::default()
        };
        let os = OsInfo::for_family(DistroFamily::Debian, "test".into());
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ctx(&mut options, &os, &runner, &fetcher);

        let state = feature.detect_state(&mut ctx).unwrap();
        feature.execute(&mut ctx, &state).unwrap();
        assert_eq!(options.derived.username.as_deref(), Some("root"));
    }

    #[test]
    fn test_dry_run_creates_nothing() {
        let feature = UserFeature::new();
        let mut options = Options {
            user: Some("iniq-dry-run-bob".into()),
            no_password: true,
            dry_run: true,
            ..Options::default()
        };
        let os = OsInfo::for_family(DistroFamily::Debian, "test".into());
        let runner = CommandRunner::new(true);
        let fetcher = NoFetch;
        let mut ctx = ctx(&mut options, &os, &runner, &fetcher);

        let state = feature.detect_state(&mut ctx).unwrap();
        assert_eq!(state.flag("user_exists"), Some(false));
        feature.execute(&mut ctx, &state).unwrap();

        // Still absent: the mutation was logged, not performed.
        let runner = CommandRunner::new(false);
        assert!(lookup_user(&runner, "iniq-dry-run-bob").unwrap().is_none());
    }
}
