//! SSH public key installation.
//!
//! Resolves every `--key` spec into key records (network sources go through
//! the injected [`crate::keys::KeyFetcher`]) and appends the ones not
//! already present to the target user's `authorized_keys`.

use tracing::info;

use crate::account::lookup_user;
use crate::error::{IniqError, Result};
use crate::feature::{DetectedState, ExecContext, Feature, PRIORITY_SSH_KEYS};
use crate::keys::{install_keys, installed_keys, resolve_key_specs, KeySpec};
use crate::options::Options;
use crate::osinfo;
use crate::prompt::Prompter;

pub struct SshKeysFeature;

impl SshKeysFeature {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SshKeysFeature {
    fn default() -> Self {
        Self::new()
    }
}

impl Feature for SshKeysFeature {
    fn name(&self) -> &'static str {
        "ssh-keys"
    }

    fn description(&self) -> &'static str {
        "Install SSH public keys"
    }

    fn priority(&self) -> i32 {
        PRIORITY_SSH_KEYS
    }

    fn should_activate(&self, options: &mut Options) -> bool {
        !options.keys.is_empty() || options.interactive
    }

    fn validate_options(&self, options: &Options) -> Result<()> {
        for raw in &options.keys {
            KeySpec::parse(raw)?;
        }
        Ok(())
    }

    fn detect_state(&self, ctx: &mut ExecContext) -> Result<DetectedState> {
        let mut state = DetectedState::new();
        state.set_text("keys_requested", ctx.options.keys.len().to_string());

        if let Some(user) = ctx.options.effective_user() {
            if let Some(entry) = lookup_user(ctx.runner, user)? {
                let installed = installed_keys(&entry.home);
                state.set_flag("authorized_keys_present", !installed.is_empty());
                state.set_text("keys_installed", installed.len().to_string());
                state.set_text("home", entry.home.display().to_string());
            } else {
                state.set_flag("authorized_keys_present", false);
            }
        }
        Ok(state)
    }

    fn display_state(&self, ctx: &ExecContext, state: &DetectedState) {
        let installed = state.text("keys_installed").unwrap_or("0");
        match ctx.options.effective_user() {
            Some(user) => println!("User '{}' has {} authorized key(s)", user, installed),
            None => println!("No target user for SSH keys yet"),
        }
    }

    fn should_prompt(&self, ctx: &ExecContext, _state: &DetectedState) -> bool {
        ctx.options.keys.is_empty()
    }

    fn prompt_user(
        &self,
        ctx: &mut ExecContext,
        prompter: &mut dyn Prompter,
        _state: &DetectedState,
    ) -> Result<()> {
        let name = prompter.input(
            "GitHub username to import SSH keys from (empty to skip)",
            Some(""),
        )?;
        if !name.is_empty() {
            ctx.options.keys.push(format!("github:{}", name));
        }
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecContext, _state: &DetectedState) -> Result<()> {
        if ctx.options.keys.is_empty() {
            info!("no key sources given, skipping key installation");
            return Ok(());
        }

        let user = ctx
            .options
            .effective_user()
            .ok_or_else(|| IniqError::validation("SSH key installation needs a target user"))?
            .to_string();

        if ctx.dry_run() {
            for raw in &ctx.options.keys {
                info!(user, source = raw.as_str(), "[dry-run] would install keys from source");
            }
            return Ok(());
        }

        let entry = lookup_user(ctx.runner, &user)?.ok_or_else(|| {
            IniqError::system(format!("user '{}' does not exist; cannot install keys", user))
        })?;

        let keys = resolve_key_specs(&ctx.options.keys, ctx.fetcher)?;

        // chown only makes sense (and only works) when running privileged;
        // an unprivileged run installing into its own home keeps ownership.
        let owner = if osinfo::is_root() {
            Some((
                nix::unistd::Uid::from_raw(entry.uid),
                nix::unistd::Gid::from_raw(entry.gid),
            ))
        } else {
            None
        };

        let added = install_keys(&entry.home, owner, &keys)?;
        info!(user, added, total = keys.len(), "key installation complete");
        Ok(())
    }
}
