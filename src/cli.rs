use clap::Parser;
use std::path::PathBuf;

use crate::options::Options;

/// iniq - declarative initialization for a freshly provisioned Linux host
#[derive(Parser, Debug)]
#[command(name = "iniq")]
#[command(about = "Set up a Linux host: user account, SSH keys, sudo access, SSH hardening")]
#[command(version)]
pub struct Cli {
    /// Username to create or configure
    #[arg(short, long)]
    pub user: Option<String>,

    /// SSH key source (github:NAME, gitlab:NAME, url:URL, file:PATH); repeatable
    #[arg(short = 'k', long = "key", value_name = "SPEC")]
    pub keys: Vec<String>,

    /// Desired PermitRootLogin state (yes/no and synonyms)
    #[arg(long, value_name = "STATE")]
    pub ssh_root_login: Option<String>,

    /// Desired PasswordAuthentication state (yes/no and synonyms)
    #[arg(long, value_name = "STATE")]
    pub ssh_password_auth: Option<String>,

    /// Deprecated: same as --ssh-root-login no
    #[arg(long)]
    pub ssh_no_root: bool,

    /// Deprecated: same as --ssh-password-auth no
    #[arg(long)]
    pub ssh_no_password: bool,

    /// Skip sudo configuration entirely
    #[arg(short = 's', long)]
    pub skip_sudo: bool,

    /// Grant sudo without password (NOPASSWD)
    #[arg(
        long,
        value_name = "BOOL",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub sudo_nopasswd: bool,

    /// Apply all SSH hardening options
    #[arg(short = 'a', long)]
    pub all: bool,

    /// Prompt for a login password for the created user
    #[arg(short = 'p', long)]
    pub password: bool,

    /// Create the user with a locked password (key-only login)
    #[arg(long = "no-pass")]
    pub no_password: bool,

    /// Take timestamped backups before rewriting config files
    #[arg(short = 'b', long)]
    pub backup: bool,

    /// Assume yes: never prompt, take defaults
    #[arg(short = 'y', long = "yes")]
    pub assume_yes: bool,

    /// Show what would change without mutating anything
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// JSON config file supplying defaults (CLI flags win)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Convert parsed flags into the run options. Conflicting flag pairs are
    /// deliberately not rejected here: feature validation reports them with
    /// proper error messages and exit-code semantics.
    pub fn into_options(self) -> Options {
        Options {
            user: self.user,
            keys: self.keys,
            ssh_root_login: self.ssh_root_login,
            ssh_password_auth: self.ssh_password_auth,
            ssh_no_root: self.ssh_no_root,
            ssh_no_password: self.ssh_no_password,
            sudo_nopasswd: self.sudo_nopasswd,
            skip_sudo: self.skip_sudo,
            all: self.all,
            password: self.password,
            no_password: self.no_password,
            backup: self.backup,
            assume_yes: self.assume_yes,
            dry_run: self.dry_run,
            ..Options::default()
        }
    }
}
