//! External command execution.
//!
//! All process invocation goes through [`CommandRunner`] so that dry-run
//! gating and logging happen in exactly one place. Probes (read-only
//! commands like `getent`) always run; mutations (`useradd`, `usermod`,
//! `systemctl restart`) are short-circuited to a logged no-op when dry-run
//! is active.

use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{IniqError, Result};

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Turn a non-zero exit into a system error carrying stderr.
    pub fn ensure_success(self, context: &str) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            let code = self.exit_code.unwrap_or(-1);
            Err(IniqError::system(format!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr.trim()
            )))
        }
    }

    /// Synthetic success used for dry-run mutations.
    fn skipped() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }
}

/// Executes external commands with dry-run awareness.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    dry_run: bool,
}

impl CommandRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run a read-only probe. Executes even in dry-run mode: detection must
    /// see the real host state.
    pub fn probe(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(command = %render(program, args), "probe");
        self.spawn_captured(program, args)
    }

    /// Run a mutating command. In dry-run mode, logs the command it would
    /// have run and reports success without spawning anything.
    pub fn mutate(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        if self.dry_run {
            info!(command = %render(program, args), "[dry-run] would execute");
            return Ok(CommandOutput::skipped());
        }
        info!(command = %render(program, args), "execute");
        self.spawn_captured(program, args)
    }

    /// Run a mutating command wired to the caller's terminal, for tools that
    /// prompt on the tty themselves (`passwd`).
    pub fn mutate_interactive(&self, program: &str, args: &[&str]) -> Result<()> {
        if self.dry_run {
            info!(command = %render(program, args), "[dry-run] would execute interactively");
            return Ok(());
        }
        info!(command = %render(program, args), "execute (interactive)");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| spawn_error(program, e))?;
        if status.success() {
            Ok(())
        } else {
            Err(IniqError::system(format!(
                "{} exited with status {}",
                program,
                status.code().unwrap_or(-1)
            )))
        }
    }

    fn spawn_captured(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| spawn_error(program, e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
        })
    }
}

fn spawn_error(program: &str, e: std::io::Error) -> IniqError {
    match e.kind() {
        std::io::ErrorKind::NotFound => {
            IniqError::system(format!("command not found: {}", program))
        }
        std::io::ErrorKind::PermissionDenied => {
            IniqError::permission(format!("not allowed to execute {}", program))
        }
        _ => IniqError::Io(e),
    }
}

fn render(program: &str, args: &[&str]) -> String {
    let mut line = String::from(program);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
