//! Interactive prompts.
//!
//! The orchestrator talks to the user through the [`Prompter`] trait so the
//! whole pipeline can run against a scripted prompter in tests. The stdin
//! implementation does plain blocking line reads; there is no terminal UI.

use std::io::{self, BufRead, Write};

use strum::{Display, EnumString};

use crate::error::{IniqError, Result};

/// User decision for a hardening toggle that already has a current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ToggleDecision {
    Enable,
    Disable,
    Keep,
}

/// A toggle decision resolved against the detected current state.
///
/// `Keep` always means no change; `Enable`/`Disable` mean a change only when
/// the desired state differs from what detection found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateToggle {
    pub decision: ToggleDecision,
    pub has_change: bool,
}

impl StateToggle {
    /// Combine a decision with the detected state.
    pub fn resolve(decision: ToggleDecision, currently_enabled: bool) -> Self {
        let has_change = match decision {
            ToggleDecision::Keep => false,
            ToggleDecision::Enable => !currently_enabled,
            ToggleDecision::Disable => currently_enabled,
        };
        Self {
            decision,
            has_change,
        }
    }

    /// The target state, if the decision asks for one.
    pub fn desired(&self) -> Option<bool> {
        match self.decision {
            ToggleDecision::Enable => Some(true),
            ToggleDecision::Disable => Some(false),
            ToggleDecision::Keep => None,
        }
    }
}

/// Interactive question surface used by features and the orchestrator.
pub trait Prompter {
    /// Yes/no question with a default answer for empty input.
    fn confirm(&mut self, message: &str, default: bool) -> Result<bool>;

    /// Free-text question; empty input returns the default when given.
    fn input(&mut self, message: &str, default: Option<&str>) -> Result<String>;

    /// Enable/disable/keep question for a toggle with a known current state.
    fn state_toggle(&mut self, message: &str, currently_enabled: bool) -> Result<StateToggle>;
}

/// Blocking stdin/stdout prompter used in a real terminal session.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    fn read_line(&self) -> Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

impl Prompter for StdinPrompter {
    fn confirm(&mut self, message: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            print!("{} {} ", message, hint);
            io::stdout().flush()?;
            let answer = self.read_line()?.to_ascii_lowercase();
            match answer.as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => println!("please answer y or n"),
            }
        }
    }

    fn input(&mut self, message: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) => print!("{} [{}]: ", message, d),
            None => print!("{}: ", message),
        }
        io::stdout().flush()?;
        let answer = self.read_line()?;
        if answer.is_empty() {
            Ok(default.unwrap_or("").to_string())
        } else {
            Ok(answer)
        }
    }

    fn state_toggle(&mut self, message: &str, currently_enabled: bool) -> Result<StateToggle> {
        let current = if currently_enabled { "enabled" } else { "disabled" };
        loop {
            print!("{} (currently {}) [e]nable/[d]isable/[K]eep: ", message, current);
            io::stdout().flush()?;
            let answer = self.read_line()?.to_ascii_lowercase();
            let decision = match answer.as_str() {
                "" | "k" | "keep" => ToggleDecision::Keep,
                "e" | "enable" => ToggleDecision::Enable,
                "d" | "disable" => ToggleDecision::Disable,
                _ => {
                    println!("please answer e, d, or k");
                    continue;
                }
            };
            return Ok(StateToggle::resolve(decision, currently_enabled));
        }
    }
}

/// Prompter that replays canned answers. Used by tests and by `--yes` paths
/// that must never block on stdin.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    confirms: Vec<bool>,
    inputs: Vec<String>,
    toggles: Vec<ToggleDecision>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confirms(mut self, answers: &[bool]) -> Self {
        self.confirms = answers.to_vec();
        self.confirms.reverse();
        self
    }

    pub fn with_inputs(mut self, answers: &[&str]) -> Self {
        self.inputs = answers.iter().map(|s| s.to_string()).collect();
        self.inputs.reverse();
        self
    }

    pub fn with_toggles(mut self, answers: &[ToggleDecision]) -> Self {
        self.toggles = answers.to_vec();
        self.toggles.reverse();
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, _message: &str, default: bool) -> Result<bool> {
        Ok(self.confirms.pop().unwrap_or(default))
    }

    fn input(&mut self, message: &str, default: Option<&str>) -> Result<String> {
        match self.inputs.pop().or_else(|| default.map(String::from)) {
            Some(answer) => Ok(answer),
            None => Err(IniqError::system(format!(
                "no scripted answer for prompt: {}",
                message
            ))),
        }
    }

    fn state_toggle(&mut self, _message: &str, currently_enabled: bool) -> Result<StateToggle> {
        let decision = self.toggles.pop().unwrap_or(ToggleDecision::Keep);
        Ok(StateToggle::resolve(decision, currently_enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_never_changes() {
        for current in [true, false] {
            let toggle = StateToggle::resolve(ToggleDecision::Keep, current);
            assert!(!toggle.has_change);
            assert_eq!(toggle.desired(), None);
        }
    }

    #[test]
    fn test_enable_changes_only_when_disabled() {
        let toggle = StateToggle::resolve(ToggleDecision::Enable, false);
        assert!(toggle.has_change);
        assert_eq!(toggle.desired(), Some(true));

        let toggle = StateToggle::resolve(ToggleDecision::Enable, true);
        assert!(!toggle.has_change);
    }

    #[test]
    fn test_disable_changes_only_when_enabled() {
        let toggle = StateToggle::resolve(ToggleDecision::Disable, true);
        assert!(toggle.has_change);
        assert_eq!(toggle.desired(), Some(false));

        let toggle = StateToggle::resolve(ToggleDecision::Disable, false);
        assert!(!toggle.has_change);
    }

    #[test]
    fn test_scripted_prompter_replays_in_order() {
        let mut p = ScriptedPrompter::new()
            .with_confirms(&[true, false])
            .with_inputs(&["alice"]);
        assert!(p.confirm("first?", false).unwrap());
        assert!(!p.confirm("second?", true).unwrap());
        // Exhausted confirms fall back to the default.
        assert!(p.confirm("third?", true).unwrap());
        assert_eq!(p.input("user", None).unwrap(), "alice");
        assert_eq!(p.input("user", Some("fallback")).unwrap(), "fallback");
    }
}
