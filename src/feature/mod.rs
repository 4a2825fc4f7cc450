//! The feature contract and registry.
//!
//! A [`Feature`] is one self-contained unit of host configuration (user
//! creation, key installation, sudo grant, SSH hardening). The orchestrator
//! drives each active feature through the same lifecycle: detect current
//! state, display it, optionally prompt, validate options, execute.
//!
//! Features are registered explicitly by the composition root via
//! [`Registry::with_default_features`]; there is no global registration and
//! no init-order dependency. Execution order is governed by [`Feature::priority`]
//! with a stable sort, so same-priority features keep registration order.

pub mod security;
pub mod ssh_keys;
pub mod sudo;
pub mod user;

use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;
use crate::keys::KeyFetcher;
use crate::options::Options;
use crate::osinfo::OsInfo;
use crate::prompt::Prompter;
use crate::runner::CommandRunner;

/// Priorities of the built-in features. Lower runs first; later stages
/// assume earlier stages' side effects (sudo assumes the user exists).
pub const PRIORITY_USER: i32 = 10;
pub const PRIORITY_SSH_KEYS: i32 = 20;
pub const PRIORITY_SUDO: i32 = 30;
pub const PRIORITY_SECURITY: i32 = 40;

/// One detected state entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
    Flag(bool),
    Text(String),
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Host state observed by one feature's detection step.
///
/// Computed fresh at the start of each feature's turn; never cached across
/// runs.
#[derive(Debug, Clone, Default)]
pub struct DetectedState {
    entries: BTreeMap<String, StateValue>,
}

impl DetectedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.entries.insert(key.to_string(), StateValue::Flag(value));
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .insert(key.to_string(), StateValue::Text(value.into()));
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.entries.get(key) {
            Some(StateValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.entries.get(key) {
            Some(StateValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a feature needs during one run.
///
/// The options bag inside is the single source of shared mutable truth: a
/// feature that resolves a derived value writes it back so later-priority
/// features observe the same decision.
pub struct ExecContext<'a> {
    pub options: &'a mut Options,
    pub os: &'a OsInfo,
    pub runner: &'a CommandRunner,
    pub fetcher: &'a dyn KeyFetcher,
}

impl ExecContext<'_> {
    pub fn dry_run(&self) -> bool {
        self.runner.dry_run()
    }

    pub fn interactive(&self) -> bool {
        self.options.interactive
    }
}

/// A unit of host configuration work.
pub trait Feature {
    /// Stable machine name (used in logs and outcome titles).
    fn name(&self) -> &'static str;

    /// Human-readable operation title.
    fn description(&self) -> &'static str;

    /// Execution priority; lower runs first, ties keep registration order.
    fn priority(&self) -> i32;

    /// Critical features abort the whole run on failure.
    fn is_critical(&self) -> bool {
        false
    }

    /// Whether this feature participates in the run. Pure, except for the
    /// documented aggregate-flag expansion (`--all` becomes the individual
    /// hardening flags) which happens here, before returning true.
    fn should_activate(&self, options: &mut Options) -> bool;

    /// Syntactic/semantic validation only; must not touch the filesystem.
    fn validate_options(&self, options: &Options) -> Result<()>;

    /// Probe of host state; never mutates the host. May fail (e.g., requires
    /// root) without that being a validation error. Detection may record
    /// derived values (like `sudo_already_configured`) in the options bag.
    fn detect_state(&self, ctx: &mut ExecContext) -> Result<DetectedState>;

    /// Present the detected state. Only called in interactive mode.
    fn display_state(&self, _ctx: &ExecContext, state: &DetectedState) {
        for (key, value) in state.iter() {
            println!("  {}: {}", key, value);
        }
    }

    /// Whether interactive mode has anything to ask given the detected
    /// state (e.g., skip re-confirming sudo for an already-configured user).
    fn should_prompt(&self, ctx: &ExecContext, state: &DetectedState) -> bool;

    /// Gather interactive decisions into the options bag. Only called when
    /// interactive and [`Self::should_prompt`] returned true.
    fn prompt_user(
        &self,
        _ctx: &mut ExecContext,
        _prompter: &mut dyn Prompter,
        _state: &DetectedState,
    ) -> Result<()> {
        Ok(())
    }

    /// Perform the mutation, or log the intended action when dry-run is
    /// active. Called at most once per run by the orchestrator (retries of
    /// a failed attempt excepted), and internally idempotent: state already
    /// at the target is left untouched.
    fn execute(&self, ctx: &mut ExecContext, state: &DetectedState) -> Result<()>;
}

/// Holds every known feature and answers "which ones run, in what order".
pub struct Registry {
    features: Vec<Box<dyn Feature>>,
}

impl Registry {
    /// An empty registry; features are added by the composition root.
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    /// The standard four features in registration order.
    pub fn with_default_features() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(user::UserFeature::new()));
        registry.register(Box::new(ssh_keys::SshKeysFeature::new()));
        registry.register(Box::new(sudo::SudoFeature::new()));
        registry.register(Box::new(security::SecurityFeature::new()));
        registry
    }

    pub fn register(&mut self, feature: Box<dyn Feature>) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features whose activation predicate matches, in registration order.
    pub fn active_features(&self, options: &mut Options) -> Vec<&dyn Feature> {
        self.features
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| f.should_activate(options))
            .collect()
    }

    /// Stable priority ordering: ties preserve the relative order the
    /// features already have (registration order).
    pub fn sort_by_priority(features: &mut [&dyn Feature]) {
        features.sort_by_key(|f| f.priority());
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_default_features()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        name: &'static str,
        priority: i32,
        active: bool,
    }

    impl Feature for Dummy {
        fn name(&self) -> &'static str {
            self.name
        }
        fn description(&self) -> &'static str {
            "dummy"
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn should_activate(&self, _options: &mut Options) -> bool {
            self.active
        }
        fn validate_options(&self, _options: &Options) -> Result<()> {
            Ok(())
        }
        fn detect_state(&self, _ctx: &mut ExecContext) -> Result<DetectedState> {
            Ok(DetectedState::new())
        }
        fn should_prompt(&self, _ctx: &ExecContext, _state: &DetectedState) -> bool {
            false
        }
        fn execute(&self, _ctx: &mut ExecContext, _state: &DetectedState) -> Result<()> {
            Ok(())
        }
    }

    fn dummy(name: &'static str, priority: i32, active: bool) -> Box<dyn Feature> {
        Box::new(Dummy {
            name,
            priority,
            active,
        })
    }

    #[test]
    fn test_active_features_keep_registration_order() {
        let mut registry = Registry::new();
        registry.register(dummy("b", 20, true));
        registry.register(dummy("a", 10, false));
        registry.register(dummy("c", 30, true));

        let mut options = Options::default();
        let active = registry.active_features(&mut options);
        let names: Vec<&str> = active.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_priority_sort_is_stable() {
        let mut registry = Registry::new();
        registry.register(dummy("second-registered", 10, true));
        registry.register(dummy("third-registered", 10, true));
        registry.register(dummy("first", 5, true));
        registry.register(dummy("last", 99, true));

        let mut options = Options::default();
        let mut active = registry.active_features(&mut options);
        Registry::sort_by_priority(&mut active);
        let names: Vec<&str> = active.iter().map(|f| f.name()).collect();
        assert_eq!(
            names,
            vec!["first", "second-registered", "third-registered", "last"]
        );
    }

    #[test]
    fn test_default_registry_priorities() {
        let registry = Registry::with_default_features();
        assert_eq!(registry.len(), 4);

        let mut options = Options {
            user: Some("alice".into()),
            keys: vec!["github:alice".into()],
            all: true,
            ..Options::default()
        };
        let mut active = registry.active_features(&mut options);
        Registry::sort_by_priority(&mut active);
        let names: Vec<&str> = active.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["user", "ssh-keys", "sudo", "security"]);

        let priorities: Vec<i32> = active.iter().map(|f| f.priority()).collect();
        assert_eq!(
            priorities,
            vec![
                PRIORITY_USER,
                PRIORITY_SSH_KEYS,
                PRIORITY_SUDO,
                PRIORITY_SECURITY
            ]
        );
    }

    #[test]
    fn test_detected_state_accessors() {
        let mut state = DetectedState::new();
        state.set_flag("user_exists", true);
        state.set_text("permit_root_login_value", "yes");

        assert_eq!(state.flag("user_exists"), Some(true));
        assert_eq!(state.text("permit_root_login_value"), Some("yes"));
        assert_eq!(state.flag("permit_root_login_value"), None);
        assert_eq!(state.flag("missing"), None);
        assert!(!state.is_empty());
    }
}
