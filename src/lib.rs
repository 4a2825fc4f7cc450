//! iniq library
//!
//! Declarative initialization for a freshly provisioned Linux host: create a
//! user account, install SSH public keys, grant sudo access, and harden the
//! SSH daemon configuration. Every mutation is idempotent, so re-running
//! against an already configured host is a no-op.

pub mod account;
pub mod backup;
pub mod cli;
pub mod directive;
pub mod error;
pub mod feature;
pub mod keys;
pub mod options;
pub mod orchestrator;
pub mod osinfo;
pub mod prompt;
pub mod runner;
pub mod sudoers;

// Re-export main types for convenience
pub use error::{IniqError, Result, RetryClass};
pub use feature::{DetectedState, ExecContext, Feature, Registry};
pub use keys::{HttpKeyFetcher, KeyFetcher, KeySpec, PublicKey};
pub use options::{Derived, Options, TriState};
pub use orchestrator::{AbortReason, Backoff, Orchestrator, RunReport};
pub use osinfo::{DistroFamily, OsInfo};
pub use prompt::{Prompter, ScriptedPrompter, StateToggle, StdinPrompter, ToggleDecision};
pub use runner::{CommandOutput, CommandRunner};
