//! Top-level execution pipeline.
//!
//! Drives every active feature, in priority order, through the lifecycle:
//! detect current state, display and prompt when interactive, validate,
//! execute with a bounded retry loop. Retry policy is decided here and only
//! here, from [`crate::error::IniqError::retry_class`]; features never sleep
//! or retry themselves.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{Result, RetryClass};
use crate::feature::{DetectedState, ExecContext, Feature, Registry};
use crate::keys::KeyFetcher;
use crate::options::Options;
use crate::osinfo::{self, OsInfo};
use crate::prompt::Prompter;
use crate::runner::CommandRunner;

/// Attempt budget for one feature's execute step.
pub const MAX_ATTEMPTS: u32 = 3;

/// Sleep durations between retry attempts. Injectable so pipeline tests run
/// without wall-clock delays.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// After a transient (network-shaped) failure.
    pub transient: Duration,
    /// After any other retryable failure.
    pub other: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            transient: Duration::from_secs(2),
            other: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Zero sleeps, for tests.
    pub fn none() -> Self {
        Self {
            transient: Duration::ZERO,
            other: Duration::ZERO,
        }
    }
}

/// Why a run stopped before completing every active feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A critical feature failed validation; later features assume its
    /// side effects and must not run.
    CriticalValidation(String),
    /// A critical feature failed execution.
    CriticalExecution(String),
    /// The admin group membership needs a login cycle before it becomes
    /// effective; the user must log out, back in, and re-run.
    GroupMembershipPending(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CriticalValidation(msg) => write!(f, "critical validation failure: {}", msg),
            Self::CriticalExecution(msg) => write!(f, "critical operation failed: {}", msg),
            Self::GroupMembershipPending(msg) => write!(f, "{}", msg),
        }
    }
}

/// End-of-run record: one (operation title, success) pair per feature that
/// got a turn, plus the abort reason if the run stopped early.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<(String, bool)>,
    pub abort: Option<AbortReason>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.abort.is_none() && self.outcomes.iter().all(|(_, ok)| *ok)
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    /// Human-readable end-of-run summary.
    pub fn summary(&self) -> String {
        let mut out = String::from("Run summary:\n");
        for (title, ok) in &self.outcomes {
            out.push_str(&format!("  {} {}\n", if *ok { "✓" } else { "✗" }, title));
        }
        if self.outcomes.is_empty() {
            out.push_str("  nothing to do\n");
        }
        if let Some(abort) = &self.abort {
            out.push_str(&format!("Aborted: {}\n", abort));
        }
        out
    }
}

/// Outcome of one feature's full lifecycle.
enum StepOutcome {
    Done,
    Failed(String),
    Abort(AbortReason),
}

/// Result of the interactive permission remediation offer.
enum Remediation {
    /// Membership is active in this session; retry the operation in place.
    Effective,
    /// The user declined; the operation is recorded as failed.
    Declined,
    /// Membership granted but not active until a login cycle.
    Pending(String),
}

pub struct Orchestrator<'a> {
    os: &'a OsInfo,
    runner: &'a CommandRunner,
    fetcher: &'a dyn KeyFetcher,
    backoff: Backoff,
    is_root: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(os: &'a OsInfo, runner: &'a CommandRunner, fetcher: &'a dyn KeyFetcher) -> Self {
        Self {
            os,
            runner,
            fetcher,
            backoff: Backoff::default(),
            is_root: osinfo::is_root(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run every active feature in priority order and collect outcomes.
    pub fn run(
        &self,
        registry: &Registry,
        options: &mut Options,
        prompter: &mut dyn Prompter,
    ) -> RunReport {
        let mut report = RunReport::default();

        let mut active = registry.active_features(options);
        Registry::sort_by_priority(&mut active);
        if active.is_empty() {
            info!("no features active, nothing to do");
            return report;
        }

        for feature in active {
            info!(feature = feature.name(), "=== {} ===", feature.description());
            let mut ctx = ExecContext {
                options: &mut *options,
                os: self.os,
                runner: self.runner,
                fetcher: self.fetcher,
            };
            match self.run_feature(feature, &mut ctx, prompter) {
                StepOutcome::Done => {
                    report.outcomes.push((feature.description().to_string(), true));
                }
                StepOutcome::Failed(msg) => {
                    error!(feature = feature.name(), "{}", msg);
                    report.outcomes.push((feature.description().to_string(), false));
                    if feature.is_critical() {
                        report.abort = Some(AbortReason::CriticalExecution(msg));
                        break;
                    }
                }
                StepOutcome::Abort(reason) => {
                    error!(feature = feature.name(), "{}", reason);
                    report.outcomes.push((feature.description().to_string(), false));
                    report.abort = Some(reason);
                    break;
                }
            }
        }
        report
    }

    fn run_feature(
        &self,
        feature: &dyn Feature,
        ctx: &mut ExecContext,
        prompter: &mut dyn Prompter,
    ) -> StepOutcome {
        // Detection is a best-effort probe; a feature whose detection fails
        // (unreadable config, missing tool) still gets its execute turn and
        // reports the real error from there.
        let state = match feature.detect_state(ctx) {
            Ok(state) => state,
            Err(e) => {
                warn!(feature = feature.name(), error = %e, "state detection failed");
                DetectedState::new()
            }
        };

        if ctx.interactive() {
            feature.display_state(ctx, &state);
            if feature.should_prompt(ctx, &state) {
                if let Err(e) = feature.prompt_user(ctx, prompter, &state) {
                    return StepOutcome::Failed(format!("prompt failed: {}", e));
                }
            }
        }

        if let Err(e) = feature.validate_options(ctx.options) {
            let msg = e.to_string();
            if feature.is_critical() {
                return StepOutcome::Abort(AbortReason::CriticalValidation(msg));
            }
            return StepOutcome::Failed(msg);
        }

        self.execute_with_retry(feature, ctx, prompter, &state)
    }

    fn execute_with_retry(
        &self,
        feature: &dyn Feature,
        ctx: &mut ExecContext,
        prompter: &mut dyn Prompter,
        state: &DetectedState,
    ) -> StepOutcome {
        let mut attempt = 1u32;
        // Remediation is offered at most once per feature; a second
        // permission failure after joining the group means the retried
        // operation needs more than membership and must not loop.
        let mut remediated = false;
        loop {
            let err = match feature.execute(ctx, state) {
                Ok(()) => return StepOutcome::Done,
                Err(err) => err,
            };

            match err.retry_class() {
                RetryClass::Fatal => return StepOutcome::Failed(err.to_string()),
                RetryClass::AbortRun => {
                    return StepOutcome::Abort(AbortReason::GroupMembershipPending(
                        err.to_string(),
                    ));
                }
                RetryClass::Permission => {
                    if ctx.interactive() && !self.is_root && !remediated {
                        match self.remediate_permission(ctx, prompter) {
                            // Retrying in place does not consume an attempt.
                            Ok(Remediation::Effective) => {
                                remediated = true;
                                continue;
                            }
                            Ok(Remediation::Declined) => {
                                return StepOutcome::Failed(err.to_string())
                            }
                            Ok(Remediation::Pending(msg)) => {
                                return StepOutcome::Abort(AbortReason::GroupMembershipPending(
                                    msg,
                                ));
                            }
                            Err(e) => {
                                return StepOutcome::Failed(format!(
                                    "permission remediation failed: {}",
                                    e
                                ));
                            }
                        }
                    }
                    return StepOutcome::Failed(err.to_string());
                }
                RetryClass::Transient => {
                    if attempt >= MAX_ATTEMPTS {
                        return StepOutcome::Failed(format!(
                            "failed after {} attempts: {}",
                            MAX_ATTEMPTS, err
                        ));
                    }
                    warn!(feature = feature.name(), attempt, error = %err, "transient failure, retrying");
                    thread::sleep(self.backoff.transient);
                    attempt += 1;
                }
                RetryClass::Retryable => {
                    if attempt >= MAX_ATTEMPTS {
                        return StepOutcome::Failed(format!(
                            "failed after {} attempts: {}",
                            MAX_ATTEMPTS, err
                        ));
                    }
                    warn!(feature = feature.name(), attempt, error = %err, "failure, retrying");
                    thread::sleep(self.backoff.other);
                    attempt += 1;
                }
            }
        }
    }

    /// Offer the interactive user a path out of a permission failure: join
    /// the admin group and retry. Membership granted by `usermod` is only
    /// usable once the session's group token includes it, so the current
    /// session is probed with `id -nG` before retrying.
    fn remediate_permission(
        &self,
        ctx: &mut ExecContext,
        prompter: &mut dyn Prompter,
    ) -> Result<Remediation> {
        let group = ctx.os.admin_group;
        let Some(user) = osinfo::current_username() else {
            return Ok(Remediation::Declined);
        };

        let question = format!(
            "This step needs admin rights. Add '{}' to the '{}' group and retry?",
            user, group
        );
        if !prompter.confirm(&question, true)? {
            return Ok(Remediation::Declined);
        }

        ctx.runner
            .mutate("sudo", &["usermod", "-aG", group, &user])?
            .ensure_success("usermod -aG")?;

        let session = ctx
            .runner
            .probe("id", &["-nG"])?
            .ensure_success("id -nG")?;
        if session.stdout.split_whitespace().any(|g| g == group) {
            info!(user, group, "group membership active, retrying");
            Ok(Remediation::Effective)
        } else {
            Ok(Remediation::Pending(format!(
                "'{}' was added to the '{}' group, but the membership is not active in this \
                 session; log out, log back in, and re-run iniq",
                user, group
            )))
        }
    }
}
