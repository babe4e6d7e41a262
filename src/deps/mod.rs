//! Dependency installation with bounded retries.

pub mod manager;
pub mod runner;

pub use manager::PackageManager;
pub use runner::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};

use crate::config::{DependenciesConfig, DependencyPolicy, PackageSpec};
use crate::error::{InstallerError, Result};
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub retries: u32,
    pub backoff: Duration,
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_config(config: &DependenciesConfig) -> Self {
        Self {
            retries: config.retries,
            backoff: Duration::from_millis(config.backoff_ms),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Delay before retry number `retry` (0-based), doubling up to a cap
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff
            .checked_mul(2u32.saturating_pow(retry))
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    Installed { attempts: u32 },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOutcome {
    pub name: String,
    pub required: bool,
    pub status: DependencyStatus,
}

impl DependencyOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self.status, DependencyStatus::Installed { .. })
    }
}

pub struct DependencyInstaller<'a> {
    runner: &'a dyn CommandRunner,
    manager: &'a PackageManager,
    retry: RetryPolicy,
    policy: DependencyPolicy,
}

impl<'a> DependencyInstaller<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        manager: &'a PackageManager,
        config: &DependenciesConfig,
    ) -> Self {
        Self {
            runner,
            manager,
            retry: RetryPolicy::from_config(config),
            policy: config.policy,
        }
    }

    /// Install every package, honouring the failure policy.
    ///
    /// Optional packages that fail are reported in the outcomes and never
    /// fail the run.
    pub fn install_all(&self, packages: &[PackageSpec]) -> Result<Vec<DependencyOutcome>> {
        self.ensure_ready()?;

        let mut outcomes = Vec::with_capacity(packages.len());
        let mut first_required_failure: Option<(String, String)> = None;

        for package in packages {
            println!("Installing {} with {}...", package.requirement(), self.manager);
            let spec = self
                .manager
                .install_command(package)
                .timeout(self.retry.timeout);

            let status = match self.run_with_retry(&spec) {
                Ok(attempts) => DependencyStatus::Installed { attempts },
                Err(reason) => {
                    if package.required {
                        tracing::error!("{} failed: {}", package.name, reason);
                    } else {
                        tracing::warn!("optional package {} failed: {}", package.name, reason);
                    }
                    DependencyStatus::Failed { reason }
                }
            };

            if let DependencyStatus::Failed { reason } = &status {
                if package.required {
                    if self.policy == DependencyPolicy::AbortOnRequired {
                        return Err(InstallerError::DependencyInstallFailed {
                            package: package.name.clone(),
                            reason: reason.clone(),
                        });
                    }
                    first_required_failure
                        .get_or_insert_with(|| (package.name.clone(), reason.clone()));
                }
            }

            outcomes.push(DependencyOutcome {
                name: package.name.clone(),
                required: package.required,
                status,
            });
        }

        if let Some((package, reason)) = first_required_failure {
            let failed = outcomes
                .iter()
                .filter(|o| o.required && !o.is_installed())
                .count();
            let reason = if failed > 1 {
                format!("{} (and {} more required packages)", reason, failed - 1)
            } else {
                reason
            };
            return Err(InstallerError::DependencyInstallFailed { package, reason });
        }

        Ok(outcomes)
    }

    /// Make sure pip is importable, bootstrapping it with ensurepip
    fn ensure_ready(&self) -> Result<()> {
        let (Some(check), Some(bootstrap)) = (self.manager.pip_check(), self.manager.pip_bootstrap())
        else {
            return Ok(());
        };

        if self.runner.run(&check)?.success {
            return Ok(());
        }

        println!("pip is missing, bootstrapping it with ensurepip...");
        self.run_with_retry(&bootstrap.timeout(self.retry.timeout))
            .map_err(|reason| InstallerError::DependencyInstallFailed {
                package: "pip".to_string(),
                reason,
            })?;
        Ok(())
    }

    /// Run `spec` until it succeeds or the retries are used up. Returns the
    /// number of attempts, or the last failure reason. A command that can't
    /// be started is not retried.
    fn run_with_retry(&self, spec: &CommandSpec) -> std::result::Result<u32, String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let output = self.runner.run(spec).map_err(|e| e.to_string())?;
            if output.success {
                return Ok(attempt);
            }

            let reason = output.failure_reason();
            if attempt > self.retry.retries {
                return Err(format!("{} (after {} attempts)", reason, attempt));
            }

            let delay = self.retry.delay(attempt - 1);
            tracing::warn!(
                "{} failed ({}), retrying in {:?}",
                spec.display(),
                reason,
                delay
            );
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Runner that fails a package a fixed number of times, then succeeds
    #[derive(Default)]
    pub struct ScriptedRunner {
        pub failures: HashMap<String, u32>,
        pub unstartable: bool,
        pub calls: RefCell<Vec<CommandSpec>>,
    }

    impl ScriptedRunner {
        pub fn failing(name: &str, times: u32) -> Self {
            let mut runner = Self::default();
            runner.failures.insert(name.to_string(), times);
            runner
        }

        pub fn commands(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.args.join(" ")).collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(spec.clone());
            if self.unstartable {
                return Err(InstallerError::CommandFailed("no such program".into()));
            }

            let key = spec.args.last().cloned().unwrap_or_default();
            let seen = self
                .calls
                .borrow()
                .iter()
                .filter(|c| c.args.last() == Some(&key))
                .count() as u32;
            let fail = self.failures.get(&key).is_some_and(|times| seen <= *times);

            Ok(CommandOutput {
                success: !fail,
                code: Some(if fail { 1 } else { 0 }),
                timed_out: false,
                stderr: if fail { "ERROR: scripted".into() } else { String::new() },
            })
        }
    }
}
