//! Experiment driver
//!
//! Runs every (scheme, run id) pair one after another. A failed pair is
//! reported and skipped; only a source-control mismatch between the two
//! hosts stops the whole experiment.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{process_error, process_info, process_warn, Mode, ProcessId};
use std::path::PathBuf;

use crate::config::RunConfig;
use crate::context::ExperimentContext;
use crate::core::RunMetadata;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::scheme::SchemeRegistry;
use crate::scheme_test::{RunReport, SchemeTest, Timing};
use crate::services::remote;
use crate::traits::Scheme;

/// Outcome of every run of an experiment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentReport {
    pub runs: Vec<RunReport>,
}

impl ExperimentReport {
    pub fn failures(&self) -> impl Iterator<Item = &RunReport> {
        self.runs.iter().filter(|run| !run.succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct Experiment {
    ctx: ExperimentContext,
    config: RunConfig,
    registry: SchemeRegistry,
    schemes: Vec<String>,
    timing: Timing,
}

impl Experiment {
    pub fn new(
        ctx: ExperimentContext,
        config: RunConfig,
        registry: SchemeRegistry,
        schemes: Vec<String>,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        if schemes.is_empty() && config.test_config.is_none() {
            return Err(OrchestratorError::config("no schemes to test"));
        }
        if config.mode == Mode::Remote && ctx.remote.is_none() {
            return Err(OrchestratorError::config("remote mode needs a remote host"));
        }

        Ok(Self {
            ctx,
            config,
            registry,
            schemes,
            timing: Timing::default(),
        })
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Schemes in the order they will run
    pub fn schemes(&self) -> &[String] {
        &self.schemes
    }

    pub fn context(&self) -> &ExperimentContext {
        &self.ctx
    }

    /// Shuffle the scheme order when random order was requested
    pub fn shuffle_schemes<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.config.random_order {
            self.schemes.shuffle(rng);
        }
    }

    /// Scheme list recorded in the metadata
    fn recorded_schemes(&self) -> Vec<String> {
        match &self.config.test_config {
            Some(test_config) => test_config.schemes(),
            None => self.schemes.clone(),
        }
    }

    /// Create directories, compare revisions across hosts and write metadata
    pub async fn prepare(&self) -> OrchestratorResult<PathBuf> {
        self.ctx.ensure_dirs().await?;

        let git_summary = remote::git_summary(&self.ctx.base_dir).await?;
        if let Some(host) = self.ctx.remote.as_ref().filter(|_| self.config.mode == Mode::Remote) {
            remote::prepare_remote_tmp(host).await?;
            let remote_summary = remote::remote_git_summary(host).await?;
            remote::ensure_same_revision(&git_summary, &remote_summary)?;
        }

        let metadata = RunMetadata::from_config(&self.config, &self.recorded_schemes(), git_summary);
        let path = metadata.write(&self.ctx.data_dir).await?;
        process_info!(ProcessId::current(), "Wrote run metadata to {}", path.display());
        Ok(path)
    }

    /// Run every (scheme, run id) pair
    pub async fn run(&mut self) -> OrchestratorResult<ExperimentReport> {
        self.shuffle_schemes(&mut rand::thread_rng());
        self.prepare().await?;

        let mut report = ExperimentReport::default();
        for run_id in self.config.run_ids() {
            match &self.config.test_config {
                Some(test_config) => {
                    let test = SchemeTest::new(&self.ctx, &self.config, &self.registry, &test_config.test_name, run_id)
                        .with_timing(self.timing);
                    report.runs.push(test.run().await);
                }
                None => {
                    for scheme in &self.schemes {
                        let test = SchemeTest::new(&self.ctx, &self.config, &self.registry, scheme, run_id)
                            .with_timing(self.timing);
                        report.runs.push(test.run().await);
                    }
                }
            }
        }

        for failure in report.failures() {
            process_warn!(
                ProcessId::current(),
                "Run {} of {} failed",
                failure.run_id,
                failure.name
            );
        }
        Ok(report)
    }
}

/// Print each scheme's dependencies and run its setup
pub async fn setup_schemes(registry: &SchemeRegistry, schemes: &[String]) -> OrchestratorResult<()> {
    for name in schemes {
        let scheme = registry.resolve(name)?;

        let deps = scheme.deps().await?;
        process_info!(ProcessId::current(), "{} dependencies: {}", name, deps.join(" "));

        if let Err(e) = scheme.setup().await {
            process_error!(ProcessId::current(), "Setup of {} failed: {}", name, e);
            return Err(e);
        }
        process_info!(ProcessId::current(), "Setup of {} done", name);
    }
    Ok(())
}
