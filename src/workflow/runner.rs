// SPDX-License-Identifier: MIT

//! Level-by-level workflow execution
//!
//! The runner walks the workflow's levels in order. Within a level every
//! job that has not reached a terminal state is checked against its run
//! conditions, its arguments are resolved from the run, and the ready jobs
//! are dispatched either concurrently on a `JoinSet` or one after another.
//! Responses are recorded once the whole level has finished, so a level
//! never observes the output of a peer.

use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::config::{ExecutionMode, RunnerConfig};
use super::definition::Workflow;
use super::job::Job;
use super::state::Run;
use crate::action::{Action, Arguments, Response};
use crate::error::{FlowError, RunError};

/// A job whose conditions passed and whose arguments are resolved
struct ReadyJob {
    name: String,
    action: Arc<dyn Action>,
    arguments: Arguments,
}

/// Executes runs of one workflow
#[derive(Debug, Clone)]
pub struct Runner {
    workflow: Arc<Workflow>,
    config: RunnerConfig,
}

impl Runner {
    /// Runner with the default (parallel) configuration
    pub fn new(workflow: Arc<Workflow>) -> Self {
        Self::with_config(workflow, RunnerConfig::default())
    }

    pub fn with_config(workflow: Arc<Workflow>, config: RunnerConfig) -> Self {
        Self { workflow, config }
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Bind `inputs` and execute a fresh run
    pub async fn run<I, K>(&self, inputs: I) -> Result<Run, FlowError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.run_with_cancellation(inputs, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancellation<I, K>(
        &self,
        inputs: I,
        cancel: CancellationToken,
    ) -> Result<Run, FlowError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let run = self.workflow.bind(inputs)?;
        self.execute_with_cancellation(run, cancel).await
    }

    /// Drive an existing run to completion.
    ///
    /// Jobs the run already holds a response or skip for are left alone.
    pub async fn execute(&self, run: Run) -> Result<Run, FlowError> {
        self.execute_with_cancellation(run, CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancellation(
        &self,
        mut run: Run,
        cancel: CancellationToken,
    ) -> Result<Run, FlowError> {
        self.config.validate()?;
        let levels = self.workflow.levels()?;

        log::info!(
            "Starting run {} of workflow '{}': {} jobs in {} levels ({} mode)",
            run.id(),
            self.workflow.name(),
            self.workflow.jobs().len(),
            levels.len(),
            self.config.mode
        );

        for (index, level) in levels.iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Run {} cancelled before level {}", run.id(), index);
                return Err(RunError::Cancelled.into());
            }

            let ready = self.prepare_level(&mut run, level)?;
            if ready.is_empty() {
                log::debug!("Level {}: nothing to execute", index);
                continue;
            }

            log::info!(
                "Level {}: executing {} jobs: {:?}",
                index,
                ready.len(),
                ready.iter().map(|job| job.name.as_str()).collect::<Vec<_>>()
            );

            let completed = match self.config.mode {
                ExecutionMode::Parallel => self.run_parallel(ready, &cancel).await,
                ExecutionMode::Sequential => run_sequential(ready, &cancel).await,
            };
            let completed = completed.map_err(|e| {
                log::error!("Run {} failed at level {}: {}", run.id(), index, e);
                e
            })?;

            for (name, response) in completed {
                self.check_exposed_fields(&name, &response);
                run.record_response(name, response)?;
            }
        }

        run.finish();
        log::info!(
            "Run {} finished: {} responded, {} skipped",
            run.id(),
            run.responses().len(),
            run.skipped().len()
        );
        Ok(run)
    }

    /// Skip or resolve every pending job of a level
    fn prepare_level(&self, run: &mut Run, level: &[String]) -> Result<Vec<ReadyJob>, FlowError> {
        let mut ready = Vec::with_capacity(level.len());
        for name in level {
            if run.is_terminal(name) {
                log::debug!("Job {} already {:?}", name, run.status(name));
                continue;
            }
            let job = self.workflow.job(name)?;
            if !conditions_met(run, job) {
                log::info!("Skipping job {}: run conditions not met", name);
                run.skip(name.clone())?;
                continue;
            }
            ready.push(ReadyJob {
                name: name.clone(),
                action: Arc::clone(job.action()),
                arguments: run.resolve_arguments(job)?,
            });
        }
        Ok(ready)
    }

    async fn run_parallel(
        &self,
        jobs: Vec<ReadyJob>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, Response)>, RunError> {
        let semaphore = self
            .config
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let mut completed: Vec<Option<(String, Response)>> = jobs.iter().map(|_| None).collect();

        let mut set = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => Some(
                        semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| RunError::Cancelled)?,
                    ),
                    None => None,
                };
                invoke(job).await.map(|done| (index, done))
            });
        }

        loop {
            let joined = tokio::select! {
                joined = set.join_next() => joined,
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return Err(RunError::Cancelled);
                }
            };
            let Some(joined) = joined else {
                break;
            };
            match joined {
                Ok(Ok((index, done))) => completed[index] = Some(done),
                Ok(Err(e)) => {
                    set.abort_all();
                    return Err(e);
                }
                // Invocations catch their own panics, so this task was aborted
                Err(_) => {
                    set.abort_all();
                    return Err(RunError::Cancelled);
                }
            }
        }

        Ok(completed.into_iter().flatten().collect())
    }

    fn check_exposed_fields(&self, job: &str, response: &Response) {
        let Some(fields) = self.workflow.exposed_fields_of(job) else {
            return;
        };
        for key in fields.iter().filter(|key| !response.contains(key)) {
            log::warn!(
                "Job {} responded without field '{}' referenced by other jobs",
                job,
                key
            );
        }
    }
}

async fn run_sequential(
    jobs: Vec<ReadyJob>,
    cancel: &CancellationToken,
) -> Result<Vec<(String, Response)>, RunError> {
    let mut completed = Vec::with_capacity(jobs.len());
    for job in jobs {
        let done = tokio::select! {
            done = invoke(job) => done?,
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
        };
        completed.push(done);
    }
    Ok(completed)
}

/// Only a literal `true` satisfies a condition
fn conditions_met(run: &Run, job: &Job) -> bool {
    job.run_if()
        .iter()
        .all(|condition| match run.resolve_condition(condition) {
            Ok(Value::Bool(flag)) => flag,
            Ok(other) => {
                log::warn!(
                    "Condition {} of job {} is not a boolean: {}",
                    condition,
                    job.name(),
                    other
                );
                false
            }
            Err(e) => {
                log::debug!(
                    "Condition {} of job {} unresolved: {}",
                    condition,
                    job.name(),
                    e
                );
                false
            }
        })
}

async fn invoke(job: ReadyJob) -> Result<(String, Response), RunError> {
    let ReadyJob {
        name,
        action,
        arguments,
    } = job;
    log::info!("Executing job: {} ({})", name, action.name());

    match AssertUnwindSafe(action.invoke(arguments))
        .catch_unwind()
        .await
    {
        Ok(Ok(response)) => {
            log::info!("Job {} completed", name);
            Ok((name, response))
        }
        Ok(Err(source)) => {
            log::error!("Job {} failed: {}", name, source);
            Err(RunError::ActionFailed {
                job: name,
                action: action.name().to_string(),
                source,
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("Job {} panicked: {}", name, message);
            Err(RunError::ActionPanicked {
                job: name,
                action: action.name().to_string(),
                message,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
