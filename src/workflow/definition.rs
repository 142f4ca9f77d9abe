// SPDX-License-Identifier: MIT

//! Validated workflow definitions
//!
//! A `Workflow` owns a `JobSet` and checks every job as it is added:
//! references must point at jobs that already exist and at fields their
//! actions declare, and variables are collected into the schema of inputs
//! a run has to supply.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use super::argument::{Argument, Condition, Reference};
use super::graph::{DependencyGraph, Levels};
use super::job::{Job, JobSet};
use super::state::Run;
use crate::action::ParamType;
use crate::error::{FlowError, GraphError, RunError, WiringError};

/// Where a new job goes in the set's order
enum Position<'a> {
    End,
    Before(&'a str),
    After(&'a str),
}

/// A job set plus its validated wiring
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    name: String,
    jobs: JobSet,
    graph: DependencyGraph,
    /// Variable name -> type implied by the first consumer
    required_inputs: IndexMap<String, ParamType>,
    /// Job name -> response fields some consumer references
    exposed_fields: IndexMap<String, IndexSet<String>>,
}

/// Wiring collected for a job before it is committed
#[derive(Default)]
struct Wiring {
    inputs: Vec<(String, ParamType)>,
    exposed: Vec<(String, String)>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Append a job
    pub fn add(&mut self, job: Job) -> Result<(), FlowError> {
        self.insert(Position::End, job)
    }

    /// Insert a job immediately before `anchor`
    pub fn add_before(&mut self, anchor: &str, job: Job) -> Result<(), FlowError> {
        self.insert(Position::Before(anchor), job)
    }

    /// Insert a job immediately after `anchor`
    pub fn add_after(&mut self, anchor: &str, job: Job) -> Result<(), FlowError> {
        self.insert(Position::After(anchor), job)
    }

    /// Builder-style `add`
    pub fn with_job(mut self, job: Job) -> Result<Self, FlowError> {
        self.add(job)?;
        Ok(self)
    }

    fn insert(&mut self, position: Position<'_>, job: Job) -> Result<(), FlowError> {
        let wiring = self.wire(&job)?;
        let name = job.name().to_string();

        // The graph drops reverse edges on redefinition, but a job already in
        // the set keeps its declared dependencies
        if let Some(dep) = job.dependencies().iter().find(|dep| {
            self.jobs
                .get(dep)
                .is_ok_and(|existing| existing.dependencies().contains(&name))
        }) {
            return Err(
                GraphError::CircularDependency(vec![name.clone(), dep.clone(), name]).into(),
            );
        }

        let mut jobs = self.jobs.clone();
        let graph = match position {
            Position::End => {
                let mut graph = self.graph.clone();
                graph.put(&name, job.dependencies().iter().cloned())?;
                graph.set_sync(&name, job.is_sync())?;
                jobs.add(job)?;
                graph
            }
            Position::Before(anchor) => {
                jobs.add_before(anchor, job)?;
                jobs.graph()?
            }
            Position::After(anchor) => {
                jobs.add_after(anchor, job)?;
                jobs.graph()?
            }
        };

        self.jobs = jobs;
        self.graph = graph;
        for (variable, param_type) in wiring.inputs {
            self.required_inputs.entry(variable).or_insert(param_type);
        }
        for (referenced, key) in wiring.exposed {
            self.exposed_fields.entry(referenced).or_default().insert(key);
        }
        log::debug!(
            "Added job '{}' to workflow '{}' ({} jobs)",
            name,
            self.name,
            self.jobs.len()
        );
        Ok(())
    }

    /// Check a job's references and collect the inputs it needs
    fn wire(&self, job: &Job) -> Result<Wiring, WiringError> {
        let mut wiring = Wiring::default();

        for (parameter, argument) in job.arguments() {
            let expected = job
                .action()
                .parameter(parameter)
                .map(|p| p.param_type)
                .unwrap_or_default();
            match argument {
                Argument::Literal(_) => {}
                Argument::Variable(variable) => {
                    wiring.inputs.push((variable.name().to_string(), expected));
                }
                Argument::Reference(reference) => {
                    self.check_reference(job, parameter, reference, expected, &mut wiring)?;
                }
            }
        }

        for condition in job.run_if() {
            match condition {
                Condition::Variable(variable) => {
                    wiring
                        .inputs
                        .push((variable.name().to_string(), ParamType::Boolean));
                }
                Condition::Reference(reference) => {
                    self.check_reference(
                        job,
                        "run_if",
                        reference,
                        ParamType::Boolean,
                        &mut wiring,
                    )?;
                }
            }
        }

        Ok(wiring)
    }

    fn check_reference(
        &self,
        job: &Job,
        parameter: &str,
        reference: &Reference,
        expected: ParamType,
        wiring: &mut Wiring,
    ) -> Result<(), WiringError> {
        let target = self
            .jobs
            .get(reference.job())
            .map_err(|_| WiringError::UnknownReferencedJob {
                job: job.name().to_string(),
                referenced: reference.job().to_string(),
            })?;

        let actual = match reference.key() {
            Some(key) => {
                let field = target.action().response_field(key).ok_or_else(|| {
                    WiringError::UndeclaredResponseField {
                        job: job.name().to_string(),
                        referenced: reference.job().to_string(),
                        key: key.to_string(),
                    }
                })?;
                wiring
                    .exposed
                    .push((reference.job().to_string(), key.to_string()));
                field.field_type
            }
            None => ParamType::Object,
        };

        if !expected.accepts(&actual) {
            return Err(WiringError::TypeMismatch {
                job: job.name().to_string(),
                parameter: parameter.to_string(),
                reference: reference.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn jobs(&self) -> &JobSet {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Result<&Job, GraphError> {
        self.jobs.get(name)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Inputs a run must bind, with their expected types
    pub fn required_inputs(&self) -> &IndexMap<String, ParamType> {
        &self.required_inputs
    }

    /// Response fields consumers expect, per producing job
    pub fn exposed_fields(&self) -> &IndexMap<String, IndexSet<String>> {
        &self.exposed_fields
    }

    pub fn exposed_fields_of(&self, job: &str) -> Option<&IndexSet<String>> {
        self.exposed_fields.get(job)
    }

    /// Leveled execution order.
    ///
    /// Fails if some dependency was declared but never added as a job.
    pub fn levels(&self) -> Result<Levels, GraphError> {
        for job in self.jobs.iter() {
            if let Some(dependency) = job.dependencies().iter().find(|d| !self.jobs.contains(d)) {
                return Err(GraphError::UnresolvedDependency {
                    job: job.name().to_string(),
                    dependency: dependency.clone(),
                });
            }
        }
        Ok(self.graph.levels())
    }

    /// Validate inputs against the required schema and start a run
    pub fn bind<I, K>(&self, inputs: I) -> Result<Run, RunError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Run::new(self, inputs)
    }
}
