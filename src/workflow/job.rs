// SPDX-License-Identifier: MIT

//! Jobs and ordered job sets

use indexmap::{IndexMap, IndexSet};
use std::fmt;
use std::sync::Arc;

use super::argument::{Argument, Condition};
use super::graph::{is_valid_name, validate_dependencies, DependencyGraph};
use crate::action::{validate_contract, Action, ActionRegistry, ParamType};
use crate::error::{FlowError, GraphError, WiringError};

/// One named unit of work.
///
/// A job is immutable once built; the `with_*` methods consume it and
/// return the updated value.
#[derive(Clone)]
pub struct Job {
    name: String,
    action: Arc<dyn Action>,
    arguments: IndexMap<String, Argument>,
    explicit_dependencies: IndexSet<String>,
    dependencies: IndexSet<String>,
    run_if: Vec<Condition>,
    sync: bool,
}

impl Job {
    /// Build a job for `action`, checking the arguments against its parameters.
    ///
    /// Every referenced job becomes a dependency.
    pub fn new<I, K, A>(
        name: impl Into<String>,
        action: Arc<dyn Action>,
        arguments: I,
    ) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = (K, A)>,
        K: Into<String>,
        A: Into<Argument>,
    {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(GraphError::InvalidName {
                job: name.clone(),
                name,
            }
            .into());
        }

        validate_contract(action.as_ref())?;

        let arguments: IndexMap<String, Argument> = arguments
            .into_iter()
            .map(|(k, a)| (k.into(), a.into()))
            .collect();
        check_arguments(&name, action.as_ref(), &arguments)?;

        let mut job = Self {
            name,
            action,
            arguments,
            explicit_dependencies: IndexSet::new(),
            dependencies: IndexSet::new(),
            run_if: Vec::new(),
            sync: false,
        };
        job.refresh_dependencies()?;
        Ok(job)
    }

    /// Build a job whose action is looked up by identifier
    pub fn from_registry<I, K, A>(
        name: impl Into<String>,
        registry: &ActionRegistry,
        action: &str,
        arguments: I,
    ) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = (K, A)>,
        K: Into<String>,
        A: Into<Argument>,
    {
        let action = registry.resolve(action)?;
        Self::new(name, action, arguments)
    }

    /// Add explicit dependencies; a single call must not repeat a name
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dependencies: Vec<String> = dependencies.into_iter().map(Into::into).collect();
        validate_dependencies(&self.name, &dependencies)?;
        self.explicit_dependencies.extend(dependencies);
        self.refresh_dependencies()?;
        Ok(self)
    }

    /// Replace the run conditions; a single call must not repeat a condition
    pub fn with_run_if<I, C>(mut self, conditions: I) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        let mut run_if: Vec<Condition> = Vec::new();
        for condition in conditions.into_iter().map(Into::into) {
            if run_if.contains(&condition) {
                return Err(WiringError::DuplicateCondition(condition.to_string()).into());
            }
            run_if.push(condition);
        }
        self.run_if = run_if;
        self.refresh_dependencies()?;
        Ok(self)
    }

    /// Require the job to occupy a level by itself
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    pub fn action_name(&self) -> &str {
        self.action.name()
    }

    pub fn arguments(&self) -> &IndexMap<String, Argument> {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.arguments.get(name)
    }

    /// Explicit dependencies plus every referenced job, in order of first appearance
    pub fn dependencies(&self) -> &IndexSet<String> {
        &self.dependencies
    }

    pub fn run_if(&self) -> &[Condition] {
        &self.run_if
    }

    pub fn is_sync(&self) -> bool {
        self.sync
    }

    fn refresh_dependencies(&mut self) -> Result<(), GraphError> {
        let referenced = self
            .arguments
            .values()
            .filter_map(Argument::as_reference)
            .chain(self.run_if.iter().filter_map(Condition::as_reference))
            .map(|r| r.job().to_string());

        let mut dependencies = IndexSet::new();
        for dep in referenced.chain(self.explicit_dependencies.iter().cloned()) {
            if dep == self.name {
                return Err(GraphError::SelfDependency(self.name.clone()));
            }
            if !is_valid_name(&dep) {
                return Err(GraphError::InvalidName {
                    job: self.name.clone(),
                    name: dep,
                });
            }
            dependencies.insert(dep);
        }
        self.dependencies = dependencies;
        Ok(())
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("action", &self.action.name())
            .field("arguments", &self.arguments)
            .field("dependencies", &self.dependencies)
            .field("run_if", &self.run_if)
            .field("sync", &self.sync)
            .finish()
    }
}

/// Check supplied arguments against the action's declared parameters
fn check_arguments(
    job: &str,
    action: &dyn Action,
    arguments: &IndexMap<String, Argument>,
) -> Result<(), WiringError> {
    let missing: Vec<String> = action
        .parameters()
        .iter()
        .filter(|p| p.required && !arguments.contains_key(&p.name))
        .map(|p| p.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(WiringError::MissingArguments {
            action: action.name().to_string(),
            missing,
        });
    }

    let unexpected: Vec<String> = arguments
        .keys()
        .filter(|k| action.parameter(k).is_none())
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        return Err(WiringError::UnexpectedArguments {
            action: action.name().to_string(),
            unexpected,
        });
    }

    for (key, argument) in arguments {
        let Argument::Literal(value) = argument else {
            continue;
        };
        let expected = action
            .parameter(key)
            .map(|p| p.param_type)
            .unwrap_or(ParamType::Any);
        if !expected.matches(value) {
            return Err(WiringError::InvalidLiteral {
                job: job.to_string(),
                parameter: key.clone(),
                expected: expected.to_string(),
                actual: ParamType::describe(value).to_string(),
            });
        }
    }
    Ok(())
}

/// Ordered, uniquely named collection of jobs.
///
/// Insertion order is kept and used as the tie-break order when leveling.
#[derive(Debug, Clone, Default)]
pub struct JobSet {
    jobs: IndexMap<String, Job>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job
    pub fn add(&mut self, job: Job) -> Result<(), GraphError> {
        let index = self.jobs.len();
        self.insert_at(index, job)
    }

    /// Insert a job immediately before `anchor`
    pub fn add_before(&mut self, anchor: &str, job: Job) -> Result<(), GraphError> {
        let index = self.index_of(anchor)?;
        self.insert_at(index, job)
    }

    /// Insert a job immediately after `anchor`
    pub fn add_after(&mut self, anchor: &str, job: Job) -> Result<(), GraphError> {
        let index = self.index_of(anchor)?;
        self.insert_at(index + 1, job)
    }

    fn insert_at(&mut self, index: usize, job: Job) -> Result<(), GraphError> {
        if self.jobs.contains_key(job.name()) {
            return Err(GraphError::DuplicateJob(job.name().to_string()));
        }
        self.jobs.shift_insert(index, job.name().to_string(), job);
        Ok(())
    }

    pub(crate) fn index_of(&self, name: &str) -> Result<usize, GraphError> {
        self.jobs
            .get_index_of(name)
            .ok_or_else(|| GraphError::UnknownJob(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Result<&Job, GraphError> {
        self.jobs
            .get(name)
            .ok_or_else(|| GraphError::UnknownJob(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.jobs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    /// Union of every job's dependencies, in order of first appearance
    pub fn dependencies(&self) -> IndexSet<String> {
        self.jobs
            .values()
            .flat_map(|job| job.dependencies().iter().cloned())
            .collect()
    }

    /// Build the dependency graph by putting every job in set order
    pub fn graph(&self) -> Result<DependencyGraph, GraphError> {
        let mut graph = DependencyGraph::new();
        for job in self.jobs.values() {
            graph.put(job.name(), job.dependencies().iter().cloned())?;
            graph.set_sync(job.name(), job.is_sync())?;
        }
        Ok(graph)
    }
}
