// SPDX-License-Identifier: MIT

//! jobflow - workflows of named jobs wired by data dependencies
//!
//! Jobs bind an `Action` to arguments that are literals, run-time
//! variables or references to other jobs' responses. A `Workflow` checks
//! the wiring as jobs are added and groups them into levels; a `Runner`
//! executes each level in parallel or sequentially.

pub mod action;
pub mod error;
pub mod workflow;

pub use action::{Action, ActionRegistry, Arguments, Field, ParamType, Parameter, Response};
pub use error::{ActionError, FlowError, GraphError, ParseError, RunError, WiringError};
pub use workflow::{
    Argument, Condition, DependencyGraph, ExecutionMode, Job, JobSet, JobStatus, Levels,
    Reference, Run, Runner, RunnerConfig, Variable, Workflow,
};
