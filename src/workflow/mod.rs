// SPDX-License-Identifier: MIT

//! Workflow definition and execution
//!
//! This module provides:
//! - `Variable`, `Reference`, `Argument`, `Condition` - job argument values
//! - `Job`, `JobSet` - named units of work and their ordered collection
//! - `DependencyGraph` - dependency edges and level computation
//! - `Workflow` - a job set with validated wiring
//! - `Run` - inputs and per-job outcomes of one execution
//! - `Runner` - executes a run level by level

pub mod argument;
pub mod config;
pub mod definition;
pub mod graph;
pub mod job;
pub mod runner;
pub mod state;

pub use argument::{Argument, Condition, Reference, Variable};
pub use config::{ExecutionMode, RunnerConfig};
pub use definition::Workflow;
pub use graph::{DependencyGraph, Levels};
pub use job::{Job, JobSet};
pub use runner::Runner;
pub use state::{JobStatus, Run};
