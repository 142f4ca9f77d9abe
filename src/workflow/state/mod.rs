// SPDX-License-Identifier: MIT

//! Per-run state
//!
//! A `Run` holds the inputs bound for one execution of a workflow and the
//! terminal state each job reaches: a stored response or a skip.

mod run;

pub use run::{JobStatus, Run};
