// SPDX-License-Identifier: MIT

//! Typed error handling for jobflow
//!
//! Errors are split by the phase that raises them:
//! - `GraphError` - structural problems found while building the dependency graph
//! - `WiringError` - workflow construction problems (actions, arguments, references)
//! - `ParseError` - malformed `${name}` / `${job:key}` textual forms
//! - `RunError` - failures while executing a run
//!
//! `FlowError` wraps all of them so callers can use a single `?` chain.

use thiserror::Error;

/// Boxed error type returned by action implementations
pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for jobflow
#[derive(Debug, Error)]
pub enum FlowError {
    /// Structural graph errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Workflow wiring errors
    #[error("Wiring error: {0}")]
    Wiring(#[from] WiringError),

    /// Textual form parse errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Run-time errors
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Configuration errors (invalid mode, bad env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Structural errors raised while building jobs, job sets and graphs
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// A job listed itself as a dependency
    #[error("Job '{0}' cannot depend on itself")]
    SelfDependency(String),

    /// The same dependency was listed more than once in a single call
    #[error("Job '{job}' lists duplicate dependencies: {names:?}")]
    DuplicateDependency { job: String, names: Vec<String> },

    /// Dependency or job name is empty, whitespace or purely numeric
    #[error("Job '{job}' has an invalid dependency name '{name}'")]
    InvalidName { job: String, name: String },

    /// Lookup of a job name that is not part of the graph or set
    #[error("Unknown job '{0}'")]
    UnknownJob(String),

    /// A job with this name was already added
    #[error("Job '{0}' already exists")]
    DuplicateJob(String),

    /// Adding the edges would close a cycle
    #[error("Circular dependency detected: {0:?}")]
    CircularDependency(Vec<String>),

    /// A dependency was declared but never defined as a job
    #[error("Job '{job}' depends on '{dependency}' which was never added")]
    UnresolvedDependency { job: String, dependency: String },
}

/// Workflow construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WiringError {
    /// No action registered under this identifier
    #[error("Action '{0}' not found")]
    ActionNotFound(String),

    /// The action's declared contract is unusable
    #[error("Action '{action}' is invalid: {reason}")]
    InvalidAction { action: String, reason: String },

    /// Required parameters were not supplied
    #[error("Action '{action}' is missing required arguments: {missing:?}")]
    MissingArguments { action: String, missing: Vec<String> },

    /// Arguments were supplied for parameters the action does not declare
    #[error("Action '{action}' does not accept arguments: {unexpected:?}")]
    UnexpectedArguments {
        action: String,
        unexpected: Vec<String>,
    },

    /// A literal argument does not fit the parameter type
    #[error("Job '{job}' parameter '{parameter}' expects {expected}, got {actual}")]
    InvalidLiteral {
        job: String,
        parameter: String,
        expected: String,
        actual: String,
    },

    /// The same run condition was listed twice
    #[error("Duplicate run condition: {0}")]
    DuplicateCondition(String),

    /// A reference names a job that has not been added yet
    #[error("Job '{job}' references unknown job '{referenced}'")]
    UnknownReferencedJob { job: String, referenced: String },

    /// A reference names a field the target action does not expose
    #[error("Job '{job}' references field '{key}' which job '{referenced}' does not expose")]
    UndeclaredResponseField {
        job: String,
        referenced: String,
        key: String,
    },

    /// A referenced field cannot feed the consuming parameter
    #[error("Job '{job}' parameter '{parameter}' expects {expected} but '{reference}' yields {actual}")]
    TypeMismatch {
        job: String,
        parameter: String,
        reference: String,
        expected: String,
        actual: String,
    },
}

/// Errors for the `${name}` and `${job:key}` textual forms
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Variable name does not match `[A-Za-z_][A-Za-z0-9_]*`
    #[error("Invalid variable '{0}'")]
    InvalidVariable(String),

    /// Text does not match the `${job:key}` grammar
    #[error("Invalid reference '{0}'")]
    InvalidReference(String),

    /// A reference component is empty or whitespace
    #[error("Reference {0} must not be empty")]
    EmptyComponent(&'static str),
}

/// Errors raised while executing a run
#[derive(Debug, Error)]
pub enum RunError {
    /// A required input was not bound
    #[error("Missing required input '{0}'")]
    MissingInput(String),

    /// A bound input does not match its declared type
    #[error("Input '{name}' expects {expected}, got {actual}")]
    InvalidInput {
        name: String,
        expected: String,
        actual: String,
    },

    /// The referenced job has no stored response (skipped or not yet run)
    #[error("Job '{0}' has no stored response")]
    MissingResponse(String),

    /// The referenced job responded without the requested field
    #[error("Response of job '{job}' has no field '{key}'")]
    MissingField { job: String, key: String },

    /// An argument of `job` could not be resolved; `source` names the producer
    #[error("Job '{job}' cannot resolve argument '{parameter}': {source}")]
    UnresolvedArgument {
        job: String,
        parameter: String,
        #[source]
        source: Box<RunError>,
    },

    /// The job already reached a terminal state in this run
    #[error("Job '{0}' already reached a terminal state")]
    AlreadyTerminal(String),

    /// The action returned an error
    #[error("Job '{job}' (action '{action}') failed: {source}")]
    ActionFailed {
        job: String,
        action: String,
        #[source]
        source: ActionError,
    },

    /// The action panicked while running
    #[error("Job '{job}' (action '{action}') panicked: {message}")]
    ActionPanicked {
        job: String,
        action: String,
        message: String,
    },

    /// The run was cancelled from outside
    #[error("Run cancelled")]
    Cancelled,
}

impl FlowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl RunError {
    /// Name of the job the error is attributed to, if any
    pub fn job(&self) -> Option<&str> {
        match self {
            RunError::MissingResponse(job) | RunError::AlreadyTerminal(job) => Some(job),
            RunError::MissingField { job, .. }
            | RunError::UnresolvedArgument { job, .. }
            | RunError::ActionFailed { job, .. }
            | RunError::ActionPanicked { job, .. } => Some(job),
            _ => None,
        }
    }
}
