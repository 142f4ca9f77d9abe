// SPDX-License-Identifier: MIT

//! Job argument values
//!
//! An argument is either a literal JSON value, a `Variable` bound at run
//! time, or a `Reference` to a field of another job's response. The
//! textual forms are:
//! - `${name}` for a variable
//! - `${job:key}` for a reference (`${job:}` for the whole response)

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::action::Response;
use crate::error::ParseError;

static VARIABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid variable pattern"));

static VARIABLE_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{(\w+)\}$").expect("valid variable form pattern"));

static REFERENCE_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{(\w+):(\w*)\}$").expect("valid reference form pattern"));

/// Named placeholder for an input supplied when a run starts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    name: String,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Result<Self, ParseError> {
        let name = name.into();
        if !VARIABLE_NAME.is_match(&name) {
            return Err(ParseError::InvalidVariable(name));
        }
        Ok(Self { name })
    }

    /// Parse the `${name}` form
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let captures = VARIABLE_FORM
            .captures(text)
            .ok_or_else(|| ParseError::InvalidVariable(text.to_string()))?;
        Self::new(&captures[1])
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}}}", self.name)
    }
}

impl FromStr for Variable {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Pointer to a field of a previously produced job response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    job: String,
    key: Option<String>,
}

impl Reference {
    /// Reference a single response field
    pub fn new(job: impl Into<String>, key: impl Into<String>) -> Result<Self, ParseError> {
        Self::build(job.into(), Some(key.into()))
    }

    /// Reference the whole response of a job
    pub fn whole(job: impl Into<String>) -> Result<Self, ParseError> {
        Self::build(job.into(), None)
    }

    fn build(job: String, key: Option<String>) -> Result<Self, ParseError> {
        if job.trim().is_empty() {
            return Err(ParseError::EmptyComponent("job"));
        }
        if key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(ParseError::EmptyComponent("key"));
        }
        Ok(Self { job, key })
    }

    /// Parse the `${job:key}` form; an empty key yields a whole-response reference
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let captures = REFERENCE_FORM
            .captures(text)
            .ok_or_else(|| ParseError::InvalidReference(text.to_string()))?;
        match &captures[2] {
            "" => Self::whole(&captures[1]),
            key => Self::new(&captures[1], key),
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Pick the referenced part out of a response value
    pub(crate) fn extract(&self, response: &Response) -> Option<Value> {
        match &self.key {
            Some(key) => response.get(key).cloned(),
            None => Some(response.to_value()),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${{{}:{}}}", self.job, self.key.as_deref().unwrap_or(""))
    }
}

impl FromStr for Reference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A job argument
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Passed through unchanged
    Literal(Value),
    /// Resolved from the run's bound inputs
    Variable(Variable),
    /// Resolved from another job's stored response
    Reference(Reference),
}

impl Argument {
    pub fn literal(value: impl Into<Value>) -> Self {
        Argument::Literal(value.into())
    }

    /// Interpret text that may use the `${...}` forms.
    ///
    /// Text not starting with `${` is a literal string.
    pub fn from_text(text: &str) -> Result<Self, ParseError> {
        if !text.starts_with("${") {
            return Ok(Argument::Literal(Value::String(text.to_string())));
        }
        if text.contains(':') {
            Reference::parse(text).map(Argument::Reference)
        } else {
            Variable::parse(text).map(Argument::Variable)
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Argument::Reference(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Variable> for Argument {
    fn from(variable: Variable) -> Self {
        Argument::Variable(variable)
    }
}

impl From<Reference> for Argument {
    fn from(reference: Reference) -> Self {
        Argument::Reference(reference)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Literal(value)
    }
}

/// A run condition; the job runs only when every condition resolves to `true`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Variable(Variable),
    Reference(Reference),
}

impl Condition {
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Condition::Reference(r) => Some(r),
            Condition::Variable(_) => None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Variable(v) => v.fmt(f),
            Condition::Reference(r) => r.fmt(f),
        }
    }
}

impl From<Variable> for Condition {
    fn from(variable: Variable) -> Self {
        Condition::Variable(variable)
    }
}

impl From<Reference> for Condition {
    fn from(reference: Reference) -> Self {
        Condition::Reference(reference)
    }
}

impl FromStr for Condition {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            Reference::parse(s).map(Condition::Reference)
        } else {
            Variable::parse(s).map(Condition::Variable)
        }
    }
}
