// SPDX-License-Identifier: MIT

//! Runtime state of one workflow execution

use chrono::{DateTime, Duration, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::action::{Arguments, ParamType, Response};
use crate::error::RunError;
use crate::workflow::argument::{Argument, Condition, Reference};
use crate::workflow::definition::Workflow;
use crate::workflow::job::Job;

/// Where a job stands within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Skipped,
    Responded,
}

/// Bound inputs plus the responses and skips recorded so far.
///
/// Every job reaches at most one terminal state: recording a response or a
/// skip for a job that already has one fails with `AlreadyTerminal`.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    id: Uuid,
    inputs: IndexMap<String, Value>,
    responses: IndexMap<String, Response>,
    skipped: IndexSet<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Bind `inputs` against the workflow's required inputs.
    ///
    /// Inputs the workflow does not ask for are dropped.
    pub fn new<I, K>(workflow: &Workflow, inputs: I) -> Result<Self, RunError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut supplied: IndexMap<String, Value> =
            inputs.into_iter().map(|(k, v)| (k.into(), v)).collect();

        let mut bound = IndexMap::new();
        for (name, param_type) in workflow.required_inputs() {
            let value = supplied
                .shift_remove(name)
                .ok_or_else(|| RunError::MissingInput(name.clone()))?;
            check_input(name, *param_type, &value)?;
            bound.insert(name.clone(), value);
        }
        for name in supplied.keys() {
            log::debug!(
                "Ignoring input '{}' not used by workflow '{}'",
                name,
                workflow.name()
            );
        }

        Ok(Self {
            id: Uuid::new_v4(),
            inputs: bound,
            responses: IndexMap::new(),
            skipped: IndexSet::new(),
            started_at: Utc::now(),
            finished_at: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    pub fn inputs(&self) -> &IndexMap<String, Value> {
        &self.inputs
    }

    pub fn response(&self, job: &str) -> Option<&Response> {
        self.responses.get(job)
    }

    /// Stored responses, level by level in each level's job order
    pub fn responses(&self) -> &IndexMap<String, Response> {
        &self.responses
    }

    pub fn skipped(&self) -> &IndexSet<String> {
        &self.skipped
    }

    pub fn is_skipped(&self, job: &str) -> bool {
        self.skipped.contains(job)
    }

    pub fn is_terminal(&self, job: &str) -> bool {
        self.responses.contains_key(job) || self.skipped.contains(job)
    }

    pub fn status(&self, job: &str) -> JobStatus {
        if self.responses.contains_key(job) {
            JobStatus::Responded
        } else if self.skipped.contains(job) {
            JobStatus::Skipped
        } else {
            JobStatus::Pending
        }
    }

    pub fn record_response(
        &mut self,
        job: impl Into<String>,
        response: Response,
    ) -> Result<(), RunError> {
        let job = job.into();
        if self.is_terminal(&job) {
            return Err(RunError::AlreadyTerminal(job));
        }
        self.responses.insert(job, response);
        Ok(())
    }

    pub fn skip(&mut self, job: impl Into<String>) -> Result<(), RunError> {
        let job = job.into();
        if self.is_terminal(&job) {
            return Err(RunError::AlreadyTerminal(job));
        }
        self.skipped.insert(job);
        Ok(())
    }

    /// Resolve one argument to its concrete value
    pub fn resolve(&self, argument: &Argument) -> Result<Value, RunError> {
        match argument {
            Argument::Literal(value) => Ok(value.clone()),
            Argument::Variable(variable) => self
                .inputs
                .get(variable.name())
                .cloned()
                .ok_or_else(|| RunError::MissingInput(variable.name().to_string())),
            Argument::Reference(reference) => self.resolve_reference(reference),
        }
    }

    pub fn resolve_reference(&self, reference: &Reference) -> Result<Value, RunError> {
        let response = self
            .responses
            .get(reference.job())
            .ok_or_else(|| RunError::MissingResponse(reference.job().to_string()))?;
        reference
            .extract(response)
            .ok_or_else(|| RunError::MissingField {
                job: reference.job().to_string(),
                key: reference.key().unwrap_or_default().to_string(),
            })
    }

    pub fn resolve_condition(&self, condition: &Condition) -> Result<Value, RunError> {
        match condition {
            Condition::Variable(variable) => self
                .inputs
                .get(variable.name())
                .cloned()
                .ok_or_else(|| RunError::MissingInput(variable.name().to_string())),
            Condition::Reference(reference) => self.resolve_reference(reference),
        }
    }

    /// Resolve every argument of a job, keeping the job's argument order.
    ///
    /// Failures are reported against `job` as `UnresolvedArgument`.
    pub fn resolve_arguments(&self, job: &Job) -> Result<Arguments, RunError> {
        job.arguments()
            .iter()
            .map(|(name, argument)| {
                let value = self
                    .resolve(argument)
                    .map_err(|source| RunError::UnresolvedArgument {
                        job: job.name().to_string(),
                        parameter: name.clone(),
                        source: Box::new(source),
                    })?;
                Ok((name.clone(), value))
            })
            .collect()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Wall-clock time from start to finish, once finished
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Snapshot of the run as JSON
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn check_input(name: &str, param_type: ParamType, value: &Value) -> Result<(), RunError> {
    if param_type.matches(value) {
        return Ok(());
    }
    Err(RunError::InvalidInput {
        name: name.to_string(),
        expected: param_type.to_string(),
        actual: ParamType::describe(value).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Field, Parameter};
    use crate::error::ActionError;
    use crate::workflow::argument::Variable;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Echo {
        parameters: Vec<Parameter>,
        fields: Vec<Field>,
    }

    #[async_trait]
    impl Action for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn parameters(&self) -> &[Parameter] {
            &self.parameters
        }

        fn response_fields(&self) -> &[Field] {
            &self.fields
        }

        async fn invoke(&self, arguments: Arguments) -> Result<Response, ActionError> {
            Ok(arguments.into_iter().collect())
        }
    }

    fn echo() -> Arc<dyn Action> {
        Arc::new(Echo {
            parameters: vec![
                Parameter::required("text", ParamType::String),
                Parameter::optional("times", ParamType::Integer),
            ],
            fields: vec![Field::new("text", ParamType::String)],
        })
    }

    fn workflow() -> Workflow {
        let first = Job::new(
            "first",
            echo(),
            [
                ("text", Argument::from(Variable::new("topic").unwrap())),
                ("times", Argument::from(Variable::new("times").unwrap())),
            ],
        )
        .unwrap();
        let second = Job::new(
            "second",
            echo(),
            [("text", Argument::from(Reference::new("first", "text").unwrap()))],
        )
        .unwrap();
        Workflow::new("echo")
            .with_job(first)
            .unwrap()
            .with_job(second)
            .unwrap()
    }

    #[test]
    fn test_bind_checks_inputs() {
        let workflow = workflow();

        let err = Run::new(&workflow, [("topic", json!("rust"))]).unwrap_err();
        assert!(matches!(err, RunError::MissingInput(ref name) if name == "times"));

        let err = Run::new(&workflow, [("topic", json!("rust")), ("times", json!("2"))])
            .unwrap_err();
        assert!(matches!(err, RunError::InvalidInput { ref name, .. } if name == "times"));

        let run = workflow
            .bind([
                ("topic", json!("rust")),
                ("times", json!(2)),
                ("unused", json!(true)),
            ])
            .unwrap();
        assert_eq!(run.input("topic"), Some(&json!("rust")));
        assert!(run.input("unused").is_none());
        assert!(!run.is_finished());
    }

    #[test]
    fn test_terminal_states_are_exclusive() {
        let mut run = workflow()
            .bind([("topic", json!("a")), ("times", json!(1))])
            .unwrap();
        assert_eq!(run.status("first"), JobStatus::Pending);

        run.record_response("first", Response::new().with("text", "a"))
            .unwrap();
        assert_eq!(run.status("first"), JobStatus::Responded);
        assert!(matches!(
            run.skip("first"),
            Err(RunError::AlreadyTerminal(_))
        ));

        run.skip("second").unwrap();
        assert_eq!(run.status("second"), JobStatus::Skipped);
        assert!(matches!(
            run.record_response("second", Response::new()),
            Err(RunError::AlreadyTerminal(_))
        ));
    }

    #[test]
    fn test_resolve_arguments() {
        let workflow = workflow();
        let mut run = workflow
            .bind([("topic", json!("graphs")), ("times", json!(3))])
            .unwrap();

        let first = workflow.job("first").unwrap();
        let arguments = run.resolve_arguments(first).unwrap();
        assert_eq!(arguments.get("text"), Some(&json!("graphs")));
        assert_eq!(arguments.get("times"), Some(&json!(3)));

        let second = workflow.job("second").unwrap();
        match run.resolve_arguments(second) {
            Err(RunError::UnresolvedArgument {
                job,
                parameter,
                source,
            }) => {
                assert_eq!(job, "second");
                assert_eq!(parameter, "text");
                assert!(matches!(*source, RunError::MissingResponse(ref p) if p == "first"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        run.record_response("first", Response::new().with("other", 1))
            .unwrap();
        match run.resolve_arguments(second) {
            Err(RunError::UnresolvedArgument { job, source, .. }) => {
                assert_eq!(job, "second");
                assert!(matches!(*source, RunError::MissingField { ref key, .. } if key == "text"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_whole_response_reference() {
        let mut run = workflow()
            .bind([("topic", json!("a")), ("times", json!(1))])
            .unwrap();
        run.record_response("first", Response::new().with("text", "a").with("n", 2))
            .unwrap();

        let whole = Reference::whole("first").unwrap();
        assert_eq!(
            run.resolve_reference(&whole).unwrap(),
            json!({"text": "a", "n": 2})
        );
    }

    #[test]
    fn test_finish_and_snapshot() {
        let mut run = workflow()
            .bind([("topic", json!("a")), ("times", json!(1))])
            .unwrap();
        run.skip("second").unwrap();
        run.finish();

        assert!(run.duration().is_some());
        let snapshot = run.to_json();
        assert_eq!(snapshot["inputs"]["topic"], json!("a"));
        assert_eq!(snapshot["skipped"], json!(["second"]));
        assert_eq!(snapshot["id"], json!(run.id().to_string()));
    }
}
