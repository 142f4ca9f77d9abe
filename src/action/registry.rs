// SPDX-License-Identifier: MIT

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::Action;
use crate::error::WiringError;

/// Maps action identifiers to shared action instances.
///
/// Clones share the same underlying table, so a registry populated at
/// startup can be handed to every workflow builder. Lookups go through a
/// std `RwLock` so that `Job` construction stays synchronous.
#[derive(Clone)]
pub struct ActionRegistry {
    actions: Arc<RwLock<HashMap<String, Arc<dyn Action>>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register an action under its own name, replacing any previous entry
    pub fn register(&self, action: Arc<dyn Action>) -> Result<(), WiringError> {
        validate_contract(action.as_ref())?;
        let mut actions = self.actions.write().unwrap_or_else(|e| e.into_inner());
        if actions
            .insert(action.name().to_string(), action.clone())
            .is_some()
        {
            log::warn!("Action '{}' re-registered", action.name());
        } else {
            log::debug!("Registered action: {}", action.name());
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
        actions.get(name).cloned()
    }

    /// Like `get`, but a missing action is an error
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Action>, WiringError> {
        self.get(name)
            .ok_or_else(|| WiringError::ActionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
        actions.contains_key(name)
    }

    /// Registered identifiers, sorted
    pub fn names(&self) -> Vec<String> {
        let actions = self.actions.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = actions.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that an action's declarations can be wired: a non-empty name and
/// unique, non-empty parameter and response field names.
pub(crate) fn validate_contract(action: &dyn Action) -> Result<(), WiringError> {
    let invalid = |reason: String| WiringError::InvalidAction {
        action: action.name().to_string(),
        reason,
    };

    if action.name().trim().is_empty() {
        return Err(invalid("action name is empty".to_string()));
    }

    let mut seen = HashSet::new();
    for param in action.parameters() {
        if param.name.trim().is_empty() {
            return Err(invalid("parameter with empty name".to_string()));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(invalid(format!("parameter '{}' declared twice", param.name)));
        }
    }

    let mut seen = HashSet::new();
    for field in action.response_fields() {
        if field.name.trim().is_empty() {
            return Err(invalid("response field with empty name".to_string()));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(invalid(format!(
                "response field '{}' declared twice",
                field.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Arguments, Field, ParamType, Parameter, Response};
    use crate::error::ActionError;
    use async_trait::async_trait;

    /// A mock action for testing
    struct MockAction {
        name: String,
        parameters: Vec<Parameter>,
        fields: Vec<Field>,
    }

    impl MockAction {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                parameters: vec![Parameter::required("input", ParamType::String)],
                fields: vec![Field::new("output", ParamType::String)],
            }
        }
    }

    #[async_trait]
    impl Action for MockAction {
        fn name(&self) -> &str {
            &self.name
        }

        fn parameters(&self) -> &[Parameter] {
            &self.parameters
        }

        fn response_fields(&self) -> &[Field] {
            &self.fields
        }

        async fn invoke(&self, _arguments: Arguments) -> Result<Response, ActionError> {
            Ok(Response::new().with("output", "mock"))
        }
    }

    #[test]
    fn test_register_and_resolve_action() {
        let registry = ActionRegistry::new();
        registry.register(Arc::new(MockAction::new("echo"))).unwrap();

        let action = registry.resolve("echo").unwrap();
        assert_eq!(action.name(), "echo");
        assert!(registry.contains("echo"));
    }

    #[test]
    fn test_resolve_missing_action() {
        let registry = ActionRegistry::new();
        let err = registry.resolve("nope").err().unwrap();
        assert_eq!(err, WiringError::ActionNotFound("nope".to_string()));
    }

    #[test]
    fn test_registry_is_shared_between_clones() {
        let registry = ActionRegistry::new();
        let cloned = registry.clone();

        cloned.register(Arc::new(MockAction::new("a"))).unwrap();
        registry.register(Arc::new(MockAction::new("b"))).unwrap();

        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cloned.names(), registry.names());
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut action = MockAction::new("dup");
        action
            .parameters
            .push(Parameter::optional("input", ParamType::Any));

        let registry = ActionRegistry::new();
        let err = registry.register(Arc::new(action)).unwrap_err();
        assert!(matches!(err, WiringError::InvalidAction { .. }));
        assert!(!registry.contains("dup"));
    }

    #[test]
    fn test_empty_response_field_rejected() {
        let mut action = MockAction::new("blank");
        action.fields.push(Field::new("  ", ParamType::Any));

        let err = validate_contract(&action).unwrap_err();
        assert!(matches!(err, WiringError::InvalidAction { .. }));
    }
}
