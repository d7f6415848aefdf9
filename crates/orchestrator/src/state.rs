//! Results accumulated while a workflow runs.

use serde_json::{Map, Value};

/// Step results keyed by step name, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    results: Map<String, Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step result. Returns `false` and leaves the state untouched
    /// if the step already has a result.
    pub fn insert(&mut self, step: &str, result: Value) -> bool {
        if self.results.contains_key(step) {
            return false;
        }
        self.results.insert(step.to_string(), result);
        true
    }

    pub fn get(&self, step: &str) -> Option<&Value> {
        self.results.get(step)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Step names in the order their results were recorded.
    pub fn steps(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_refuses_duplicates() {
        let mut state = WorkflowState::new();
        assert!(state.insert("allocate_gpu", json!({ "claim_id": "a" })));
        assert!(!state.insert("allocate_gpu", json!({ "claim_id": "b" })));
        assert_eq!(state.get("allocate_gpu").unwrap()["claim_id"], "a");
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut state = WorkflowState::new();
        for step in ["validate_customer", "allocate_gpu", "deploy_model", "validate_deployment"] {
            state.insert(step, json!({}));
        }
        let order: Vec<&str> = state.steps().collect();
        assert_eq!(
            order,
            ["validate_customer", "allocate_gpu", "deploy_model", "validate_deployment"]
        );

        let value = state.into_value();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "validate_customer");
        assert_eq!(keys[3], "validate_deployment");
    }
}
