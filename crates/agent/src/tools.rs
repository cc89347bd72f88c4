use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the arguments, as declared to the model.
    fn parameters(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Function declarations for the given subset, in the order requested,
    /// silently skipping names that are not registered.
    pub fn function_specs(&self, names: &[&str]) -> Vec<Value> {
        names
            .iter()
            .filter_map(|name| self.tools.get(*name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters(),
                })
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let tool =
            self.tools.get(name).ok_or_else(|| anyhow!("unknown function `{name}`"))?;
        tool.execute(input).await
    }
}
