use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ChatError, Result};

/// A named capability the model may ask to invoke.
///
/// `call` may perform network I/O but must not touch the transcript; the
/// conversation loop owns all appends.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON-schema shape of the accepted arguments, if any.
    fn parameters(&self) -> Option<Value> {
        None
    }
    async fn call(&self, arguments: Value) -> Result<String>;
}

/// Metadata advertised to the model for one registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Option<Value>,
}

/// Name-keyed set of tools. Lookup is case-insensitive because models do not
/// reliably echo the registered casing.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let key = tool.name().to_ascii_lowercase();
        if self.tools.contains_key(&key) {
            return Err(ChatError::DuplicateTool(tool.name().to_string()));
        }
        self.tools.insert(key, Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name.to_ascii_lowercase()).map(Arc::clone)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.values().map(|t| t.name().to_string()).collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Metadata for every registered tool, sorted by name so the catalog sent
    /// to the model is stable across calls.
    pub fn describe(&self) -> Vec<ToolDescription> {
        let mut described: Vec<ToolDescription> = self
            .tools
            .values()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();
        described.sort_by(|a, b| a.name.cmp(&b.name));
        described
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| ChatError::ToolNotFound(name.to_string()))?;
        tool.call(arguments).await
    }
}
