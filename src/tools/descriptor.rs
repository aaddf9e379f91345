//! Tool descriptors and the per-invocation tool set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::errors::ToolError;
use super::schema::ArgSchema;
use crate::inference::types::ToolDefinition;

/// The callable behind a tool.
///
/// Implementations encode every expected failure in the returned payload;
/// they never fail the run.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Value) -> Value;
}

/// Adapter for synchronous closures.
struct FnHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    async fn call(&self, arguments: Value) -> Value {
        (self.0)(arguments)
    }
}

/// A named, schema-described callable capability.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    schema: ArgSchema,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn new(
        name: &str,
        description: &str,
        schema: ArgSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler,
        }
    }

    /// A tool backed by a plain function.
    pub fn from_fn<F>(name: &str, description: &str, schema: ArgSchema, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::new(name, description, schema, Arc::new(FnHandler(f)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    /// Function-calling definition sent to the model.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(&self.name, &self.description, self.schema.to_json_schema())
    }

    pub fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        self.schema
            .validate(arguments)
            .map_err(|reason| ToolError::Validation {
                tool: self.name.clone(),
                reason,
            })
    }

    /// Validate, then execute.
    pub async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        self.validate(&arguments)?;
        Ok(self.handler.call(arguments).await)
    }
}

/// An ordered set of tools keyed by name. Inserting an existing name
/// replaces the earlier entry in place.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; returns the descriptor it replaced, if any.
    pub fn insert(&mut self, tool: ToolDescriptor) -> Option<ToolDescriptor> {
        match self.index.get(tool.name()) {
            Some(&pos) => Some(std::mem::replace(&mut self.tools[pos], tool)),
            None => {
                self.index.insert(tool.name().to_string(), self.tools.len());
                self.tools.push(tool);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&pos| &self.tools[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDescriptor::definition).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Extend<ToolDescriptor> for ToolSet {
    fn extend<I: IntoIterator<Item = ToolDescriptor>>(&mut self, iter: I) {
        for tool in iter {
            self.insert(tool);
        }
    }
}

impl FromIterator<ToolDescriptor> for ToolSet {
    fn from_iter<I: IntoIterator<Item = ToolDescriptor>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::schema::FieldType;
    use super::*;

    fn echo(name: &str, tag: &'static str) -> ToolDescriptor {
        ToolDescriptor::from_fn(
            name,
            "Echo",
            ArgSchema::new().required("text", FieldType::String, "Text"),
            move |args| json!({"tag": tag, "text": args["text"]}),
        )
    }

    #[tokio::test]
    async fn test_invoke_validates_first() {
        let tool = echo("echo", "a");
        let err = tool.invoke(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation { .. }));

        let out = tool.invoke(json!({"text": "hi"})).await.unwrap();
        assert_eq!(out["text"], "hi");
    }

    #[test]
    fn test_insert_same_name_last_wins_in_place() {
        let mut set = ToolSet::new();
        set.insert(echo("first", "a"));
        set.insert(echo("echo", "a"));
        let replaced = set.insert(echo("echo", "b"));

        assert!(replaced.is_some());
        assert_eq!(set.len(), 2);
        assert_eq!(set.names(), vec!["first", "echo"]);
    }

    #[tokio::test]
    async fn test_replacement_handler_is_used() {
        let set: ToolSet = vec![echo("echo", "a"), echo("echo", "b")].into_iter().collect();
        let out = set.get("echo").unwrap().invoke(json!({"text": "x"})).await.unwrap();
        assert_eq!(out["tag"], "b");
    }

    #[test]
    fn test_definition_uses_schema() {
        let def = echo("echo", "a").definition();
        assert_eq!(def.function.name, "echo");
        assert_eq!(def.function.parameters["required"], json!(["text"]));
    }
}
