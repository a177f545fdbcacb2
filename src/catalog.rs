//! Snapshot of the tools a server advertised at connection time, and their
//! translation into the chat-completion `tools` format.

use crate::error::{BridgeError, Result};
use crate::mcp::ToolDefinition;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Function tool in the chat-completion request format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
}

impl ToolCatalog {
    /// Build a catalog, rejecting servers that advertise the same name twice.
    pub fn new(tools: Vec<ToolDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(BridgeError::Protocol(format!(
                    "tool server advertised '{}' more than once",
                    tool.name
                )));
            }
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name.as_str())
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Map every tool to a function tool, in advertised order.
    pub fn to_function_tools(&self) -> Vec<FunctionTool> {
        self.tools.iter().map(to_function_tool).collect()
    }
}

fn to_function_tool(tool: &ToolDefinition) -> FunctionTool {
    let parameters = match &tool.input_schema {
        Value::Null => json!({ "type": "object", "properties": {} }),
        schema => schema.clone(),
    };

    FunctionTool {
        tool_type: "function",
        function: FunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_tools() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "read_query",
                Some("Execute a SELECT query on the SQLite database"),
                json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            ),
            ToolDefinition::new(
                "list_tables",
                Some("List all tables in the SQLite database"),
                json!({ "type": "object", "properties": {} }),
            ),
        ]
    }

    #[test]
    fn test_mapping_preserves_name_schema_and_description() {
        let catalog = ToolCatalog::new(sqlite_tools()).unwrap();
        let functions = catalog.to_function_tools();

        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].tool_type, "function");
        assert_eq!(functions[0].function.name, "read_query");
        assert_eq!(
            functions[0].function.description.as_deref(),
            Some("Execute a SELECT query on the SQLite database")
        );
        assert_eq!(
            functions[0].function.parameters,
            catalog.tools()[0].input_schema
        );
        assert_eq!(functions[1].function.name, "list_tables");
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let catalog = ToolCatalog::new(sqlite_tools()).unwrap();
        assert_eq!(catalog.to_function_tools(), catalog.to_function_tools());
    }

    #[test]
    fn test_serialized_shape() {
        let catalog = ToolCatalog::new(vec![ToolDefinition::new(
            "list_tables",
            None,
            Value::Null,
        )])
        .unwrap();

        let value = serde_json::to_value(catalog.to_function_tools()).unwrap();
        assert_eq!(
            value,
            json!([{
                "type": "function",
                "function": {
                    "name": "list_tables",
                    "parameters": { "type": "object", "properties": {} }
                }
            }])
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut tools = sqlite_tools();
        tools.push(tools[0].clone());

        let err = ToolCatalog::new(tools).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(err.to_string().contains("read_query"));
    }

    #[test]
    fn test_lookup() {
        let catalog = ToolCatalog::new(sqlite_tools()).unwrap();
        assert!(catalog.contains("list_tables"));
        assert!(!catalog.contains("drop_database"));
        assert_eq!(
            catalog.names().collect::<Vec<_>>(),
            vec!["read_query", "list_tables"]
        );
        assert_eq!(catalog.len(), 2);
        assert!(!catalog.is_empty());
        assert!(ToolCatalog::default().is_empty());
    }
}
