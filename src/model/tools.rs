//! Tools the model may call.
//!
//! There is exactly one structured tool, `execute_code`, taking a single `code` string.
//! Models sometimes hallucinate a `python` tool whose argument buffer is bare code with
//! no JSON wrapper; that form is tolerated and routed to the same interpreter.

use serde_json::json;

use super::types::ToolSpec;

/// Name of the structured code tool.
pub const EXECUTE_CODE_TOOL: &str = "execute_code";

/// Name of the degenerate raw-code tool.
pub const RAW_CODE_TOOL: &str = "python";

/// How a tool's argument buffer turns into code text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// `{"code": "<value>"}`, extracted by scanning.
    Structured,
    /// The whole buffer is code.
    RawCode,
}

/// Known tool names and their argument handling.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<(&'static str, ToolKind)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: vec![
                (EXECUTE_CODE_TOOL, ToolKind::Structured),
                (RAW_CODE_TOOL, ToolKind::RawCode),
            ],
        }
    }

    /// Look up a tool by the name the model used.
    pub fn kind_of(&self, name: &str) -> Option<ToolKind> {
        self.tools
            .iter()
            .find(|(tool, _)| *tool == name)
            .map(|(_, kind)| *kind)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    /// Specs advertised to the model. The raw-code alias is never advertised.
    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![execute_code_spec()]
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema of the `execute_code` tool.
pub fn execute_code_spec() -> ToolSpec {
    ToolSpec {
        name: EXECUTE_CODE_TOOL.to_string(),
        description: "This function allows you to execute Python code and retrieve the \
                      terminal output. If the code generates image output, the function \
                      will return the text '[image]'. The code is sent to a persistent \
                      interpreter; it remains active after execution, retaining all \
                      variables in memory."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The code text"
                }
            },
            "required": ["code"]
        }),
    }
}
