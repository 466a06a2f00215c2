//! Tool declaration and tool-call/response shapes exchanged with the
//! remote live-model session.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Name of the single tool this gateway exposes to the model.
pub const CONTROL_HOME_ASSISTANT: &str = "control_home_assistant";

/// Builds the `tools` array sent in the live-session setup message: one
/// tool with one function declaration, parameters `domain`, `service`,
/// `entity_id`, `service_data_json`, with `domain`/`service` required.
#[must_use]
pub fn tool_declarations() -> Value {
    json!([{
        "functionDeclarations": [{
            "name": CONTROL_HOME_ASSISTANT,
            "description": "Control a Home Assistant entity by calling a domain service.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "domain": { "type": "STRING" },
                    "service": { "type": "STRING" },
                    "entity_id": { "type": "STRING" },
                    "service_data_json": { "type": "STRING" },
                },
                "required": ["domain", "service"],
            },
        }],
    }])
}

/// A model-initiated function call awaiting a response.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The gateway's response to one [`FunctionCall`].
#[derive(Debug, Clone, Serialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    /// Builds the `{ok:false, error:"Unknown tool"}` response for a call
    /// whose name this gateway doesn't recognize.
    #[must_use]
    pub fn unknown_tool(call: &FunctionCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: json!({ "ok": false, "error": "Unknown tool" }),
        }
    }

    /// Builds the `{ok, result}` response wrapping a home-automation
    /// service-call outcome.
    #[must_use]
    pub fn control_home_assistant(id: &str, ok: bool, result: &str) -> Self {
        Self {
            id: id.to_string(),
            name: CONTROL_HOME_ASSISTANT.to_string(),
            response: json!({ "ok": ok, "result": result }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_declarations_require_domain_and_service() {
        let tools = tool_declarations();
        let required = &tools[0]["functionDeclarations"][0]["parameters"]["required"];
        assert_eq!(required, &json!(["domain", "service"]));
    }

    #[test]
    fn tool_declarations_name_matches_constant() {
        let tools = tool_declarations();
        assert_eq!(
            tools[0]["functionDeclarations"][0]["name"],
            json!(CONTROL_HOME_ASSISTANT)
        );
    }

    #[test]
    fn unknown_tool_response_carries_call_id() {
        let call = FunctionCall {
            id: "t1".to_string(),
            name: "turn_off_the_sun".to_string(),
            args: Value::Null,
        };
        let response = FunctionResponse::unknown_tool(&call);
        assert_eq!(response.id, "t1");
        assert_eq!(response.response, json!({ "ok": false, "error": "Unknown tool" }));
    }
}
