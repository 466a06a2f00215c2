//! System prompt composition.

const TEMPLATE: &str = "You are a voice-first smart home assistant running inside Home Assistant.

Rules:
- Be concise in speech.
- When you need to control the smart home, call the tool `control_home_assistant`.
- Always use an entity_id from the device list below; do NOT invent entity_ids.
- If you cannot find a matching device, ask a short clarifying question or say you can't find it.
- Confirm actions briefly after tool success.

Device list (name, entity_id, state):
{device_block}
";

/// Composes the system prompt by substituting the rendered entity context
/// lines into the literal template.
#[must_use]
pub fn build_system_prompt(context_lines: &[String]) -> String {
    let device_block = context_lines.join("\n");
    TEMPLATE.replace("{device_block}", &device_block)
}
