//! `{placeholder}` message templates.

/// Render a template by substituting `{name}` placeholders.
///
/// Unknown placeholders are left in place so misconfigured templates stay
/// visible to operators.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Render an event template: `{eventType}` plus every top-level string,
/// number, or boolean field of the payload by name.
pub fn render_event(template: &str, event_type: &str, data: &serde_json::Value) -> String {
    let mut out = template.replace("{eventType}", event_type);
    if let Some(obj) = data.as_object() {
        for (key, value) in obj {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            out = out.replace(&format!("{{{key}}}"), &rendered);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_template() {
        let rendered = render("[{group}] {username}: {content}", &[
            ("group", "ops"),
            ("username", "Alice"),
            ("content", "hi"),
        ]);
        assert_eq!(rendered, "[ops] Alice: hi");
    }

    #[test]
    fn unknown_placeholder_left() {
        assert_eq!(render("{what}", &[("group", "g")]), "{what}");
    }

    #[test]
    fn event_template_uses_payload_fields() {
        let data = serde_json::json!({ "playerName": "Alice", "world": "nether", "x": 12 });
        let rendered = render_event("{playerName} entered {world} at {x}", "player.join", &data);
        assert_eq!(rendered, "Alice entered nether at 12");
    }

    #[test]
    fn event_type_placeholder() {
        let rendered = render_event("[{eventType}]", "player.quit", &serde_json::json!({}));
        assert_eq!(rendered, "[player.quit]");
    }
}
