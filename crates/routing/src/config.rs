//! Per-binding configuration shapes, decoded from the binding's JSON
//! `config` column.

use serde::{Deserialize, Serialize};

/// Config carried by a `chat`-type binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatBindingConfig {
    pub enabled: bool,
    /// Group→server relay requires bidirectional chat.
    pub bidirectional: bool,
    pub filter_rules: Vec<FilterRule>,
    pub rate_limit: Option<RateLimit>,
    /// Placeholders: `{group}`, `{username}`, `{content}`.
    pub message_format: String,
}

impl Default for ChatBindingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bidirectional: true,
            filter_rules: Vec::new(),
            rate_limit: None,
            message_format: "[{group}] {username}: {content}".into(),
        }
    }
}

/// Config carried by an `event`-type binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventBindingConfig {
    pub enabled: bool,
    /// Event types relayed to the group; empty relays nothing.
    pub event_types: Vec<String>,
    /// Field-equality filters applied to the event payload.
    pub filters: Vec<EventFilter>,
    /// Placeholders: `{eventType}` plus any event payload field by name.
    pub message_format: String,
}

impl Default for EventBindingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_types: Vec::new(),
            filters: Vec::new(),
            message_format: "[{eventType}] {playerName}".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Payload field to inspect.
    pub field: String,
    /// Required value (stringified comparison).
    pub equals: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub window_ms: u64,
    pub max_messages: u32,
}

// ── Filter rules ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterRuleType {
    Regex,
    Keyword,
    User,
    Length,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Allow,
    Block,
    Transform,
}

/// One ordered filter rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    #[serde(rename = "type")]
    pub rule_type: FilterRuleType,
    /// Regex source, keyword, user name, or maximum length (as digits)
    /// depending on `type`.
    pub pattern: String,
    pub action: FilterAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn chat_config_decodes_with_defaults() {
        let cfg: ChatBindingConfig = serde_json::from_value(serde_json::json!({
            "enabled": true,
            "filterRules": [
                { "type": "keyword", "pattern": "spam", "action": "block" }
            ]
        }))
        .unwrap();
        assert!(cfg.bidirectional);
        assert_eq!(cfg.filter_rules.len(), 1);
        assert_eq!(cfg.filter_rules[0].action, FilterAction::Block);
        assert_eq!(cfg.message_format, "[{group}] {username}: {content}");
    }

    #[test]
    fn event_config_decodes() {
        let cfg: EventBindingConfig = serde_json::from_value(serde_json::json!({
            "eventTypes": ["player.join", "player.quit"],
            "filters": [{ "field": "world", "equals": "overworld" }]
        }))
        .unwrap();
        assert_eq!(cfg.event_types.len(), 2);
        assert_eq!(cfg.filters[0].field, "world");
    }
}
