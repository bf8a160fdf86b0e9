//! Ordered filter-rule evaluation for group→server chat.

use tracing::warn;

use crate::config::{FilterAction, FilterRule, FilterRuleType};

/// Result of running a message through a rule chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Message continues with (possibly transformed) content.
    Pass(String),
    /// A block rule matched; the message is dropped.
    Blocked,
}

/// Apply rules in order.
///
/// The first matching `block` short-circuits. A matching `allow`
/// short-circuits the rest of the chain with the current content. A
/// matching `transform` rewrites the content and evaluation continues.
pub fn apply_rules(
    rules: &[FilterRule],
    content: &str,
    user_name: &str,
) -> FilterOutcome {
    let mut current = content.to_string();

    for rule in rules {
        if !matches(rule, &current, user_name) {
            continue;
        }
        match rule.action {
            FilterAction::Block => return FilterOutcome::Blocked,
            FilterAction::Allow => return FilterOutcome::Pass(current),
            FilterAction::Transform => {
                current = transform(rule, &current);
            },
        }
    }

    FilterOutcome::Pass(current)
}

fn matches(rule: &FilterRule, content: &str, user_name: &str) -> bool {
    match rule.rule_type {
        FilterRuleType::Regex => match regex::Regex::new(&rule.pattern) {
            Ok(re) => re.is_match(content),
            Err(e) => {
                warn!(pattern = %rule.pattern, error = %e, "invalid regex filter rule, skipping");
                false
            },
        },
        FilterRuleType::Keyword => content.contains(&rule.pattern),
        FilterRuleType::User => user_name == rule.pattern,
        FilterRuleType::Length => match rule.pattern.parse::<usize>() {
            Ok(max) => content.chars().count() > max,
            Err(_) => {
                warn!(pattern = %rule.pattern, "length filter rule is not a number, skipping");
                false
            },
        },
    }
}

fn transform(rule: &FilterRule, content: &str) -> String {
    let replacement = rule.replacement.as_deref().unwrap_or("");
    match rule.rule_type {
        FilterRuleType::Regex => match regex::Regex::new(&rule.pattern) {
            Ok(re) => re.replace_all(content, replacement).into_owned(),
            Err(_) => content.to_string(),
        },
        FilterRuleType::Keyword => content.replace(&rule.pattern, replacement),
        // User/length matches have no substring to rewrite; the replacement
        // stands in for the whole message.
        FilterRuleType::User | FilterRuleType::Length => replacement.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(t: FilterRuleType, pattern: &str, action: FilterAction) -> FilterRule {
        FilterRule {
            rule_type: t,
            pattern: pattern.into(),
            action,
            replacement: None,
        }
    }

    #[test]
    fn keyword_block() {
        let rules = vec![rule(FilterRuleType::Keyword, "spam", FilterAction::Block)];
        assert_eq!(apply_rules(&rules, "hello", "u"), FilterOutcome::Pass("hello".into()));
        assert_eq!(apply_rules(&rules, "spam here", "u"), FilterOutcome::Blocked);
    }

    #[test]
    fn first_block_short_circuits() {
        let mut transform_rule = rule(FilterRuleType::Keyword, "a", FilterAction::Transform);
        transform_rule.replacement = Some("b".into());
        let rules = vec![
            rule(FilterRuleType::Keyword, "bad", FilterAction::Block),
            transform_rule,
        ];
        assert_eq!(apply_rules(&rules, "bad apple", "u"), FilterOutcome::Blocked);
    }

    #[test]
    fn transform_continues() {
        let mut censor = rule(FilterRuleType::Keyword, "heck", FilterAction::Transform);
        censor.replacement = Some("h***".into());
        let rules = vec![
            censor,
            rule(FilterRuleType::Keyword, "heck", FilterAction::Block),
        ];
        // After the transform, the block rule no longer matches.
        assert_eq!(
            apply_rules(&rules, "what the heck", "u"),
            FilterOutcome::Pass("what the h***".into())
        );
    }

    #[test]
    fn allow_short_circuits() {
        let rules = vec![
            rule(FilterRuleType::User, "trusted", FilterAction::Allow),
            rule(FilterRuleType::Keyword, "spam", FilterAction::Block),
        ];
        assert_eq!(
            apply_rules(&rules, "spam from trusted", "trusted"),
            FilterOutcome::Pass("spam from trusted".into())
        );
        assert_eq!(apply_rules(&rules, "spam", "rando"), FilterOutcome::Blocked);
    }

    #[test]
    fn regex_rules() {
        let rules = vec![rule(FilterRuleType::Regex, r"(?i)badword", FilterAction::Block)];
        assert_eq!(apply_rules(&rules, "BADWORD!", "u"), FilterOutcome::Blocked);

        // Invalid regex never matches.
        let rules = vec![rule(FilterRuleType::Regex, "(unclosed", FilterAction::Block)];
        assert_eq!(apply_rules(&rules, "anything", "u"), FilterOutcome::Pass("anything".into()));
    }

    #[test]
    fn length_limit() {
        let rules = vec![rule(FilterRuleType::Length, "5", FilterAction::Block)];
        assert_eq!(apply_rules(&rules, "short", "u"), FilterOutcome::Pass("short".into()));
        assert_eq!(apply_rules(&rules, "toolong", "u"), FilterOutcome::Blocked);
    }
}
