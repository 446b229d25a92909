use crate::models::{ExternalAction, FilterResult, FilterRule, RuleAction};

/// Fold a matched rule's action into the decision.
pub fn apply(rule: &FilterRule, result: &mut FilterResult) {
    match rule.action {
        RuleAction::MarkRead => result.is_read = true,
        RuleAction::MarkStarred => result.is_starred = true,
        RuleAction::Highlight => result.is_highlighted = true,
        RuleAction::AddTag => {
            if let Some(value) = rule.action_value.as_deref() {
                merge_tags(&mut result.tags, value);
            }
        }
        RuleAction::PushToExternal(service) => result.external_actions.push(ExternalAction {
            service,
            value: rule.action_value.clone(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
        }),
        RuleAction::Delete => result.should_skip = true,
    }
}

/// Append comma-separated tags not already present, keeping first-seen order.
pub fn merge_tags(tags: &mut Vec<String>, value: &str) {
    for tag in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ExternalService, NewRule, RuleField};

    fn rule(id: i64, action: RuleAction, value: Option<&str>) -> FilterRule {
        let name = format!("rule {}", id);
        let mut new = NewRule::new(name, RuleField::Title, Condition::Contains, "x", action);
        new.action_value = value.map(str::to_string);
        new.into_rule(id, 1, chrono::Utc::now())
    }

    #[test]
    fn flags_are_set() {
        let mut result = FilterResult::default();
        apply(&rule(1, RuleAction::MarkRead, None), &mut result);
        apply(&rule(2, RuleAction::MarkStarred, None), &mut result);
        apply(&rule(3, RuleAction::Highlight, None), &mut result);
        assert!(result.is_read && result.is_starred && result.is_highlighted);
        assert!(!result.should_skip);

        apply(&rule(4, RuleAction::Delete, None), &mut result);
        assert!(result.should_skip);
    }

    #[test]
    fn tags_accumulate_without_duplicates() {
        let mut result = FilterResult::default();
        apply(&rule(1, RuleAction::AddTag, Some("rust, news,,  ")), &mut result);
        apply(&rule(2, RuleAction::AddTag, Some("news,release , rust")), &mut result);
        apply(&rule(3, RuleAction::AddTag, None), &mut result);
        assert_eq!(result.tags, vec!["rust", "news", "release"]);
    }

    #[test]
    fn push_records_a_descriptor_only() {
        let mut result = FilterResult::default();
        let action = RuleAction::PushToExternal(ExternalService::Raindrop);
        let push = rule(9, action, Some("reading-list"));
        apply(&push, &mut result);

        assert_eq!(
            result.external_actions,
            vec![ExternalAction {
                service: ExternalService::Raindrop,
                value: Some("reading-list".to_string()),
                rule_id: 9,
                rule_name: "rule 9".to_string(),
            }]
        );
        assert!(!result.is_read);
    }
}
