use std::ops::Deref;

use regex::Regex;

use crate::models::{Condition, FilterContext, FilterRule};

use super::condition::{build_regex, evaluate, resolve_field};

/// A rule ready for evaluation: regex patterns are compiled once, when the
/// rule enters a cache snapshot, instead of on every article.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: FilterRule,
    // None for non-regex conditions and for patterns that fail to compile
    regex: Option<Regex>,
}

impl CompiledRule {
    pub fn compile(rule: FilterRule) -> Self {
        let regex = match rule.condition {
            Condition::Regex => match build_regex(&rule.pattern, rule.case_sensitive) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(
                        "Rule {} ({}) has an invalid regex {:?}, it will never match: {}",
                        rule.id,
                        rule.name,
                        rule.pattern,
                        e
                    );
                    None
                }
            },
            _ => None,
        };
        Self { rule, regex }
    }

    pub fn rule(&self) -> &FilterRule {
        &self.rule
    }

    pub fn has_regex(&self) -> bool {
        self.regex.is_some()
    }

    /// Does the rule's condition hold for this article?
    ///
    /// A missing field never matches, whatever the condition.
    pub fn matches(&self, context: &FilterContext) -> bool {
        let Some(value) = resolve_field(self.rule.field, context) else {
            return false;
        };
        match self.rule.condition {
            Condition::Regex => self.regex.as_ref().is_some_and(|re| re.is_match(value)),
            condition => evaluate(
                condition,
                value,
                &self.rule.pattern,
                self.rule.case_sensitive,
            ),
        }
    }
}

impl Deref for CompiledRule {
    type Target = FilterRule;

    fn deref(&self) -> &FilterRule {
        &self.rule
    }
}

impl From<FilterRule> for CompiledRule {
    fn from(rule: FilterRule) -> Self {
        Self::compile(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRule, RuleAction, RuleField};

    fn rule(field: RuleField, condition: Condition, pattern: &str) -> CompiledRule {
        NewRule::new("test", field, condition, pattern, RuleAction::MarkRead)
            .into_rule(1, 1, chrono::Utc::now())
            .into()
    }

    fn context() -> FilterContext {
        FilterContext {
            title: "Rust 1.80 Released".to_string(),
            url: "https://blog.rust-lang.org/".to_string(),
            subscription_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn regex_is_compiled_up_front() {
        let re = rule(RuleField::Title, Condition::Regex, r"rust \d+\.\d+");
        assert!(re.has_regex());
        assert!(re.matches(&context()));

        let plain = rule(RuleField::Title, Condition::Contains, "rust");
        assert!(!plain.has_regex());
        assert!(plain.matches(&context()));
    }

    #[test]
    fn case_sensitive_regex_keeps_case() {
        let mut raw = NewRule::new(
            "cased",
            RuleField::Title,
            Condition::Regex,
            "rust",
            RuleAction::MarkRead,
        )
        .case_sensitive(true)
        .into_rule(1, 1, chrono::Utc::now());
        assert!(!CompiledRule::compile(raw.clone()).matches(&context()));

        raw.pattern = "Rust".to_string();
        assert!(CompiledRule::compile(raw).matches(&context()));
    }

    #[test]
    fn invalid_regex_compiles_to_a_non_match() {
        let broken = rule(RuleField::Title, Condition::Regex, "(unclosed");
        assert!(!broken.has_regex());
        assert!(!broken.matches(&context()));

        let oversized = rule(RuleField::Title, Condition::Regex, r"(?:\w{1000}){1000}");
        assert!(!oversized.has_regex());
        assert!(!oversized.matches(&context()));
    }

    #[test]
    fn missing_field_never_matches() {
        // notContains would be true for any present value
        let rule = rule(RuleField::Author, Condition::NotContains, "bob");
        assert!(!rule.matches(&context()));
    }
}
