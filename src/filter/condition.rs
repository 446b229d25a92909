use regex::{Regex, RegexBuilder};

use crate::models::{Condition, FilterContext, RuleField};

/// Upper bound on compiled program and lazy DFA size for rule patterns.
///
/// The regex crate matches in linear time, so this cap on compilation is
/// the only bound a pathological pattern needs.
pub const REGEX_SIZE_LIMIT: usize = 1 << 20;

pub fn build_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .dfa_size_limit(REGEX_SIZE_LIMIT)
        .build()
}

/// Value of `field` on the article, if it has one.
pub fn resolve_field(field: RuleField, context: &FilterContext) -> Option<&str> {
    match field {
        RuleField::Title => Some(context.title.as_str()),
        RuleField::Content => context
            .content
            .as_deref()
            .or(context.content_text.as_deref()),
        RuleField::Author => context.author.as_deref(),
        RuleField::Url => Some(context.url.as_str()),
    }
}

/// Evaluate one condition against a field value.
///
/// Regex patterns are compiled on each call here; rules evaluated in bulk go
/// through `CompiledRule`, which compiles once.
pub fn evaluate(condition: Condition, value: &str, pattern: &str, case_sensitive: bool) -> bool {
    match condition {
        Condition::Regex => return regex_matches(value, pattern, case_sensitive),
        Condition::GreaterThan => return compare_numbers(value, pattern, |a, b| a > b),
        Condition::LessThan => return compare_numbers(value, pattern, |a, b| a < b),
        _ => {}
    }

    let (value, pattern) = if case_sensitive {
        (value.to_string(), pattern.to_string())
    } else {
        (value.to_lowercase(), pattern.to_lowercase())
    };

    match condition {
        Condition::Contains => value.contains(&pattern),
        Condition::NotContains => !value.contains(&pattern),
        Condition::Equals => value == pattern,
        Condition::NotEquals => value != pattern,
        Condition::StartsWith => value.starts_with(&pattern),
        Condition::EndsWith => value.ends_with(&pattern),
        Condition::Regex | Condition::GreaterThan | Condition::LessThan => false,
    }
}

fn regex_matches(value: &str, pattern: &str, case_sensitive: bool) -> bool {
    match build_regex(pattern, case_sensitive) {
        Ok(re) => re.is_match(value),
        Err(e) => {
            tracing::warn!("Ignoring invalid filter regex {:?}: {}", pattern, e);
            false
        }
    }
}

fn compare_numbers(value: &str, pattern: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (value.trim().parse::<f64>(), pattern.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => cmp(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> FilterContext {
        FilterContext {
            title: "Rust 1.80 Released".to_string(),
            content: None,
            content_text: Some("The plain text body".to_string()),
            author: None,
            url: "https://blog.rust-lang.org/2024/07/25/Rust-1.80.0.html".to_string(),
            subscription_id: 1,
            category_id: None,
        }
    }

    #[test]
    fn string_conditions_fold_case_unless_asked() {
        assert!(evaluate(Condition::Contains, "Great Ad Deal", "ad", false));
        assert!(!evaluate(Condition::Contains, "Great Ad Deal", "ad", true));
        assert!(evaluate(Condition::NotContains, "Great Ad Deal", "coupon", false));
        assert!(evaluate(Condition::Equals, "HELLO", "hello", false));
        assert!(evaluate(Condition::NotEquals, "HELLO", "hello", true));
        assert!(evaluate(Condition::StartsWith, "Sponsored: thing", "sponsored", false));
        assert!(evaluate(Condition::EndsWith, "weekly digest", "DIGEST", false));
        assert!(!evaluate(Condition::EndsWith, "weekly digest", "DIGEST", true));
    }

    #[test]
    fn regex_respects_case_flag() {
        assert!(evaluate(Condition::Regex, "Rust 1.80 Released", r"rust \d+\.\d+", false));
        assert!(!evaluate(Condition::Regex, "Rust 1.80 Released", r"rust \d+\.\d+", true));
        assert!(evaluate(Condition::Regex, "a long title", "long", true));
    }

    #[test]
    fn invalid_regex_is_a_non_match() {
        assert!(!evaluate(Condition::Regex, "anything (at all", "(at all", false));
        assert!(!evaluate(Condition::Regex, "anything", "[z-a]", false));
    }

    #[test]
    fn oversized_regex_is_a_non_match() {
        // Far beyond the compiled size cap
        assert!(build_regex(r"(?:\w{1000}){1000}", false).is_err());
        assert!(!evaluate(Condition::Regex, "word", r"(?:\w{1000}){1000}", false));
    }

    #[test]
    fn numeric_comparisons_need_two_numbers() {
        assert!(evaluate(Condition::GreaterThan, "150", "100", false));
        assert!(evaluate(Condition::LessThan, " 2.5 ", "3", false));
        assert!(!evaluate(Condition::GreaterThan, "42abc", "100", false));
        assert!(!evaluate(Condition::GreaterThan, "200", "many", false));
        assert!(!evaluate(Condition::LessThan, "NaN", "3", false));
        assert!(!evaluate(Condition::GreaterThan, "100", "100", false));
    }

    #[test]
    fn content_falls_back_to_plain_text() {
        let mut ctx = context();
        assert_eq!(resolve_field(RuleField::Content, &ctx), Some("The plain text body"));

        ctx.content = Some("<p>html</p>".to_string());
        assert_eq!(resolve_field(RuleField::Content, &ctx), Some("<p>html</p>"));
    }
}
