use crate::models::{FilterContext, FilterRule, RuleScope};

/// Whether `rule` applies to the article's subscription/category.
///
/// An empty id list leaves a category or subscription rule unrestricted.
pub fn matches(rule: &FilterRule, context: &FilterContext) -> bool {
    match rule.scope {
        RuleScope::Global => true,
        RuleScope::Subscription => {
            rule.subscription_ids.is_empty()
                || rule.subscription_ids.contains(&context.subscription_id)
        }
        RuleScope::Category => {
            rule.category_ids.is_empty()
                || context
                    .category_id
                    .is_some_and(|id| rule.category_ids.contains(&id))
        }
    }
}
