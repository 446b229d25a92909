mod article;
mod context;
mod rule;

pub use article::{Article, NewArticle, NewFeed, QueuedPush};
pub use context::{ExternalAction, FilterContext, FilterResult};
pub use rule::{Condition, ExternalService, FilterRule, NewRule, RuleAction, RuleField, RuleScope};
