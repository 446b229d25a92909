use serde::{Deserialize, Serialize};

use super::rule::ExternalService;

/// The article being classified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterContext {
    pub title: String,
    pub content: Option<String>,
    pub content_text: Option<String>,
    pub author: Option<String>,
    pub url: String,
    pub subscription_id: i64,
    pub category_id: Option<i64>,
}

/// A push the delivery side still has to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAction {
    pub service: ExternalService,
    pub value: Option<String>,
    pub rule_id: i64,
    pub rule_name: String,
}

/// Accumulated decision for one article.
///
/// Fields only ever move towards "true" or "more populated".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub should_skip: bool,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_highlighted: bool,
    pub tags: Vec<String>,
    pub matched_rule_ids: Vec<i64>,
    pub external_actions: Vec<ExternalAction>,
    pub is_filtered: bool,
}
