use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::filter::condition::build_regex;

/// Article field a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleField {
    Title,
    Content,
    Author,
    Url,
}

impl RuleField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
            Self::Author => "author",
            Self::Url => "url",
        }
    }
}

impl FromStr for RuleField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "title" => Ok(Self::Title),
            "content" => Ok(Self::Content),
            "author" => Ok(Self::Author),
            "url" => Ok(Self::Url),
            other => Err(AppError::InvalidRule(format!("unknown field '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Contains,
    NotContains,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Regex,
    GreaterThan,
    LessThan,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Regex => "regex",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::GreaterThan | Self::LessThan)
    }
}

impl FromStr for Condition {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contains" => Ok(Self::Contains),
            "notContains" => Ok(Self::NotContains),
            "equals" => Ok(Self::Equals),
            "notEquals" => Ok(Self::NotEquals),
            "startsWith" => Ok(Self::StartsWith),
            "endsWith" => Ok(Self::EndsWith),
            "regex" => Ok(Self::Regex),
            "greaterThan" => Ok(Self::GreaterThan),
            "lessThan" => Ok(Self::LessThan),
            other => Err(AppError::InvalidRule(format!(
                "unknown condition '{}'",
                other
            ))),
        }
    }
}

/// Bookmarking or note service an article can be pushed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExternalService {
    Raindrop,
    Pocket,
    Instapaper,
    Wallabag,
}

impl ExternalService {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raindrop => "raindrop",
            Self::Pocket => "pocket",
            Self::Instapaper => "instapaper",
            Self::Wallabag => "wallabag",
        }
    }
}

impl FromStr for ExternalService {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "raindrop" => Ok(Self::Raindrop),
            "pocket" => Ok(Self::Pocket),
            "instapaper" => Ok(Self::Instapaper),
            "wallabag" => Ok(Self::Wallabag),
            other => Err(AppError::InvalidRule(format!(
                "unknown external service '{}'",
                other
            ))),
        }
    }
}

/// What happens to the decision when a rule matches.
///
/// Stored and serialized as camelCase names; pushes are spelled
/// `pushTo<Service>`, e.g. `pushToRaindrop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuleAction {
    MarkRead,
    MarkStarred,
    AddTag,
    Highlight,
    PushToExternal(ExternalService),
    Delete,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkRead => write!(f, "markRead"),
            Self::MarkStarred => write!(f, "markStarred"),
            Self::AddTag => write!(f, "addTag"),
            Self::Highlight => write!(f, "highlight"),
            Self::PushToExternal(service) => {
                let name = service.as_str();
                let mut chars = name.chars();
                match chars.next() {
                    Some(first) => {
                        write!(f, "pushTo{}{}", first.to_ascii_uppercase(), chars.as_str())
                    }
                    None => write!(f, "pushTo"),
                }
            }
            Self::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for RuleAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "markRead" => Ok(Self::MarkRead),
            "markStarred" => Ok(Self::MarkStarred),
            "addTag" => Ok(Self::AddTag),
            "highlight" => Ok(Self::Highlight),
            "delete" => Ok(Self::Delete),
            other => match other.strip_prefix("pushTo") {
                Some(service) if !service.is_empty() => Ok(Self::PushToExternal(service.parse()?)),
                _ => Err(AppError::InvalidRule(format!("unknown action '{}'", other))),
            },
        }
    }
}

impl TryFrom<String> for RuleAction {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RuleAction> for String {
    fn from(action: RuleAction) -> Self {
        action.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleScope {
    #[default]
    Global,
    Category,
    Subscription,
}

impl RuleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Category => "category",
            Self::Subscription => "subscription",
        }
    }
}

impl FromStr for RuleScope {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(Self::Global),
            "category" => Ok(Self::Category),
            "subscription" => Ok(Self::Subscription),
            other => Err(AppError::InvalidRule(format!("unknown scope '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// Higher evaluates first
    pub priority: i32,
    pub field: RuleField,
    pub condition: Condition,
    pub pattern: String,
    pub case_sensitive: bool,
    pub action: RuleAction,
    pub action_value: Option<String>,
    pub scope: RuleScope,
    pub subscription_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
    pub match_count: i64,
    pub last_matched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rule definition as authored, before the store assigns identity and stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    pub field: RuleField,
    pub condition: Condition,
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    pub action: RuleAction,
    #[serde(default)]
    pub action_value: Option<String>,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default)]
    pub subscription_ids: Vec<i64>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

fn default_enabled() -> bool {
    true
}

impl NewRule {
    pub fn new(
        name: impl Into<String>,
        field: RuleField,
        condition: Condition,
        pattern: impl Into<String>,
        action: RuleAction,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            enabled: true,
            priority: 0,
            field,
            condition,
            pattern: pattern.into(),
            case_sensitive: false,
            action,
            action_value: None,
            scope: RuleScope::Global,
            subscription_ids: Vec::new(),
            category_ids: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn action_value(mut self, value: impl Into<String>) -> Self {
        self.action_value = Some(value.into());
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn in_subscriptions(mut self, ids: Vec<i64>) -> Self {
        self.scope = RuleScope::Subscription;
        self.subscription_ids = ids;
        self
    }

    pub fn in_categories(mut self, ids: Vec<i64>) -> Self {
        self.scope = RuleScope::Category;
        self.category_ids = ids;
        self
    }

    /// Reject definitions that could never do anything useful.
    ///
    /// The evaluator tolerates all of these (they simply never match), so
    /// this only guards the authoring path.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRule("name must not be empty".to_string()));
        }
        if self.pattern.is_empty() {
            return Err(AppError::InvalidRule(format!(
                "rule '{}' has an empty pattern",
                self.name
            )));
        }

        match self.condition {
            Condition::Regex => {
                build_regex(&self.pattern, self.case_sensitive).map_err(|e| {
                    AppError::InvalidRule(format!(
                        "rule '{}' has an invalid regex: {}",
                        self.name, e
                    ))
                })?;
            }
            c if c.is_numeric() => {
                if self.pattern.trim().parse::<f64>().is_err() {
                    return Err(AppError::InvalidRule(format!(
                        "rule '{}' compares numerically but '{}' is not a number",
                        self.name, self.pattern
                    )));
                }
            }
            _ => {}
        }

        let has_value = self
            .action_value
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty());
        match self.action {
            RuleAction::AddTag | RuleAction::PushToExternal(_) if !has_value => {
                Err(AppError::InvalidRule(format!(
                    "action {} of rule '{}' needs a value",
                    self.action, self.name
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn into_rule(self, id: i64, owner_id: i64, now: DateTime<Utc>) -> FilterRule {
        FilterRule {
            id,
            owner_id,
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            priority: self.priority,
            field: self.field,
            condition: self.condition,
            pattern: self.pattern,
            case_sensitive: self.case_sensitive,
            action: self.action,
            action_value: self.action_value,
            scope: self.scope,
            subscription_ids: self.subscription_ids,
            category_ids: self.category_ids,
            match_count: 0,
            last_matched_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
