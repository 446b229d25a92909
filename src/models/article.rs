use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::{ExternalAction, FilterContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub content: Option<String>,
    pub content_text: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_highlighted: bool,
    pub tags: Vec<String>,
}

impl Article {
    pub fn to_context(&self) -> FilterContext {
        FilterContext {
            title: self.title.clone(),
            content: self.content.clone(),
            content_text: self.content_text.clone(),
            author: self.author.clone(),
            url: self.url.clone(),
            subscription_id: self.feed_id,
            category_id: self.category_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub owner_id: i64,
    pub title: String,
    pub url: String,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewArticle {
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub content: Option<String>,
    pub content_text: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A push waiting for delivery. Carries the article's url and title because
/// the article itself may already be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedPush {
    pub id: i64,
    pub article_id: i64,
    pub url: String,
    pub title: String,
    pub action: ExternalAction,
}
