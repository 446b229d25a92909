use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::filter::action::merge_tags;
use crate::models::{
    Article, ExternalAction, FilterResult, FilterRule, NewArticle, NewFeed, NewRule, QueuedPush,
};
use crate::store::RuleStore;

use super::schema::SCHEMA;

const RULE_COLUMNS: &str = "id, owner_id, name, description, enabled, priority, field, \
     condition, pattern, case_sensitive, action, action_value, scope, subscription_ids, \
     category_ids, match_count, last_matched_at, created_at, updated_at";

const ARTICLE_COLUMNS: &str = "a.id, a.feed_id, a.guid, a.title, a.url, a.author, a.content, \
     a.content_text, a.published_at, f.category_id, a.is_read, a.is_starred, a.is_highlighted, \
     a.tags";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Feed operations

    pub async fn insert_feed(&self, feed: NewFeed) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feeds (owner_id, category_id, title, url) VALUES (?1, ?2, ?3, ?4)",
                    params![feed.owner_id, feed.category_id, feed.title, feed.url],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    // Article operations

    /// Insert or refresh an article. Returns `None` if it was deleted before.
    pub async fn upsert_article(&self, article: NewArticle) -> Result<Option<i64>> {
        let id = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"INSERT INTO articles
                           (feed_id, guid, title, url, author, content, content_text, published_at)
                       SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8
                       WHERE NOT EXISTS
                           (SELECT 1 FROM deleted_articles WHERE feed_id = ?1 AND guid = ?2)
                       ON CONFLICT(feed_id, guid) DO UPDATE SET
                           title = excluded.title,
                           url = excluded.url,
                           author = excluded.author,
                           content = excluded.content,
                           content_text = excluded.content_text,
                           published_at = excluded.published_at"#,
                    params![
                        article.feed_id,
                        article.guid,
                        article.title,
                        article.url,
                        article.author,
                        article.content,
                        article.content_text,
                        article.published_at.map(|dt| dt.to_rfc3339()),
                    ],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let id: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM articles WHERE feed_id = ?1 AND guid = ?2",
                        params![article.feed_id, article.guid],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let row = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM articles a JOIN feeds f ON a.feed_id = f.id WHERE a.id = ?1",
                    ARTICLE_COLUMNS
                );
                let row = conn
                    .query_row(&sql, params![id], article_from_row)
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(Article::try_from).transpose()
    }

    /// Articles of `owner_id` that no filter pass has seen yet, oldest first.
    pub async fn get_unfiltered_articles(&self, owner_id: i64) -> Result<Vec<Article>> {
        let rows = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {} FROM articles a
                       JOIN feeds f ON a.feed_id = f.id
                       WHERE f.owner_id = ?1 AND a.filtered_at IS NULL
                       ORDER BY a.fetched_at, a.id"#,
                    ARTICLE_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![owner_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(Article::try_from).collect()
    }

    /// Persist a classification: flags only ever turn on, tags merge, a skip
    /// deletes the article and remembers its guid.
    pub async fn apply_filter_result(
        &self,
        article: &Article,
        result: &FilterResult,
    ) -> Result<()> {
        let article_id = article.id;
        let feed_id = article.feed_id;
        let guid = article.guid.clone();
        let url = article.url.clone();
        let title = article.title.clone();
        let mut tags = article.tags.clone();
        for tag in &result.tags {
            merge_tags(&mut tags, tag);
        }
        let tags_json = serde_json::to_string(&tags)?;
        let result = result.clone();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                for push in &result.external_actions {
                    tx.execute(
                        r#"INSERT INTO external_actions
                               (article_id, url, title, service, value, rule_id, rule_name)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                        params![
                            article_id,
                            url,
                            title,
                            push.service.as_str(),
                            push.value,
                            push.rule_id,
                            push.rule_name
                        ],
                    )?;
                }

                if result.should_skip {
                    tx.execute(
                        "INSERT OR IGNORE INTO deleted_articles (feed_id, guid) VALUES (?1, ?2)",
                        params![feed_id, guid],
                    )?;
                    tx.execute("DELETE FROM articles WHERE id = ?1", params![article_id])?;
                } else {
                    tx.execute(
                        r#"UPDATE articles SET
                               is_read = is_read OR ?1,
                               is_starred = is_starred OR ?2,
                               is_highlighted = is_highlighted OR ?3,
                               tags = ?4,
                               filtered_at = datetime('now')
                           WHERE id = ?5"#,
                        params![
                            result.is_read,
                            result.is_starred,
                            result.is_highlighted,
                            tags_json,
                            article_id
                        ],
                    )?;
                }

                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Pushes not yet delivered, oldest first.
    pub async fn pending_external_actions(&self) -> Result<Vec<QueuedPush>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, article_id, url, title, service, value, rule_id, rule_name
                       FROM external_actions
                       WHERE delivered_at IS NULL
                       ORDER BY id"#,
                )?;
                let rows = stmt
                    .query_map([], push_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter().map(QueuedPush::try_from).collect()
    }

    // Rule operations

    pub async fn insert_rule(&self, owner_id: i64, rule: &NewRule) -> Result<FilterRule> {
        let row = RuleParams::new(rule)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO filter_rules
                           (owner_id, name, description, enabled, priority, field, condition,
                            pattern, case_sensitive, action, action_value, scope,
                            subscription_ids, category_ids)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"#,
                    params![
                        owner_id,
                        row.name,
                        row.description,
                        row.enabled,
                        row.priority,
                        row.field,
                        row.condition,
                        row.pattern,
                        row.case_sensitive,
                        row.action,
                        row.action_value,
                        row.scope,
                        row.subscription_ids,
                        row.category_ids,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        self.get_rule(id).await?.ok_or(AppError::RuleNotFound(id))
    }

    /// Replace a rule's definition, keeping its owner and stats.
    pub async fn update_rule(&self, id: i64, rule: &NewRule) -> Result<FilterRule> {
        let row = RuleParams::new(rule)?;
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE filter_rules SET
                           name = ?1, description = ?2, enabled = ?3, priority = ?4, field = ?5,
                           condition = ?6, pattern = ?7, case_sensitive = ?8, action = ?9,
                           action_value = ?10, scope = ?11, subscription_ids = ?12,
                           category_ids = ?13,
                           updated_at = datetime('now')
                       WHERE id = ?14"#,
                    params![
                        row.name,
                        row.description,
                        row.enabled,
                        row.priority,
                        row.field,
                        row.condition,
                        row.pattern,
                        row.case_sensitive,
                        row.action,
                        row.action_value,
                        row.scope,
                        row.subscription_ids,
                        row.category_ids,
                        id,
                    ],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::RuleNotFound(id));
        }
        self.get_rule(id).await?.ok_or(AppError::RuleNotFound(id))
    }

    pub async fn set_rule_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE filter_rules SET enabled = ?1, updated_at = datetime('now')
                       WHERE id = ?2"#,
                    params![enabled, id],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::RuleNotFound(id));
        }
        Ok(())
    }

    pub async fn delete_rule(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM filter_rules WHERE id = ?1", params![id])?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::RuleNotFound(id));
        }
        Ok(())
    }

    pub async fn get_rule(&self, id: i64) -> Result<Option<FilterRule>> {
        let row = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM filter_rules WHERE id = ?1", RULE_COLUMNS);
                let row = conn.query_row(&sql, params![id], rule_from_row).optional()?;
                Ok(row)
            })
            .await?;
        row.map(FilterRule::try_from).transpose()
    }

    pub async fn rule_owner(&self, id: i64) -> Result<Option<i64>> {
        let owner = self
            .conn
            .call(move |conn| {
                let owner: Option<i64> = conn
                    .query_row(
                        "SELECT owner_id FROM filter_rules WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(owner)
            })
            .await?;
        Ok(owner)
    }

    /// Every rule of `owner_id`, enabled or not, highest priority first.
    pub async fn list_rules(&self, owner_id: i64) -> Result<Vec<FilterRule>> {
        self.query_rules(owner_id, false).await
    }

    async fn query_rules(&self, owner_id: i64, enabled_only: bool) -> Result<Vec<FilterRule>> {
        let rows = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {} FROM filter_rules
                       WHERE owner_id = ?1 AND (enabled = 1 OR ?2 = 0)
                       ORDER BY priority DESC, id"#,
                    RULE_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![owner_id, enabled_only], rule_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        // A row we cannot understand must never match anything
        let rules = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match FilterRule::try_from(row) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable filter rule {}: {}", id, e);
                        None
                    }
                }
            })
            .collect();
        Ok(rules)
    }
}

#[async_trait]
impl RuleStore for Repository {
    async fn list_enabled_rules(&self, owner_id: i64) -> Result<Vec<FilterRule>> {
        self.query_rules(owner_id, true).await
    }

    async fn increment_match_stats(&self, rule_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    r#"UPDATE filter_rules
                       SET match_count = match_count + 1, last_matched_at = ?1
                       WHERE id = ?2"#,
                    params![now, rule_id],
                )?;
                Ok(changed)
            })
            .await?;

        if changed == 0 {
            return Err(AppError::RuleNotFound(rule_id));
        }
        Ok(())
    }
}

/// Column values for writing a rule.
struct RuleParams {
    name: String,
    description: Option<String>,
    enabled: bool,
    priority: i32,
    field: &'static str,
    condition: &'static str,
    pattern: String,
    case_sensitive: bool,
    action: String,
    action_value: Option<String>,
    scope: &'static str,
    subscription_ids: String,
    category_ids: String,
}

impl RuleParams {
    fn new(rule: &NewRule) -> Result<Self> {
        Ok(Self {
            name: rule.name.clone(),
            description: rule.description.clone(),
            enabled: rule.enabled,
            priority: rule.priority,
            field: rule.field.as_str(),
            condition: rule.condition.as_str(),
            pattern: rule.pattern.clone(),
            case_sensitive: rule.case_sensitive,
            action: rule.action.to_string(),
            action_value: rule.action_value.clone(),
            scope: rule.scope.as_str(),
            subscription_ids: serde_json::to_string(&rule.subscription_ids)?,
            category_ids: serde_json::to_string(&rule.category_ids)?,
        })
    }
}

/// Raw `filter_rules` row, before enum and list columns are parsed.
struct RuleRow {
    id: i64,
    owner_id: i64,
    name: String,
    description: Option<String>,
    enabled: bool,
    priority: i32,
    field: String,
    condition: String,
    pattern: String,
    case_sensitive: bool,
    action: String,
    action_value: Option<String>,
    scope: String,
    subscription_ids: String,
    category_ids: String,
    match_count: i64,
    last_matched_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RuleRow> for FilterRule {
    type Error = AppError;

    fn try_from(row: RuleRow) -> Result<Self> {
        Ok(FilterRule {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            enabled: row.enabled,
            priority: row.priority,
            field: row.field.parse()?,
            condition: row.condition.parse()?,
            pattern: row.pattern,
            case_sensitive: row.case_sensitive,
            action: row.action.parse()?,
            action_value: row.action_value,
            scope: row.scope.parse()?,
            subscription_ids: serde_json::from_str(&row.subscription_ids)?,
            category_ids: serde_json::from_str(&row.category_ids)?,
            match_count: row.match_count,
            last_matched_at: row.last_matched_at.and_then(|s| parse_datetime(&s)),
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
            updated_at: parse_datetime(&row.updated_at).unwrap_or_else(Utc::now),
        })
    }
}

struct ArticleRow {
    id: i64,
    feed_id: i64,
    guid: String,
    title: String,
    url: String,
    author: Option<String>,
    content: Option<String>,
    content_text: Option<String>,
    published_at: Option<String>,
    category_id: Option<i64>,
    is_read: bool,
    is_starred: bool,
    is_highlighted: bool,
    tags: String,
}

impl TryFrom<ArticleRow> for Article {
    type Error = AppError;

    fn try_from(row: ArticleRow) -> Result<Self> {
        Ok(Article {
            id: row.id,
            feed_id: row.feed_id,
            guid: row.guid,
            title: row.title,
            url: row.url,
            author: row.author,
            content: row.content,
            content_text: row.content_text,
            published_at: row.published_at.and_then(|s| parse_datetime(&s)),
            category_id: row.category_id,
            is_read: row.is_read,
            is_starred: row.is_starred,
            is_highlighted: row.is_highlighted,
            tags: serde_json::from_str(&row.tags)?,
        })
    }
}

struct PushRow {
    id: i64,
    article_id: i64,
    url: String,
    title: String,
    service: String,
    value: Option<String>,
    rule_id: i64,
    rule_name: String,
}

impl TryFrom<PushRow> for QueuedPush {
    type Error = AppError;

    fn try_from(row: PushRow) -> Result<Self> {
        Ok(QueuedPush {
            id: row.id,
            article_id: row.article_id,
            url: row.url,
            title: row.title,
            action: ExternalAction {
                service: row.service.parse()?,
                value: row.value,
                rule_id: row.rule_id,
                rule_name: row.rule_name,
            },
        })
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn rule_from_row(row: &Row) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        enabled: row.get(4)?,
        priority: row.get(5)?,
        field: row.get(6)?,
        condition: row.get(7)?,
        pattern: row.get(8)?,
        case_sensitive: row.get(9)?,
        action: row.get(10)?,
        action_value: row.get(11)?,
        scope: row.get(12)?,
        subscription_ids: row.get(13)?,
        category_ids: row.get(14)?,
        match_count: row.get(15)?,
        last_matched_at: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<ArticleRow> {
    Ok(ArticleRow {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        guid: row.get(2)?,
        title: row.get(3)?,
        url: row.get(4)?,
        author: row.get(5)?,
        content: row.get(6)?,
        content_text: row.get(7)?,
        published_at: row.get(8)?,
        category_id: row.get(9)?,
        is_read: row.get(10)?,
        is_starred: row.get(11)?,
        is_highlighted: row.get(12)?,
        tags: row.get(13)?,
    })
}

fn push_from_row(row: &Row) -> rusqlite::Result<PushRow> {
    Ok(PushRow {
        id: row.get(0)?,
        article_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        service: row.get(4)?,
        value: row.get(5)?,
        rule_id: row.get(6)?,
        rule_name: row.get(7)?,
    })
}
