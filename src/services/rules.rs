use std::sync::Arc;

use serde::Deserialize;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::filter::RuleCache;
use crate::models::{FilterRule, NewRule};

#[derive(Debug, Deserialize)]
struct RuleImport {
    #[serde(default)]
    rules: Vec<NewRule>,
}

/// Rule authoring. Every write invalidates the owner's cached rules.
pub struct RuleManager {
    repository: Arc<Repository>,
    cache: Arc<RuleCache>,
}

impl RuleManager {
    pub fn new(repository: Arc<Repository>, cache: Arc<RuleCache>) -> Self {
        Self { repository, cache }
    }

    pub async fn create_rule(&self, owner_id: i64, rule: NewRule) -> Result<FilterRule> {
        rule.validate()?;
        let created = self.repository.insert_rule(owner_id, &rule).await?;
        self.cache.invalidate(owner_id);
        tracing::info!("Created filter rule {} ({})", created.id, created.name);
        Ok(created)
    }

    pub async fn update_rule(&self, id: i64, rule: NewRule) -> Result<FilterRule> {
        rule.validate()?;
        let updated = self.repository.update_rule(id, &rule).await?;
        self.cache.invalidate(updated.owner_id);
        Ok(updated)
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let owner_id = self.owner_of(id).await?;
        self.repository.set_rule_enabled(id, enabled).await?;
        self.cache.invalidate(owner_id);
        Ok(())
    }

    pub async fn delete_rule(&self, id: i64) -> Result<()> {
        let owner_id = self.owner_of(id).await?;
        self.repository.delete_rule(id).await?;
        self.cache.invalidate(owner_id);
        tracing::info!("Deleted filter rule {}", id);
        Ok(())
    }

    pub async fn list_rules(&self, owner_id: i64) -> Result<Vec<FilterRule>> {
        self.repository.list_rules(owner_id).await
    }

    /// Create every rule in a TOML document's `[[rules]]` array.
    ///
    /// All rules are validated before any is written.
    pub async fn import_rules(&self, owner_id: i64, document: &str) -> Result<Vec<FilterRule>> {
        let import: RuleImport = toml::from_str(document)?;
        for rule in &import.rules {
            rule.validate()?;
        }

        let mut created = Vec::with_capacity(import.rules.len());
        for rule in &import.rules {
            created.push(self.repository.insert_rule(owner_id, rule).await?);
        }
        self.cache.invalidate(owner_id);

        tracing::info!("Imported {} filter rules for owner {}", created.len(), owner_id);
        Ok(created)
    }

    async fn owner_of(&self, id: i64) -> Result<i64> {
        self.repository
            .rule_owner(id)
            .await?
            .ok_or(AppError::RuleNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::cache::DEFAULT_TTL;
    use crate::models::{Condition, RuleAction, RuleField};

    async fn setup() -> (tempfile::TempDir, Arc<Repository>, Arc<RuleCache>, RuleManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.db");
        let repository = Arc::new(Repository::new(path.to_str().unwrap()).await.unwrap());
        let cache = Arc::new(RuleCache::new(repository.clone(), DEFAULT_TTL));
        let manager = RuleManager::new(repository.clone(), cache.clone());
        (dir, repository, cache, manager)
    }

    fn mark_read(name: &str) -> NewRule {
        NewRule::new(name, RuleField::Title, Condition::Contains, "ad", RuleAction::MarkRead)
    }

    #[tokio::test]
    async fn writes_invalidate_the_owner() {
        let (_dir, _repo, cache, manager) = setup().await;

        let rule = manager.create_rule(1, mark_read("a")).await.unwrap();
        cache.get_active_rules(2).await.unwrap();
        assert_eq!(cache.get_active_rules(1).await.unwrap().len(), 1);

        manager.set_enabled(rule.id, false).await.unwrap();
        assert!(!cache.is_cached(1));
        assert!(cache.is_cached(2));
        assert!(cache.get_active_rules(1).await.unwrap().is_empty());

        manager.set_enabled(rule.id, true).await.unwrap();
        let updated = manager
            .update_rule(rule.id, mark_read("renamed").priority(3))
            .await
            .unwrap();
        assert_eq!(updated.priority, 3);
        assert_eq!(cache.get_active_rules(1).await.unwrap()[0].name, "renamed");

        manager.delete_rule(rule.id).await.unwrap();
        assert!(cache.get_active_rules(1).await.unwrap().is_empty());
        assert!(matches!(
            manager.delete_rule(rule.id).await,
            Err(AppError::RuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_rules_are_rejected_before_saving() {
        let (_dir, _repo, _cache, manager) = setup().await;

        let bad =
            NewRule::new("n", RuleField::Title, Condition::LessThan, "abc", RuleAction::Delete);
        assert!(matches!(
            manager.create_rule(1, bad).await,
            Err(AppError::InvalidRule(_))
        ));
        assert!(manager.list_rules(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_is_all_or_nothing() {
        let (_dir, _repo, _cache, manager) = setup().await;

        let broken = r#"
            [[rules]]
            name = "ok"
            field = "title"
            condition = "contains"
            pattern = "rust"
            action = "markStarred"

            [[rules]]
            name = "bad"
            field = "title"
            condition = "regex"
            pattern = "("
            action = "delete"
        "#;
        assert!(manager.import_rules(1, broken).await.is_err());
        assert!(manager.list_rules(1).await.unwrap().is_empty());

        let good = r#"
            [[rules]]
            name = "Star rust"
            field = "title"
            condition = "contains"
            pattern = "rust"
            action = "markStarred"
            priority = 5

            [[rules]]
            name = "Save long reads"
            field = "url"
            condition = "startsWith"
            pattern = "https://"
            action = "pushToRaindrop"
            actionValue = "reading"
            scope = "subscription"
            subscriptionIds = [4]
        "#;
        let created = manager.import_rules(1, good).await.unwrap();
        assert_eq!(created.len(), 2);

        let listed = manager.list_rules(1).await.unwrap();
        assert_eq!(listed[0].name, "Star rust");
        assert_eq!(listed[1].subscription_ids, vec![4]);
    }
}
