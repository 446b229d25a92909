use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{AppError, Result};
use crate::models::{FilterRule, NewRule};

/// Where the engine reads rule definitions and writes match stats.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn list_enabled_rules(&self, owner_id: i64) -> Result<Vec<FilterRule>>;
    async fn increment_match_stats(&self, rule_id: i64) -> Result<()>;
}

/// In-process rule store. Counts how often rules were loaded.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Mutex<Vec<FilterRule>>,
    next_id: AtomicI64,
    loads: AtomicUsize,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, owner_id: i64, rule: NewRule) -> FilterRule {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let rule = rule.into_rule(id, owner_id, Utc::now());
        self.rules.lock().push(rule.clone());
        rule
    }

    /// Replace a stored rule with the same id.
    pub fn update(&self, rule: FilterRule) -> Result<()> {
        let mut rules = self.rules.lock();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or(AppError::RuleNotFound(rule.id))?;
        *slot = rule;
        Ok(())
    }

    pub fn remove(&self, rule_id: i64) {
        self.rules.lock().retain(|r| r.id != rule_id);
    }

    pub fn get(&self, rule_id: i64) -> Option<FilterRule> {
        self.rules.lock().iter().find(|r| r.id == rule_id).cloned()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list_enabled_rules(&self, owner_id: i64) -> Result<Vec<FilterRule>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let rules = self
            .rules
            .lock()
            .iter()
            .filter(|r| r.owner_id == owner_id && r.enabled)
            .cloned()
            .collect();
        Ok(rules)
    }

    async fn increment_match_stats(&self, rule_id: i64) -> Result<()> {
        let mut rules = self.rules.lock();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or(AppError::RuleNotFound(rule_id))?;
        rule.match_count += 1;
        rule.last_matched_at = Some(Utc::now());
        Ok(())
    }
}
