use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::models::{FilterContext, FilterResult, FilterRule, RuleAction};
use crate::store::RuleStore;

use super::cache::RuleCache;
use super::compiled::CompiledRule;
use super::stats::StatsRecorder;
use super::{action, scope};

/// Entry point for classifying articles against an owner's rules.
pub struct FilterEngine {
    cache: Arc<RuleCache>,
    stats: StatsRecorder,
}

impl FilterEngine {
    /// Must be called from within a tokio runtime (the stats worker is spawned here).
    pub fn new(store: Arc<dyn RuleStore>, config: &Config) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn RuleStore>,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(RuleCache::with_clock(
            Arc::clone(&store),
            config.cache_ttl(),
            clock,
        ));
        let stats = StatsRecorder::spawn(store, config.stats_queue_capacity);
        Self { cache, stats }
    }

    /// Shared handle for the rule-authoring side to invalidate through.
    pub fn cache(&self) -> Arc<RuleCache> {
        Arc::clone(&self.cache)
    }

    /// Classify one article.
    ///
    /// Fails only when the owner's rules cannot be loaded; the caller should
    /// treat the article as not yet classified.
    pub async fn apply_filters(
        &self,
        owner_id: i64,
        context: &FilterContext,
    ) -> Result<FilterResult> {
        let rules = self.cache.get_active_rules(owner_id).await?;
        Ok(self.apply_filters_with(&rules, context))
    }

    /// Classify against an already fetched rule list, for batches.
    pub fn apply_filters_with(
        &self,
        rules: &[CompiledRule],
        context: &FilterContext,
    ) -> FilterResult {
        evaluate_rules(rules, context, |rule| self.stats.record_match(rule.id))
    }

    pub async fn active_rules(&self, owner_id: i64) -> Result<Arc<[CompiledRule]>> {
        self.cache.get_active_rules(owner_id).await
    }

    pub fn invalidate(&self, owner_id: i64) {
        self.cache.invalidate(owner_id);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Flush pending match stats.
    pub async fn shutdown(self) {
        self.stats.shutdown().await;
    }
}

/// Run `rules` (already in priority order) against `context`.
///
/// `on_match` is told about every rule whose action was applied. Evaluation
/// stops after the first matching delete.
pub fn evaluate_rules(
    rules: &[CompiledRule],
    context: &FilterContext,
    mut on_match: impl FnMut(&FilterRule),
) -> FilterResult {
    let mut result = FilterResult::default();

    for compiled in rules {
        let rule = compiled.rule();
        if !rule.enabled || !scope::matches(rule, context) || !compiled.matches(context) {
            continue;
        }

        tracing::debug!("Rule {} ({}) matched, action {}", rule.id, rule.name, rule.action);
        action::apply(rule, &mut result);
        result.is_filtered = true;
        result.matched_rule_ids.push(rule.id);
        on_match(rule);

        if rule.action == RuleAction::Delete {
            break;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::AppError;
    use crate::models::{Condition, NewRule, RuleField};
    use crate::store::{MemoryRuleStore, MockRuleStore};

    fn title_rule(name: &str, pattern: &str, action: RuleAction, priority: i32) -> NewRule {
        NewRule::new(name, RuleField::Title, Condition::Contains, pattern, action)
            .priority(priority)
    }

    fn config() -> Config {
        Config {
            db_path: ":memory:".to_string(),
            cache_ttl_seconds: 300,
            stats_queue_capacity: 64,
        }
    }

    fn article(title: &str) -> FilterContext {
        FilterContext {
            title: title.to_string(),
            url: "https://example.com/post".to_string(),
            subscription_id: 1,
            ..Default::default()
        }
    }

    fn engine(store: Arc<MemoryRuleStore>) -> FilterEngine {
        FilterEngine::with_clock(store, &config(), Arc::new(ManualClock::new()))
    }

    #[tokio::test]
    async fn higher_priority_runs_first_and_delete_still_applies() {
        let store = Arc::new(MemoryRuleStore::new());
        let b = store.insert(7, title_rule("B", "ad", RuleAction::Delete, 5));
        let a = store.insert(7, title_rule("A", "ad", RuleAction::MarkRead, 10));

        let engine = engine(store);
        let result = engine.apply_filters(7, &article("Great ad deal")).await.unwrap();

        assert!(result.is_read);
        assert!(result.is_filtered);
        assert!(result.should_skip);
        assert_eq!(result.matched_rule_ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn delete_short_circuits_lower_priorities() {
        let store = Arc::new(MemoryRuleStore::new());
        let delete = store.insert(1, title_rule("Drop ads", "ad", RuleAction::Delete, 10));
        store.insert(1, title_rule("Star ads", "ad", RuleAction::MarkStarred, 5));
        store.insert(
            1,
            title_rule("Tag ads", "ad", RuleAction::AddTag, 1).action_value("ads"),
        );

        let engine = engine(store);
        let result = engine.apply_filters(1, &article("Great ad deal")).await.unwrap();

        assert!(result.should_skip);
        assert!(!result.is_starred);
        assert!(result.tags.is_empty());
        assert_eq!(result.matched_rule_ids, vec![delete.id]);
    }

    #[tokio::test]
    async fn no_match_leaves_result_empty() {
        let store = Arc::new(MemoryRuleStore::new());
        store.insert(1, title_rule("Drop ads", "ad", RuleAction::Delete, 10));

        let engine = engine(store);
        let result = engine.apply_filters(1, &article("Release notes")).await.unwrap();
        assert_eq!(result, FilterResult::default());
    }

    #[tokio::test]
    async fn same_tag_from_two_rules_is_kept_once() {
        let store = Arc::new(MemoryRuleStore::new());
        store.insert(
            1,
            title_rule("Rust", "rust", RuleAction::AddTag, 2).action_value("rust, lang"),
        );
        store.insert(
            1,
            NewRule::new(
                "Rust URL",
                RuleField::Url,
                Condition::Contains,
                "rust",
                RuleAction::AddTag,
            )
            .action_value("rust"),
        );

        let engine = engine(store);
        let mut ctx = article("Rust 2024 edition");
        ctx.url = "https://blog.rust-lang.org/".to_string();
        let result = engine.apply_filters(1, &ctx).await.unwrap();

        assert_eq!(result.tags, vec!["rust", "lang"]);
        assert_eq!(result.matched_rule_ids.len(), 2);
    }

    #[tokio::test]
    async fn scope_and_bad_patterns_do_not_abort_evaluation() {
        let store = Arc::new(MemoryRuleStore::new());
        store.insert(
            1,
            NewRule::new("Broken", RuleField::Title, Condition::Regex, "(", RuleAction::Delete)
                .priority(30),
        );
        store.insert(
            1,
            title_rule("Other category", "", RuleAction::Delete, 20).in_categories(vec![9]),
        );
        store.insert(
            1,
            NewRule::new(
                "Score",
                RuleField::Title,
                Condition::GreaterThan,
                "100",
                RuleAction::Delete,
            )
            .priority(15),
        );
        let star = store.insert(1, title_rule("Star", "deal", RuleAction::MarkStarred, 10));

        let engine = engine(store);
        let result = engine.apply_filters(1, &article("42abc deal")).await.unwrap();

        assert!(!result.should_skip);
        assert!(result.is_starred);
        assert_eq!(result.matched_rule_ids, vec![star.id]);
    }

    #[tokio::test]
    async fn matches_are_counted_in_the_background() {
        let store = Arc::new(MemoryRuleStore::new());
        let rule = store.insert(1, title_rule("Read", "ad", RuleAction::MarkRead, 1));

        let engine = engine(store.clone());
        engine.apply_filters(1, &article("ad one")).await.unwrap();
        engine.apply_filters(1, &article("ad two")).await.unwrap();
        engine.apply_filters(1, &article("nothing")).await.unwrap();
        engine.shutdown().await;

        assert_eq!(store.get(rule.id).unwrap().match_count, 2);
    }

    #[tokio::test]
    async fn store_failure_fails_the_call() {
        let mut store = MockRuleStore::new();
        store
            .expect_list_enabled_rules()
            .returning(|_| Err(AppError::Store("unavailable".to_string())));

        let engine = FilterEngine::new(Arc::new(store), &config());
        let err = engine.apply_filters(1, &article("anything")).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
    }

    #[test]
    fn disabled_rules_in_a_list_are_skipped() {
        let mut rule = title_rule("Off", "ad", RuleAction::Delete, 1)
            .into_rule(1, 1, chrono::Utc::now());
        rule.enabled = false;

        let mut seen = Vec::new();
        let rules = [CompiledRule::compile(rule)];
        let result = evaluate_rules(&rules, &article("ad"), |r| seen.push(r.id));
        assert!(!result.is_filtered);
        assert!(seen.is_empty());
    }
}
