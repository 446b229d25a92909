use std::sync::Arc;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::filter::{CompiledRule, FilterEngine};
use crate::services::RuleManager;

/// Outcome of one batch classification run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassifySummary {
    pub processed: usize,
    pub filtered: usize,
    pub deleted: usize,
    pub pushes_queued: usize,
    pub failed: usize,
}

pub struct App {
    pub repository: Arc<Repository>,
    pub rules: RuleManager,
    engine: FilterEngine,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);
        let engine = FilterEngine::new(repository.clone(), config);
        let rules = RuleManager::new(repository.clone(), engine.cache());

        Ok(Self {
            repository,
            rules,
            engine,
        })
    }

    /// Classify every article of `owner_id` not seen by a filter pass yet.
    ///
    /// If the rules cannot be loaded nothing is touched and the error is
    /// returned, so the whole batch is retried next run. Articles whose
    /// result fails to save stay unclassified as well.
    pub async fn classify_pending(&self, owner_id: i64) -> Result<ClassifySummary> {
        let mut summary = ClassifySummary::default();

        let articles = self.repository.get_unfiltered_articles(owner_id).await?;
        if articles.is_empty() {
            return Ok(summary);
        }

        // One cache lookup for the whole batch
        let rules = self.engine.active_rules(owner_id).await?;

        for article in articles {
            let result = self.engine.apply_filters_with(&rules, &article.to_context());

            match self.repository.apply_filter_result(&article, &result).await {
                Ok(()) => {
                    summary.processed += 1;
                    if result.is_filtered {
                        summary.filtered += 1;
                    }
                    if result.should_skip {
                        summary.deleted += 1;
                    }
                    summary.pushes_queued += result.external_actions.len();
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to save filter result for article {}: {}",
                        article.id,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Classified {} articles for owner {} ({} matched, {} deleted, {} failed)",
            summary.processed,
            owner_id,
            summary.filtered,
            summary.deleted,
            summary.failed
        );
        Ok(summary)
    }

    pub async fn active_rules(&self, owner_id: i64) -> Result<Arc<[CompiledRule]>> {
        self.engine.active_rules(owner_id).await
    }

    /// Flush match stats before exit.
    pub async fn shutdown(self) {
        self.engine.shutdown().await;
    }
}
