use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::models::FilterRule;
use crate::store::RuleStore;

use super::compiled::CompiledRule;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// One owner's active rules, highest priority first, patterns compiled.
#[derive(Debug)]
struct CachedRuleSet {
    rules: Arc<[CompiledRule]>,
    loaded_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    snapshots: HashMap<i64, Arc<CachedRuleSet>>,
    // Bumped on invalidation so loads that raced it are not installed
    generations: HashMap<i64, u64>,
    epoch: u64,
}

impl CacheState {
    fn ticket(&self, owner_id: i64) -> (u64, u64) {
        (
            self.epoch,
            self.generations.get(&owner_id).copied().unwrap_or(0),
        )
    }
}

/// Per-owner, TTL-bounded cache of priority-sorted enabled rules.
pub struct RuleCache {
    store: Arc<dyn RuleStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl RuleCache {
    pub fn new(store: Arc<dyn RuleStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn RuleStore>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Enabled rules for `owner_id`, loading from the store on miss or expiry.
    ///
    /// Store failures are returned as-is; nothing is cached in that case.
    pub async fn get_active_rules(&self, owner_id: i64) -> Result<Arc<[CompiledRule]>> {
        let ticket = {
            let state = self.state.read();
            if let Some(snapshot) = state.snapshots.get(&owner_id) {
                let age = self.clock.now().saturating_duration_since(snapshot.loaded_at);
                if age < self.ttl {
                    tracing::debug!(
                        "Rule cache hit for owner {} ({} rules)",
                        owner_id,
                        snapshot.rules.len()
                    );
                    return Ok(Arc::clone(&snapshot.rules));
                }
            }
            state.ticket(owner_id)
        };

        tracing::debug!("Rule cache miss for owner {}, loading from store", owner_id);
        let mut rules = self.store.list_enabled_rules(owner_id).await?;
        rules.retain(|r| r.enabled);
        sort_by_priority(&mut rules);
        let rules: Arc<[CompiledRule]> = rules.into_iter().map(CompiledRule::compile).collect();

        let mut state = self.state.write();
        if state.ticket(owner_id) == ticket {
            state.snapshots.insert(
                owner_id,
                Arc::new(CachedRuleSet {
                    rules: Arc::clone(&rules),
                    loaded_at: self.clock.now(),
                }),
            );
        } else {
            tracing::debug!(
                "Rules for owner {} invalidated during load, not caching",
                owner_id
            );
        }

        Ok(rules)
    }

    /// Drop one owner's snapshot. Safe to call when nothing is cached.
    pub fn invalidate(&self, owner_id: i64) {
        let mut state = self.state.write();
        state.snapshots.remove(&owner_id);
        *state.generations.entry(owner_id).or_insert(0) += 1;
    }

    pub fn invalidate_all(&self) {
        let mut state = self.state.write();
        state.snapshots.clear();
        state.epoch += 1;
    }

    pub fn is_cached(&self, owner_id: i64) -> bool {
        self.state.read().snapshots.contains_key(&owner_id)
    }
}

/// Priority descending, rule id ascending on ties.
pub fn sort_by_priority(rules: &mut [FilterRule]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
}
