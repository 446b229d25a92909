pub mod action;
pub mod cache;
pub mod compiled;
pub mod condition;
mod engine;
pub mod scope;
pub mod stats;

pub use cache::RuleCache;
pub use compiled::CompiledRule;
pub use engine::{evaluate_rules, FilterEngine};
pub use stats::StatsRecorder;
