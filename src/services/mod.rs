mod rules;

pub use rules::RuleManager;
