//! Filter rule engine for RSS articles.
//!
//! Rules are evaluated per owner in priority order against a
//! [`models::FilterContext`]; matches fold into a [`models::FilterResult`].
//! [`filter::FilterEngine::apply_filters`] is the entry point.

pub mod app;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod services;
pub mod store;

pub use error::{AppError, Result};
pub use filter::FilterEngine;
pub use models::{FilterContext, FilterResult, FilterRule};
pub use store::RuleStore;
