//! Translation of timelines and windows into storage queries

pub mod builder;
pub mod predicate;
