//! Database layer for glutenconvert
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Atomic recipe-write + progress accounting for generation jobs

pub mod repo;
pub mod schema;

pub use repo::Database;
