//! # glutenconvert-core
//!
//! Core library for GlutenConvert - a gluten-free cooking assistant.
//!
//! This library provides:
//! - The mode-scoped chat session (controller, append-only log)
//! - The ingredient label analysis parser
//! - The durable batch recipe-generation job
//! - The entitlement gate that controls generation access
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Three subsystems share one SQLite database:
//! - **Chat:** per-scope message logs driven by a per-session state machine
//! - **Generation:** a resumable job whose row is the sole source of truth
//! - **Entitlements:** read-only evaluation of role, subscription, and
//!   purchase records
//!
//! ## Example
//!
//! ```rust,no_run
//! use glutenconvert_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use chat::{ChatSessionStore, ModeController};
pub use config::Config;
pub use db::Database;
pub use entitlement::EntitlementGate;
pub use error::{Error, Result};
pub use gateway::{HttpInferenceGateway, InferenceGateway, InferenceReply, InferenceRequest};
pub use jobs::{GatewayRecipeProducer, GenerationJobManager, RecipeProducer};
pub use types::*;

// Public modules
pub mod analysis;
pub mod capture;
pub mod chat;
pub mod config;
pub mod db;
pub mod entitlement;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod logging;
pub mod types;
