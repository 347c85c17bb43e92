//! Conversational session layer
//!
//! [`ChatSessionStore`] is the durable, append-only message log for one
//! session scope; [`ModeController`] is the state machine that drives it.

pub mod controller;
pub mod store;

pub use controller::{
    ModeController, FALLBACK_MESSAGE, RECIPE_ACKNOWLEDGEMENT, SERVING_FOLLOW_UP,
    SERVING_PRESETS,
};
pub use store::{ChatSessionStore, WELCOME_MESSAGE};
