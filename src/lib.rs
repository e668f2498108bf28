//! dinkbot library.
//!
//! This library provides the core functionality for the dinkbot Discord bot:
//! the daily first-message game, server analytics, and chat and image
//! generation backed by hosted model APIs.

pub mod bot;
pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod first;
pub mod llm;
pub mod recorder;
pub mod types;

pub use config::Config;
pub use error::{BotError, Result};
pub use types::{Context, Data, Error};
