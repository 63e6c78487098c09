//! Core domain models for Pipeline
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, triggers and the configuration store of a run.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod state;
pub mod step;
pub mod store;
pub mod trigger;

pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
pub use store::{ConfigError, ConfigurationStore, Secrets};
pub use trigger::{EventType, Trigger, TriggerEvent};
