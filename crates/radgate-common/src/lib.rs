//! Radgate Common - Shared types for the multi-tenant RADIUS core
//!
//! This crate provides the pieces every other radgate crate leans on:
//! - Error taxonomy
//! - Daemon configuration
//! - Outbound event bus (disconnections, grace warnings, alerts)
//! - Atomic stat counters

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod events;
pub mod stats;

pub use config::{CoreConfig, LifecycleConfig, NasConfig};
pub use error::{RadError, RadResult};
pub use events::{EventBus, OutboundEvent};
pub use stats::{CounterSet, CounterSnapshot};
