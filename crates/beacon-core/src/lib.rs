//! # beacon-core
//!
//! Core types, traits, time arithmetic, configuration, and error handling
//! for the Beacon notification scheduler.

pub mod config;
pub mod error;
pub mod notification;
pub mod time;
pub mod traits;
