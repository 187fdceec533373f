//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the renderer:
//! - Math types and operations
//! - Time sources
//! - Cross-thread signalling
//! - Logging utilities

pub mod logging;
pub mod math;
pub mod sync;
pub mod time;
