//! Lodestone Core
//!
//! This crate contains shared foundational utilities for the Lodestone engine.

pub mod alloc;
pub mod logging;
