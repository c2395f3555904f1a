//! Prism Core
//!
//! This crate contains shared utilities for the prism batched renderer.

pub mod alloc;
pub mod logging;
pub mod profiling;
