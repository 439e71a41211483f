//! Rastro - In-process call tracer with dynamic hooks
//!
//! This library provides the core functionality for tracing function and
//! method calls delivered by instrumented call sites, with user-registered
//! hooks gated by type or value triggers, return-value divergence tracking,
//! and an interactive break console.

pub mod cli;
pub mod console;
pub mod engine;
pub mod errors;
pub mod exclude;
pub mod hooks;
pub mod instrument;
pub mod recorder;
pub mod registry;
pub mod trigger;
pub mod value;
