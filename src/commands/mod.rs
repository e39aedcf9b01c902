// src/commands/mod.rs
//! Command handlers for the mixpkg CLI

mod pipeline;

pub use pipeline::run;
