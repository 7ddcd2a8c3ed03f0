//! Core fedx library (federation kernel, providers, tools, config).

pub mod config;
pub mod core;
pub mod prompts;
pub mod providers;
pub mod tools;
