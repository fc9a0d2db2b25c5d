//! CLI subcommand implementations.

pub mod catalog;
pub mod entries;
pub mod run;
