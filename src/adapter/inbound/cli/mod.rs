//! CLI module graph.

pub mod command;
pub mod config;
pub mod output;
pub mod serve;
pub mod status;
pub mod tune;
