//! CLI module graph.

pub mod command;
pub mod dist;
pub mod markdown;
pub mod output;
pub mod prompt;
