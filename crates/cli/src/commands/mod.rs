//! CLI subcommand implementations

pub mod intake;
pub mod jobs;
pub mod mark_failed;
pub mod process;
