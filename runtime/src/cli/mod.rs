//! CLI subcommand implementations for the `leadharvest` binary.

pub mod config_cmd;
pub mod doctor;
pub mod harvest_cmd;
pub mod output;
pub mod progress_view;
