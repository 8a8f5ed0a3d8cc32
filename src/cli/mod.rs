pub mod commands;

pub use commands::{run_command, Cli, Commands, OutputFormat};
