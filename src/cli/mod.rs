pub mod args;
pub mod commands;

pub use args::{AppCommand, CliArgs, ProfileCommand, VaultCommand, main_args};
pub use commands::run;
