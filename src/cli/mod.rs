pub mod args;
pub mod commands;

pub use args::{Cli, Commands, ProcessArgs, SelectionArgs, StationsArgs};
pub use commands::run;
