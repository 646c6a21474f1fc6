#![expect(
    clippy::print_stdout,
    clippy::print_stderr,
    reason = "command output goes to the terminal"
)]

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
