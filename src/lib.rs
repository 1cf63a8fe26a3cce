//! A tiny command interpreter that runs each line as a child process.
//!
//! Lines come from an interactive prompt or from script files. Commands are
//! either run one at a time (each is waited on before the next line is read)
//! or launched as a batch and waited on afterwards, in launch order.
//!
//! The building blocks are small and can be used on their own:
//! [`lexer::split`] turns a line into tokens, [`process::ProcessLauncher`]
//! starts children and [`process::ProcessHandle`] reaps them, and
//! [`engine::ExecutionEngine`] classifies lines and drives the launcher in
//! [`engine::ExecutionMode::Serial`] or [`engine::ExecutionMode::Parallel`]
//! mode. [`driver::Driver`] is the prompt loop on top.

pub mod cli;
pub mod driver;
pub mod engine;
pub mod lexer;
pub mod logging;
pub mod process;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

pub use driver::Driver;
pub use engine::{ExecutionEngine, ExecutionMode};
