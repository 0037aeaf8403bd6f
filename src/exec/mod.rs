// ABOUTME: Typed process execution for external tools (container CLI, git).
// ABOUTME: Commands are built as argument vectors, never interpolated shell strings.

mod command;
mod compose;
mod process;

pub use command::{CommandOutput, CommandRunner, CommandSpec, CommandError};
pub use compose::Compose;
pub use process::ProcessRunner;
