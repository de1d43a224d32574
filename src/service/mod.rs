//! The command/query facade sitting between the durable core this crate
//! implements and whatever outer transport (HTTP, CLI, embedding) a caller
//! builds on top. Everything here is transport-agnostic: commands and
//! queries are plain structs and methods, not request/response types.

pub mod commands;
pub mod facade;

pub use commands::{CancelRunCommand, CreateRunCommand, ForkThreadCommand, ResumeRunCommand};
pub use facade::RunService;
