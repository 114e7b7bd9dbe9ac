//! Command queue: dispatch records, the command state machine, and the
//! timeout sweep.

/// Command records and status vocabulary.
pub mod command;
/// The command queue service.
pub mod queue;
/// Storage backends for command records.
pub mod store;
/// The background timeout sweep.
pub mod sweep;

pub use command::{Command, CommandReport, CommandStats, CommandStatus};
pub use queue::CommandQueue;
pub use store::{CommandStore, FileCommandStore, InMemoryCommandStore};
pub use sweep::spawn_sweep;
