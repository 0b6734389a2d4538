//! Command implementations for the Granska CLI.

mod init;
mod serve;
mod tasks;

pub use init::run_init;
pub use serve::run_serve;
pub use tasks::run_tasks;
