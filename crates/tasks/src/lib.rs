//! Supervised task spawning for the committer pipeline.
//!
//! Every pipeline stage runs as a named critical task.  A panic in any of
//! them is converted into an error the supervisor surfaces, which tears the
//! whole process down instead of leaving the pipeline half-alive.

mod manager;
mod shutdown;

pub use manager::{CriticalTaskError, TaskExecutor, TaskSupervisor};
pub use shutdown::{ShutdownGuard, ShutdownSignal};
