//! External collaborators: command runner, liveness probe, settings, delegate.

mod probe;
mod process;
mod settings;

pub use probe::*;
pub use process::*;
pub use settings::*;
