//! Instance monitoring: launch the client, follow its log, publish events.

mod discovery;
mod error;
mod events;
mod instance;

pub use discovery::{find_player_pid, is_player_command, parse_pids};
pub use error::MonitorError;
pub use events::{EventBus, EventKind, HandlerId, MonitorEvent};
pub use instance::{Collaborators, InstanceMonitor};
