// minebridge-process: Supervision of the engine server, client and virtual display.

pub mod command;
pub mod handle;
pub mod supervisor;
pub mod sweep;

pub use command::{ClientLaunch, CommandSpec, DisplayLaunch, ServerLaunch};
pub use handle::{ProcessHandle, ProcessKind};
pub use supervisor::{ProcessSupervisor, SupervisorConfig};
