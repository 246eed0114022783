mod background;
mod events;
mod main;
mod slot;

pub use events::SupervisorEvent;
pub use main::Supervisor;
