//! Core module - session orchestration, background loops and notifications

mod acquisition;
mod event_bus;
mod session;
mod tasks;

pub use acquisition::SensorPipeline;
pub use event_bus::{EventBus, Notification, NotifyLevel};
pub use session::{Session, SessionStatus};
pub use tasks::LoopHandle;
