//! Live stream session orchestration

pub mod controller;
pub mod events;
pub mod exit;
pub mod manager;
pub mod store;

pub use controller::SelectionController;
pub use events::{EventChannel, SessionEvent};
pub use exit::ExitTriggerCoordinator;
pub use manager::SessionManager;
pub use store::{Session, SessionKey, SessionState, SessionStats, SessionStore, StartOutcome};
